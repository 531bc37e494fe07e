// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Static IPv4 configuration through dhcpcd.
//!
//! Raspberry Pi OS (and a few other distributions) configure static
//! addresses in `/etc/dhcpcd.conf`. hostwright keeps one managed block per
//! interface in that file:
//!
//! ```text
//! # >>> hostwright static-ip eth0 >>>
//! interface eth0
//! static ip_address=192.168.1.10/24
//! static routers=192.168.1.1
//! static domain_name_servers=1.1.1.1 8.8.8.8
//! # <<< hostwright static-ip eth0 <<<
//! ```

use crate::{
    prompt::{Prompter, PromptError},
    rcfile::{Outcome, RcError, RcSession},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    net::Ipv4Addr,
    path::Path,
    str::FromStr,
};
use tracing::info;

/// Default location of dhcpcd configuration.
pub const DHCPCD_CONF: &str = "/etc/dhcpcd.conf";

/// IPv4 address with prefix length, e.g., "192.168.1.10/24".
///
/// # Invariant
///
/// - Prefix length is within `1..=32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    address: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Construct new CIDR address.
    ///
    /// # Errors
    ///
    /// - Return [`CidrError::PrefixOutOfRange`] if prefix is not in `1..=32`.
    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self, CidrError> {
        if !(1..=32).contains(&prefix) {
            return Err(CidrError::PrefixOutOfRange(prefix.into()));
        }

        Ok(Self { address, prefix })
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }
}

impl Display for Ipv4Cidr {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}/{}", self.address, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = CidrError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (address, prefix) = input
            .trim()
            .split_once('/')
            .ok_or(CidrError::MissingPrefix)?;
        let address = parse_ipv4(address)?;
        let prefix: u16 = prefix
            .parse()
            .map_err(|_| CidrError::InvalidPrefix(prefix.into()))?;
        if !(1..=32).contains(&prefix) {
            return Err(CidrError::PrefixOutOfRange(prefix));
        }

        Self::new(address, prefix as u8)
    }
}

/// Parse dotted-quad IPv4 address, reporting exactly what is wrong.
///
/// # Errors
///
/// - Return [`CidrError`] describing the first problem found.
pub fn parse_ipv4(input: &str) -> Result<Ipv4Addr, CidrError> {
    let parts: Vec<&str> = input.trim().split('.').collect();
    if parts.len() != 4 {
        return Err(CidrError::OctetCount(parts.len()));
    }

    let mut octets = [0u8; 4];
    for (octet, part) in octets.iter_mut().zip(parts) {
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CidrError::InvalidOctet(part.into()));
        }

        let value: u16 = part
            .parse()
            .map_err(|_| CidrError::InvalidOctet(part.into()))?;
        *octet = u8::try_from(value).map_err(|_| CidrError::OctetOutOfRange(value))?;
    }

    Ok(Ipv4Addr::from(octets))
}

/// Static address settings for one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIp {
    pub interface: String,
    pub address: Ipv4Cidr,
    pub router: Ipv4Addr,
    pub dns: Vec<Ipv4Addr>,
}

impl StaticIp {
    /// Fill in missing settings by asking the user.
    ///
    /// Invalid answers are rejected and asked again.
    ///
    /// # Errors
    ///
    /// - Return [`NetError::Prompt`] if no valid answer can be obtained.
    pub fn prompt_missing(
        prompter: &impl Prompter,
        interface: String,
        address: Option<Ipv4Cidr>,
        router: Option<Ipv4Addr>,
        dns: Vec<Ipv4Addr>,
    ) -> Result<Self> {
        let address = match address {
            Some(address) => address,
            None => prompter
                .text(
                    &format!("static address for {interface} (CIDR, e.g. 192.168.1.10/24)"),
                    None,
                    validate_cidr,
                )?
                .parse()?,
        };

        let router = match router {
            Some(router) => router,
            None => {
                let guess = default_router(&address).to_string();
                parse_ipv4(&prompter.text("router address", Some(&guess), validate_ipv4)?)?
            }
        };

        let dns = if dns.is_empty() {
            prompter
                .text(
                    "DNS servers (space separated)",
                    Some(&router.to_string()),
                    validate_ipv4_list,
                )?
                .split_whitespace()
                .map(parse_ipv4)
                .collect::<Result<Vec<_>, _>>()?
        } else {
            dns
        };

        Ok(Self {
            interface,
            address,
            router,
            dns,
        })
    }

    /// Lines of the dhcpcd block.
    pub fn dhcpcd_lines(&self) -> Vec<String> {
        let dns = self
            .dns
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        vec![
            format!("interface {}", self.interface),
            format!("static ip_address={}", self.address),
            format!("static routers={}", self.router),
            format!("static domain_name_servers={dns}"),
        ]
    }

    /// Write settings into dhcpcd configuration.
    ///
    /// # Errors
    ///
    /// - Return [`NetError::Rc`] if configuration cannot be edited.
    pub fn write_dhcpcd(&self, session: &mut RcSession, path: impl AsRef<Path>) -> Result<Outcome> {
        let path = path.as_ref();
        let mut outcome = Outcome::Unchanged;
        session.edit(path, |edit| {
            outcome = edit.ensure_block(&format!("static-ip {}", self.interface), self.dhcpcd_lines())?;
            Ok(())
        })?;

        match &outcome {
            Outcome::Unchanged => info!("{}: {} already configured", path.display(), self.interface),
            _ => info!("{}: set {} to {}", path.display(), self.interface, self.address),
        }

        Ok(outcome)
    }
}

/// Guess router as first host address of the network.
pub fn default_router(cidr: &Ipv4Cidr) -> Ipv4Addr {
    let mask = if cidr.prefix() == 32 {
        u32::MAX
    } else {
        !(u32::MAX >> cidr.prefix())
    };
    let network = u32::from(cidr.address()) & mask;
    if cidr.prefix() >= 31 {
        Ipv4Addr::from(network)
    } else {
        Ipv4Addr::from(network + 1)
    }
}

fn validate_cidr(input: &str) -> Result<(), String> {
    input.parse::<Ipv4Cidr>().map(|_| ()).map_err(|err| err.to_string())
}

fn validate_ipv4(input: &str) -> Result<(), String> {
    parse_ipv4(input).map(|_| ()).map_err(|err| err.to_string())
}

fn validate_ipv4_list(input: &str) -> Result<(), String> {
    if input.split_whitespace().next().is_none() {
        return Err("at least one address is required".into());
    }

    input
        .split_whitespace()
        .try_for_each(validate_ipv4)
}

/// CIDR and address parsing error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CidrError {
    #[error("missing \"/prefix\" part")]
    MissingPrefix,

    #[error("expected 4 octets, found {0}")]
    OctetCount(usize),

    #[error("octet {0:?} is not a number")]
    InvalidOctet(String),

    #[error("octet {0} is greater than 255")]
    OctetOutOfRange(u16),

    #[error("prefix {0:?} is not a number")]
    InvalidPrefix(String),

    #[error("prefix /{0} is outside 1..=32")]
    PrefixOutOfRange(u16),
}

/// Static IP configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error(transparent)]
    Cidr(#[from] CidrError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Rc(#[from] RcError),
}

/// Friendly result alias :3
pub type Result<T, E = NetError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::fake::ScriptedPrompter;
    use chrono::NaiveDate;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;
    use std::fs::{read_to_string, write};

    #[test_case("192.168.1.10/24", "192.168.1.10", 24; "class c")]
    #[test_case("10.0.0.1/8", "10.0.0.1", 8; "class a")]
    #[test_case(" 172.16.5.4/32 ", "172.16.5.4", 32; "host route trimmed")]
    #[test_case("0.0.0.0/1", "0.0.0.0", 1; "smallest prefix")]
    #[test]
    fn parse_valid_cidr(input: &str, address: &str, prefix: u8) {
        let cidr: Ipv4Cidr = input.parse().unwrap();
        pretty_assertions::assert_eq!(cidr.address(), address.parse::<Ipv4Addr>().unwrap());
        pretty_assertions::assert_eq!(cidr.prefix(), prefix);
    }

    #[test_case("192.168.1.256/24", CidrError::OctetOutOfRange(256); "octet above 255")]
    #[test_case("999.1.1.1/24", CidrError::OctetOutOfRange(999); "first octet above 255")]
    #[test_case("192.168.1.10/0", CidrError::PrefixOutOfRange(0); "prefix zero")]
    #[test_case("192.168.1.10/33", CidrError::PrefixOutOfRange(33); "prefix above 32")]
    #[test_case("192.168.1.10", CidrError::MissingPrefix; "no prefix")]
    #[test_case("192.168.1/24", CidrError::OctetCount(3); "three octets")]
    #[test_case("192.168.one.10/24", CidrError::InvalidOctet("one".into()); "word octet")]
    #[test_case("192.168.1.10/x", CidrError::InvalidPrefix("x".into()); "word prefix")]
    #[test]
    fn parse_invalid_cidr(input: &str, expect: CidrError) {
        pretty_assertions::assert_eq!(input.parse::<Ipv4Cidr>().unwrap_err(), expect);
    }

    #[test]
    fn router_guess_is_first_host() {
        let cidr: Ipv4Cidr = "192.168.7.42/24".parse().unwrap();
        assert_eq!(default_router(&cidr), Ipv4Addr::new(192, 168, 7, 1));

        let cidr: Ipv4Cidr = "10.1.2.3/32".parse().unwrap();
        assert_eq!(default_router(&cidr), Ipv4Addr::new(10, 1, 2, 3));
    }

    #[test]
    fn prompt_reasks_on_invalid_cidr() -> anyhow::Result<()> {
        let prompter = ScriptedPrompter::new().answers([
            "192.168.1.300/24",
            "192.168.1.10/40",
            "192.168.1.10/24",
            "",
            "1.1.1.1 8.8.8.8",
        ]);

        let settings = StaticIp::prompt_missing(&prompter, "eth0".into(), None, None, vec![])?;
        assert_eq!(settings.address.to_string(), "192.168.1.10/24");
        assert_eq!(settings.router, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(
            settings.dns,
            vec![Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(8, 8, 8, 8)]
        );

        let rejected: Vec<String> = prompter.rejected().into_iter().map(|(answer, _)| answer).collect();
        assert_eq!(rejected, vec!["192.168.1.300/24", "192.168.1.10/40"]);

        Ok(())
    }

    #[test]
    fn dhcpcd_block_is_idempotent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let conf = dir.path().join("dhcpcd.conf");
        write(&conf, "hostname\nclientid\n")?;
        let started = NaiveDate::from_ymd_opt(2026, 10, 18)
            .and_then(|date| date.and_hms_opt(7, 0, 0))
            .unwrap();

        let settings = StaticIp {
            interface: "eth0".into(),
            address: "192.168.1.10/24".parse()?,
            router: Ipv4Addr::new(192, 168, 1, 1),
            dns: vec![Ipv4Addr::new(1, 1, 1, 1)],
        };

        let mut session = RcSession::new(started);
        assert_eq!(settings.write_dhcpcd(&mut session, &conf)?, Outcome::Appended);
        let expect = indoc! {"
            hostname
            clientid
            # Managed by hostwright (2026-10-18 07:00:00)
            # >>> hostwright static-ip eth0 >>>
            interface eth0
            static ip_address=192.168.1.10/24
            static routers=192.168.1.1
            static domain_name_servers=1.1.1.1
            # <<< hostwright static-ip eth0 <<<
        "};
        assert_eq!(read_to_string(&conf)?, expect);

        let mut session = RcSession::new(started);
        assert_eq!(settings.write_dhcpcd(&mut session, &conf)?, Outcome::Unchanged);
        assert_eq!(read_to_string(&conf)?, expect);

        Ok(())
    }
}
