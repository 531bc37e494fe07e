// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use hostwright::{
    backup::Backups,
    config::{Settings, UpdateSource},
    dotfiles::{nano_syntax_dir, Dotfile, Scope},
    exit::{exit_code, GENERAL, SUCCESS},
    github::{
        api::GhCli,
        client::Client,
        copy::{CopyOptions, OrgCopier, Skip},
        delete::{delete_repos, Selection},
        mirror::GitMirror,
    },
    ollama::{HttpProbe, LaunchOptions, LaunchOutcome, Launcher, DEFAULT_HOST, DEFAULT_SESSION},
    path::{default_mirror_dir, default_settings_path, home_dir},
    prompt::{AssumeYes, InquirePrompter, Prompter},
    rcfile::{LineRule, RcSession},
    sync::{sync, Backend, SyncPlan},
    syscall::{Shell, Syscall, SystemShell},
    system::{
        net::{Ipv4Cidr, StaticIp, DHCPCD_CONF},
        pkg::{Installer, PackageManager},
        privilege::Privilege,
    },
    update::{HttpFetcher, UpdateOutcome, Updater},
};

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::{env, net::Ipv4Addr, path::PathBuf, process::exit, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "hostwright [options] <hostwright-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Config(opts) => run_config(opts),
            Command::Pkg(opts) => run_pkg(opts),
            Command::Net(opts) => run_net(opts),
            Command::Gh(opts) => run_gh(opts),
            Command::Sync(opts) => run_sync(opts),
            Command::Ollama(opts) => run_ollama(opts),
            Command::Update(opts) => run_update(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Apply dotfile profiles, or set single configuration lines.
    #[command(override_usage = "hostwright config <nano|screen|shell|line> [options]")]
    Config(ConfigOptions),

    /// Install OS packages.
    #[command(override_usage = "hostwright pkg install [options] <package>...")]
    Pkg(PkgOptions),

    /// Configure host networking.
    #[command(override_usage = "hostwright net static-ip [options]")]
    Net(NetOptions),

    /// Copy or clean up GitHub organizations.
    #[command(override_usage = "hostwright gh <copy|delete> [options]")]
    Gh(GhOptions),

    /// Synchronize directories with rsync or robocopy.
    #[command(override_usage = "hostwright sync [options] <source> <destination>")]
    Sync(SyncOptions),

    /// Run ollama inside a screen session.
    #[command(override_usage = "hostwright ollama [options] [<model>]...")]
    Ollama(OllamaOptions),

    /// Refresh managed files from their remote source.
    #[command(override_usage = "hostwright update [options] [<url> <target>]")]
    Update(UpdateOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ConfigOptions {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Apply nano profile.
    Nano(DotfileOptions),

    /// Apply GNU screen profile.
    Screen(DotfileOptions),

    /// Apply shell rc profile.
    Shell(DotfileOptions),

    /// Make sure a configuration line is present exactly once.
    Line(LineOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DotfileOptions {
    /// Edit system-wide configuration under /etc instead of home directory.
    #[arg(short, long)]
    pub system: bool,

    /// Report what would change without writing anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct LineOptions {
    /// Configuration file to edit.
    #[arg(required = true, value_name = "file")]
    pub file: PathBuf,

    /// Regex matching lines that configure the same setting.
    #[arg(required = true, value_name = "key")]
    pub key: String,

    /// Full line that should be present.
    #[arg(required = true, value_name = "line")]
    pub line: String,

    /// Report what would change without writing anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PkgOptions {
    #[command(subcommand)]
    pub command: PkgCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum PkgCommand {
    /// Install packages that are not installed yet.
    Install(InstallOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InstallOptions {
    /// Packages to install.
    #[arg(required = true, value_name = "package")]
    pub packages: Vec<String>,

    /// Package manager to use instead of the detected one.
    #[arg(short, long, value_name = "apt|brew|dnf|zypper")]
    pub manager: Option<String>,

    /// Refresh package index before installing.
    #[arg(short, long)]
    pub update: bool,

    /// Report what would be installed without installing anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct NetOptions {
    #[command(subcommand)]
    pub command: NetCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum NetCommand {
    /// Configure static IPv4 address through dhcpcd.
    StaticIp(StaticIpOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct StaticIpOptions {
    /// Network interface to configure.
    #[arg(short, long, default_value = "eth0", value_name = "name")]
    pub interface: String,

    /// Static address with prefix length, e.g., 192.168.1.10/24.
    #[arg(short, long, value_name = "cidr")]
    pub address: Option<Ipv4Cidr>,

    /// Router address.
    #[arg(short, long, value_name = "ip")]
    pub router: Option<Ipv4Addr>,

    /// DNS server address, can be given more than once.
    #[arg(short, long, value_name = "ip")]
    pub dns: Vec<Ipv4Addr>,

    /// Path to dhcpcd configuration.
    #[arg(short, long, default_value = DHCPCD_CONF, value_name = "path")]
    pub config: PathBuf,

    /// Restart dhcpcd afterwards.
    #[arg(long)]
    pub apply: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct GhOptions {
    #[command(subcommand)]
    pub command: GhCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum GhCommand {
    /// Copy repositories, issues, pull requests, and discussions between
    /// organizations.
    Copy(GhCopyOptions),

    /// Delete repositories of an organization.
    Delete(GhDeleteOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct GhCopyOptions {
    /// Organization to copy from.
    #[arg(long, env = "SRC_ORG", value_name = "org")]
    pub src_org: Option<String>,

    /// Organization to copy into.
    #[arg(long, env = "DST_ORG", value_name = "org")]
    pub dst_org: Option<String>,

    /// Seconds to sleep after each mutating API call.
    #[arg(long, env = "THROTTLE", value_name = "secs")]
    pub throttle: Option<f64>,

    /// Only copy repositories matching glob, can be given more than once.
    #[arg(long = "repo", value_name = "glob")]
    pub repos: Vec<String>,

    /// Label attached to issues that archive pull requests.
    #[arg(long, value_name = "name")]
    pub archive_label: Option<String>,

    /// Scratch directory for bare repository mirrors.
    #[arg(long, value_name = "path")]
    pub workdir: Option<PathBuf>,

    /// Do not mirror git refs.
    #[arg(long)]
    pub skip_git: bool,

    /// Do not mirror wikis.
    #[arg(long)]
    pub skip_wiki: bool,

    /// Do not copy labels and milestones.
    #[arg(long)]
    pub skip_labels: bool,

    /// Do not copy issues.
    #[arg(long)]
    pub skip_issues: bool,

    /// Do not archive pull requests.
    #[arg(long)]
    pub skip_prs: bool,

    /// Do not copy discussions.
    #[arg(long)]
    pub skip_discussions: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct GhDeleteOptions {
    /// Organization to delete repositories from.
    #[arg(long, required = true, value_name = "org")]
    pub org: String,

    /// Select every repository.
    #[arg(long, conflicts_with = "matches")]
    pub all: bool,

    /// Select repositories matching glob, can be given more than once.
    #[arg(long = "match", value_name = "glob")]
    pub matches: Vec<String>,

    /// Never select repositories matching glob.
    #[arg(long = "exclude", value_name = "glob")]
    pub excludes: Vec<String>,

    /// Actually delete. Without this only a listing is shown.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncOptions {
    /// Directory to copy contents from, may be `host:path`.
    #[arg(required = true, value_name = "source")]
    pub source: String,

    /// Directory to copy contents into, may be `host:path`.
    #[arg(required = true, value_name = "destination")]
    pub destination: String,

    /// Remove files from destination that are absent in source.
    #[arg(short, long)]
    pub delete: bool,

    /// Skip paths matching pattern, trailing `/` matches directories only.
    #[arg(short, long = "exclude", value_name = "pattern")]
    pub excludes: Vec<String>,

    /// Show what would be copied without copying.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Copy tool to use instead of the platform default.
    #[arg(short, long, value_name = "rsync|robocopy")]
    pub backend: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct OllamaOptions {
    /// Models to open a window for.
    #[arg(value_name = "model")]
    pub models: Vec<String>,

    /// Name of screen session.
    #[arg(short, long, value_name = "name")]
    pub session: Option<String>,

    /// Base URL of ollama API.
    #[arg(long, value_name = "url")]
    pub host: Option<String>,

    /// Start session without attaching to it.
    #[arg(short, long)]
    pub detach: bool,

    /// Wait up to given seconds for the API to answer.
    #[arg(short, long, value_name = "secs")]
    pub wait: Option<u64>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct UpdateOptions {
    /// URL to fetch content from.
    #[arg(value_name = "url", requires = "target")]
    pub url: Option<String>,

    /// Local file to overwrite.
    #[arg(value_name = "target")]
    pub target: Option<PathBuf>,

    /// Overwrite without asking.
    #[arg(short, long)]
    pub yes: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            // INVARIANT: Help and version requests are not usage errors.
            let code = if error.use_stderr() { GENERAL } else { SUCCESS };
            if let Err(io_error) = error.print() {
                error!("{io_error:?}");
            }
            exit(code);
        }
    };

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(exit_code(&error));
    }

    exit(SUCCESS)
}

fn load_settings() -> Result<Settings> {
    let path = default_settings_path()?;
    Settings::load(&path).with_context(|| format!("failed to load settings from {path:?}"))
}

fn rc_session(dry_run: bool) -> RcSession {
    RcSession::new(Local::now().naive_local()).dry_run(dry_run)
}

fn run_config(opts: ConfigOptions) -> Result<()> {
    let (dotfile, opts) = match opts.command {
        ConfigCommand::Nano(opts) => (Dotfile::Nano, opts),
        ConfigCommand::Screen(opts) => (Dotfile::Screen, opts),
        ConfigCommand::Shell(opts) => (Dotfile::Shell, opts),
        ConfigCommand::Line(opts) => return run_config_line(opts),
    };

    let shell = SystemShell::new();
    let scope = if opts.system { Scope::System } else { Scope::User };
    let login_shell = env::var("SHELL").ok();
    let target = dotfile.target(scope, &home_dir()?, login_shell.as_deref());

    info!("apply {dotfile} profile to {}", target.display());
    let mut session = rc_session(opts.dry_run);
    dotfile.apply(
        &mut session,
        Privilege::detect(&shell),
        scope,
        &target,
        &nano_syntax_dir(&shell),
    )?;

    Ok(())
}

fn run_config_line(opts: LineOptions) -> Result<()> {
    let rule = LineRule::new(&opts.key, opts.line)?;
    rc_session(opts.dry_run).apply_rules(&opts.file, [&rule])?;

    Ok(())
}

fn run_pkg(opts: PkgOptions) -> Result<()> {
    let PkgCommand::Install(opts) = opts.command;
    let shell = SystemShell::new();
    let manager = match opts.manager {
        Some(manager) => manager.parse::<PackageManager>()?,
        None => PackageManager::detect(&shell)?,
    };

    let report = Installer::new(&shell, manager, Privilege::detect(&shell))
        .dry_run(opts.dry_run)
        .install(opts.packages, opts.update)?;
    if !report.present.is_empty() {
        info!("already installed: {}", report.present.join(", "));
    }

    Ok(())
}

fn run_net(opts: NetOptions) -> Result<()> {
    let NetCommand::StaticIp(opts) = opts.command;
    let shell = SystemShell::new();
    let privilege = Privilege::detect(&shell);
    if opts.config.starts_with("/etc") {
        privilege.require_root(&format!("editing {}", opts.config.display()))?;
    }
    if opts.apply {
        privilege.require_root("restarting dhcpcd")?;
        shell.require("systemctl")?;
    }

    let settings = StaticIp::prompt_missing(
        &InquirePrompter::new(),
        opts.interface,
        opts.address,
        opts.router,
        opts.dns,
    )?;
    let outcome = settings.write_dhcpcd(&mut rc_session(false), &opts.config)?;

    if opts.apply {
        if !outcome.is_change() {
            info!("restarting dhcpcd anyway");
        }
        shell.run_interactive(&Syscall::new("systemctl").args(["restart", "dhcpcd"]))?;
        info!("dhcpcd restarted, {} now uses {}", settings.interface, settings.address);
    } else if outcome.is_change() {
        info!("restart dhcpcd or reboot to use the new address");
    }

    Ok(())
}

fn run_gh(opts: GhOptions) -> Result<()> {
    match opts.command {
        GhCommand::Copy(opts) => run_gh_copy(opts),
        GhCommand::Delete(opts) => run_gh_delete(opts),
    }
}

fn run_gh_copy(opts: GhCopyOptions) -> Result<()> {
    let settings = load_settings()?.github;
    let src_org = opts
        .src_org
        .or(settings.src_org)
        .ok_or_else(|| anyhow!("no source organization, pass --src-org or set SRC_ORG"))?;
    let dst_org = opts
        .dst_org
        .or(settings.dst_org)
        .ok_or_else(|| anyhow!("no destination organization, pass --dst-org or set DST_ORG"))?;
    let throttle = match opts.throttle.or(settings.throttle) {
        Some(secs) => Duration::try_from_secs_f64(secs)
            .with_context(|| format!("invalid throttle of {secs} seconds"))?,
        None => Duration::ZERO,
    };
    let workdir = match opts.workdir.or(settings.workdir) {
        Some(workdir) => workdir,
        None => default_mirror_dir()?,
    };

    let skip = Skip {
        git: opts.skip_git,
        wiki: opts.skip_wiki,
        labels: opts.skip_labels,
        issues: opts.skip_issues,
        prs: opts.skip_prs,
        discussions: opts.skip_discussions,
    };
    let mut options = CopyOptions::new(src_org.as_str(), dst_org.as_str(), workdir)
        .repos(opts.repos)?
        .skip(skip);
    if let Some(label) = opts.archive_label.or(settings.archive_label) {
        options = options.archive_label(label);
    }

    let shell = SystemShell::new();
    let api = GhCli::new(&shell);
    api.ensure_authenticated()?;
    let mirror = GitMirror::new(&shell);
    if !skip.git || !skip.wiki {
        mirror.ensure_git()?;
    }

    info!("copy {src_org} into {dst_org}");
    let client = Client::new(&api).throttle(throttle);
    let report = OrgCopier::new(client, &mirror, options).run()?;
    if report.failures > 0 {
        warn!("{} items failed, see warnings above", report.failures);
    }

    Ok(())
}

fn run_gh_delete(opts: GhDeleteOptions) -> Result<()> {
    let selection = Selection::new(opts.all, &opts.matches, &opts.excludes)?;
    let dry_run = !opts.yes || env::var("DRY_RUN").is_ok_and(|value| is_truthy(&value));

    let shell = SystemShell::new();
    let api = GhCli::new(&shell);
    api.ensure_authenticated()?;

    delete_repos(&Client::new(&api), &shell, &opts.org, &selection, dry_run)?;

    Ok(())
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "" | "0" | "false" | "no")
}

fn run_sync(opts: SyncOptions) -> Result<()> {
    let settings = load_settings()?.sync;
    let backend = match opts.backend {
        Some(backend) => backend.parse::<Backend>()?,
        None => Backend::native(),
    };

    let plan = SyncPlan::new(opts.source, opts.destination)
        .delete(opts.delete)
        .exclude(settings.exclude)
        .exclude(opts.excludes)
        .dry_run(opts.dry_run);
    sync(&SystemShell::new(), backend, &plan)?;

    Ok(())
}

fn run_ollama(opts: OllamaOptions) -> Result<()> {
    let settings = load_settings()?.ollama;
    let options = LaunchOptions {
        session: opts
            .session
            .or(settings.session)
            .unwrap_or_else(|| DEFAULT_SESSION.into()),
        models: if opts.models.is_empty() {
            settings.models
        } else {
            opts.models
        },
        host: opts.host.or(settings.host).unwrap_or_else(|| DEFAULT_HOST.into()),
        detach: opts.detach,
        wait: opts.wait.map(Duration::from_secs),
    };

    let shell = SystemShell::new();
    let probe = HttpProbe::new()?;
    let session = options.session.as_str();
    match Launcher::new(&shell, &probe, home_dir()?).launch(&options)? {
        LaunchOutcome::Started { layout } if options.detach => {
            info!(
                "started session {session} from {}, attach with `screen -r {session}`",
                layout.display()
            );
        }
        LaunchOutcome::Started { .. } => {}
        LaunchOutcome::AlreadyRunning => {
            info!("session {session} already running, attach with `screen -r {session}`");
        }
        LaunchOutcome::NothingToRun => {
            info!("ollama already answers at {}, no models requested", options.host);
        }
    }

    Ok(())
}

fn run_update(opts: UpdateOptions) -> Result<()> {
    let sources = match (opts.url, opts.target) {
        (Some(url), Some(target)) => vec![UpdateSource { url, target }],
        _ => load_settings()?.update.sources,
    };
    if sources.is_empty() {
        info!("nothing to update, pass <url> <target> or add [[update.source]] to settings");
        return Ok(());
    }

    if opts.yes {
        update_all(&sources, &AssumeYes)
    } else {
        update_all(&sources, &InquirePrompter::new())
    }
}

fn update_all(sources: &[UpdateSource], prompter: &impl Prompter) -> Result<()> {
    let fetcher = HttpFetcher::new()?;
    let shell = SystemShell::new();
    let mut updater = Updater::new(
        &fetcher,
        &shell,
        prompter,
        Backups::new(Local::now().naive_local()),
    );

    for source in sources {
        let outcome = updater
            .update(&source.url, &source.target)
            .with_context(|| format!("failed to update {:?}", source.target.display()))?;
        if let UpdateOutcome::Updated { backup: Some(backup) } = outcome {
            info!("previous content kept at {}", backup.display());
        }
    }

    Ok(())
}
