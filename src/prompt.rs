// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! User interaction.
//!
//! Any question hostwright asks the user goes through a [`Prompter`]. The
//! terminal implementation is backed by `inquire`. Invalid answers are
//! rejected by a validator and the question is asked again, so bad input
//! never aborts a command.

use inquire::{validator::Validation, Confirm, CustomUserError, Text};

/// Validator for free-form text answers.
///
/// Returns a human readable reason on rejection.
pub type TextValidator = fn(&str) -> std::result::Result<(), String>;

/// Ask the user things.
pub trait Prompter {
    /// Ask a yes or no question.
    ///
    /// # Errors
    ///
    /// - Return [`PromptError`] if no answer could be obtained.
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;

    /// Ask for text until the answer passes the validator.
    ///
    /// # Errors
    ///
    /// - Return [`PromptError`] if no answer could be obtained.
    fn text(&self, message: &str, default: Option<&str>, validator: TextValidator)
        -> Result<String>;
}

/// Terminal prompter.
#[derive(Debug, Default, Clone, Copy)]
pub struct InquirePrompter;

impl InquirePrompter {
    pub fn new() -> Self {
        Self
    }
}

impl Prompter for InquirePrompter {
    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        Ok(Confirm::new(message).with_default(default).prompt()?)
    }

    fn text(
        &self,
        message: &str,
        default: Option<&str>,
        validator: TextValidator,
    ) -> Result<String> {
        let mut prompt = Text::new(message).with_validator(
            move |input: &str| -> std::result::Result<Validation, CustomUserError> {
                Ok(match validator(input.trim()) {
                    Ok(()) => Validation::Valid,
                    Err(reason) => Validation::Invalid(reason.into()),
                })
            },
        );
        if let Some(default) = default {
            prompt = prompt.with_default(default);
        }

        Ok(prompt.prompt()?.trim().to_string())
    }
}

/// Prompter that refuses to ask anything.
///
/// Used when the caller already agreed to everything up front, e.g., through
/// a `--yes` flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Prompter for AssumeYes {
    fn confirm(&self, _message: &str, _default: bool) -> Result<bool> {
        Ok(true)
    }

    fn text(
        &self,
        message: &str,
        default: Option<&str>,
        validator: TextValidator,
    ) -> Result<String> {
        let answer = default.ok_or_else(|| PromptError::Unanswered(message.into()))?;
        validator(answer).map_err(|_| PromptError::Unanswered(message.into()))?;
        Ok(answer.into())
    }
}

/// Prompting error types.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// Terminal prompt failed or was cancelled.
    #[error(transparent)]
    Inquire(#[from] inquire::InquireError),

    /// Question cannot be answered without user interaction.
    #[error("no answer available for {0:?}")]
    Unanswered(String),
}

/// Friendly result alias :3
pub type Result<T, E = PromptError> = std::result::Result<T, E>;


#[cfg(test)]
mod tests {
    use super::{fake::ScriptedPrompter, *};
    use pretty_assertions::assert_eq;

    fn even_length(input: &str) -> std::result::Result<(), String> {
        if input.len() % 2 == 0 {
            Ok(())
        } else {
            Err("odd length".into())
        }
    }

    #[test]
    fn scripted_prompter_asks_again_after_rejection() -> anyhow::Result<()> {
        let prompter = ScriptedPrompter::new().answers(["abc", "abcd"]);
        let answer = prompter.text("word", None, even_length)?;
        assert_eq!(answer, "abcd");
        assert_eq!(prompter.rejected(), vec![("abc".to_string(), "odd length".to_string())]);
        Ok(())
    }

    #[test]
    fn assume_yes_uses_default_or_fails() {
        assert!(AssumeYes.confirm("go?", false).unwrap());
        assert_eq!(AssumeYes.text("word", Some("ab"), even_length).unwrap(), "ab");
        assert!(matches!(
            AssumeYes.text("word", None, even_length),
            Err(PromptError::Unanswered(_))
        ));
    }
}
