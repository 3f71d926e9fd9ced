// file: src/host/prompt.rs
// version: 1.0.0
// guid: 6e94b2c0-18d5-4a3f-8c7e-d2a05f9b1e34

//! Interactive questions asked during a run

use crate::Result;
use std::collections::VecDeque;
use std::io::{BufRead, Write};

/// Source of operator answers
pub trait Prompter: Send {
    /// Ask a yes/no question; anything but `y`/`yes` is no
    fn confirm(&mut self, question: &str) -> Result<bool>;

    /// Ask for a line of free text
    fn input(&mut self, question: &str) -> Result<String>;
}

/// Reads answers from stdin
pub struct TerminalPrompter;

impl TerminalPrompter {
    fn read_line(question: &str) -> Result<String> {
        print!("{}", question);
        std::io::stdout()
            .flush()
            .map_err(crate::error::ProvisionError::Io)?;

        let mut answer = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut answer)
            .map_err(crate::error::ProvisionError::Io)?;
        Ok(answer.trim().to_string())
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = Self::read_line(&format!("{} [y/N]: ", question))?;
        Ok(is_yes(&answer))
    }

    fn input(&mut self, question: &str) -> Result<String> {
        Self::read_line(&format!("{}: ", question))
    }
}

/// Pre-recorded answers, used for `--yes` and in tests
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    confirm_default: bool,
    answers: VecDeque<String>,
}

impl ScriptedPrompter {
    /// Answer yes to every confirmation
    pub fn assume_yes() -> Self {
        Self {
            confirm_default: true,
            answers: VecDeque::new(),
        }
    }

    /// Replay the given answers in order, then fall back to `no`
    pub fn with_answers<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            confirm_default: false,
            answers: answers.into_iter().map(Into::into).collect(),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&mut self, _question: &str) -> Result<bool> {
        Ok(self
            .answers
            .pop_front()
            .map(|a| is_yes(&a))
            .unwrap_or(self.confirm_default))
    }

    fn input(&mut self, question: &str) -> Result<String> {
        self.answers.pop_front().ok_or_else(|| {
            crate::error::ProvisionError::cancelled(format!("No answer available for '{}'", question))
        })
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
