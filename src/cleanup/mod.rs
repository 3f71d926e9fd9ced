// file: src/cleanup/mod.rs
// version: 1.1.0
// guid: 1a7e5c29-8b30-4f6d-a2c4-e95d07b3f861

//! Best-effort teardown of everything a previous provisioning run left behind
//!
//! Every step records an [`Outcome`]; a failing step never stops the ones
//! after it.

pub mod reconciler;

pub use reconciler::{CleanupMode, StateReconciler};

use colored::Colorize;
use serde::Serialize;
use std::fmt;

/// Result of one cleanup step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Ok(String),
    Skipped(String),
    Failed(String),
}

impl Outcome {
    pub fn ok(detail: impl Into<String>) -> Self {
        Outcome::Ok(detail.into())
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Outcome::Skipped(reason.into())
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Outcome::Failed(reason.into())
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    fn label(&self) -> &'static str {
        match self {
            Outcome::Ok(_) => "ok",
            Outcome::Skipped(_) => "skipped",
            Outcome::Failed(_) => "FAILED",
        }
    }

    fn detail(&self) -> &str {
        match self {
            Outcome::Ok(d) | Outcome::Skipped(d) | Outcome::Failed(d) => d,
        }
    }
}

impl<E: fmt::Display> From<Result<String, E>> for Outcome {
    fn from(result: Result<String, E>) -> Self {
        match result {
            Ok(detail) => Outcome::Ok(detail),
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail().is_empty() {
            f.write_str(self.label())
        } else {
            write!(f, "{}: {}", self.label(), self.detail())
        }
    }
}

/// One row of the report
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: String,
    pub outcome: Outcome,
}

/// Outcomes of a full cleanup pass, in execution order
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub steps: Vec<StepRecord>,
}

impl CleanupReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: impl Into<String>, outcome: Outcome) {
        self.steps.push(StepRecord {
            step: step.into(),
            outcome,
        });
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| s.outcome.is_failed())
    }

    /// True when no step failed
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn outcome_of(&self, step: &str) -> Option<&Outcome> {
        self.steps.iter().find(|s| s.step == step).map(|s| &s.outcome)
    }

    /// Two-column table of step and outcome
    pub fn render(&self) -> String {
        let width = self.steps.iter().map(|s| s.step.len()).max().unwrap_or(4).max(4);
        let mut out = format!("{:<width$}  {}\n", "STEP", "OUTCOME", width = width);
        out.push_str(&format!("{:-<1$}\n", "", width + 40));
        for record in &self.steps {
            let label = match record.outcome {
                Outcome::Ok(_) => record.outcome.label().green(),
                Outcome::Skipped(_) => record.outcome.label().yellow(),
                Outcome::Failed(_) => record.outcome.label().red().bold(),
            };
            let detail = record.outcome.detail();
            if detail.is_empty() {
                out.push_str(&format!("{:<width$}  {}\n", record.step, label, width = width));
            } else {
                out.push_str(&format!(
                    "{:<width$}  {} ({})\n",
                    record.step,
                    label,
                    detail,
                    width = width
                ));
            }
        }
        out
    }
}
