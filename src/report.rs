use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::fmt::Display;
use std::path::Path;

use crate::deps::ToolStatus;
use crate::plan::{Step, StepKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Outcome {
    Passed,
    Failed { exit_code: Option<i32> },
    Missing,
    VerificationFailed { reason: String },
    Skipped,
}

impl Outcome {
    pub fn passed(&self) -> bool {
        matches!(self, Outcome::Passed)
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, Outcome::Passed | Outcome::Skipped)
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Passed => write!(f, "passed"),
            Outcome::Failed {
                exit_code: Some(code),
            } => write!(f, "exit status {}", code),
            Outcome::Failed { exit_code: None } => write!(f, "terminated by signal"),
            Outcome::Missing => write!(f, "program not found"),
            Outcome::VerificationFailed { reason } => write!(f, "{}", reason),
            Outcome::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub kind: StepKind,
    pub label: String,
    pub command: String,
    pub outcome: Outcome,
    pub seconds: f64,
}

impl StepRecord {
    pub fn new(step: &Step, command: String, outcome: Outcome, seconds: f64) -> Self {
        Self {
            kind: step.kind,
            label: step.label.clone(),
            command,
            outcome,
            seconds,
        }
    }
}

/// Everything that happened during one run of the suite.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started: String,
    pub finished: String,
    pub elapsed_seconds: f64,
    pub tools: Vec<ToolStatus>,
    pub steps: Vec<StepRecord>,
    // Why the run stopped before or between the steps, e.g. a failed import check
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn new(started: String) -> Self {
        Self {
            started,
            finished: String::new(),
            elapsed_seconds: 0.0,
            tools: Vec::new(),
            steps: Vec::new(),
            aborted: None,
        }
    }

    pub fn failures(&self) -> Vec<&StepRecord> {
        self.steps.iter().filter(|s| s.outcome.is_failure()).collect()
    }

    pub fn passed(&self) -> bool {
        self.aborted.is_none() && self.failures().is_empty()
    }

    pub fn n_passed(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.passed()).count()
    }

    pub fn n_skipped(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome == Outcome::Skipped)
            .count()
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Successfully wrote report to {}", path.display());
        Ok(())
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(reason) = &self.aborted {
            writeln!(f, "Aborted: {}", reason)?;
        }
        writeln!(f, "Steps passed: {}", self.n_passed())?;
        writeln!(f, "Steps failed: {}", self.failures().len())?;
        writeln!(f, "Steps skipped: {}", self.n_skipped())?;
        for failure in self.failures() {
            writeln!(f, "\t{}: {}", failure.label, failure.outcome)?;
            writeln!(f, "\t\t{}", failure.command)?;
        }
        Ok(())
    }
}
