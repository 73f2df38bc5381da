//! Run summary and terminal status.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::ShuttleError;
use crate::util::timestamp;

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Aborted(ShuttleError),
}

/// Accumulates what happened during a run and yields the exit code.
#[derive(Debug, Clone)]
pub struct RunSummary {
    started_at: DateTime<Local>,
    finished_at: Option<DateTime<Local>>,
    errors: u32,
    transients_completed: u32,
    slices_completed: u32,
    up_phases: Vec<Duration>,
    messages: Vec<String>,
    outcome: Option<RunOutcome>,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::start()
    }
}

impl RunSummary {
    #[must_use]
    pub fn start() -> Self {
        Self {
            started_at: Local::now(),
            finished_at: None,
            errors: 0,
            transients_completed: 0,
            slices_completed: 0,
            up_phases: Vec::new(),
            messages: Vec::new(),
            outcome: None,
        }
    }

    pub fn record_error(&mut self) {
        self.errors = self.errors.saturating_add(1);
    }

    pub fn record_up_phase(&mut self, d: Duration) {
        self.up_phases.push(d);
    }

    pub fn record_transient(&mut self, message: String) {
        self.transients_completed += 1;
        self.messages.push(message);
    }

    pub fn record_slice(&mut self) {
        self.slices_completed += 1;
    }

    /// Set the terminal outcome once; later calls are ignored.
    pub fn finish(&mut self, outcome: RunOutcome) {
        if self.outcome.is_none() {
            self.finished_at = Some(Local::now());
            self.outcome = Some(outcome);
        }
    }

    #[must_use]
    pub fn errors(&self) -> u32 {
        self.errors
    }

    #[must_use]
    pub fn transients_completed(&self) -> u32 {
        self.transients_completed
    }

    #[must_use]
    pub fn slices_completed(&self) -> u32 {
        self.slices_completed
    }

    #[must_use]
    pub fn up_phases(&self) -> &[Duration] {
        &self.up_phases
    }

    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    #[must_use]
    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors == 0 && matches!(self.outcome, Some(RunOutcome::Completed))
    }

    /// 0 on success, otherwise the error count (at least 1).
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            i32::try_from(self.errors.max(1)).unwrap_or(i32::MAX)
        }
    }

    /// Final status line in the run log format.
    #[must_use]
    pub fn status_line(&self) -> String {
        let at = timestamp(&self.finished_at.unwrap_or_else(Local::now));
        if self.is_success() {
            format!("Sequence successfully completed at {at}")
        } else {
            let n = self.errors.max(1);
            let s = if n == 1 { "" } else { "s" };
            format!("Sequence aborted with {n} error{s} at {at}")
        }
    }

    #[must_use]
    pub fn to_json(&self) -> SummaryJson {
        let (outcome, reason) = match &self.outcome {
            Some(RunOutcome::Completed) => ("completed", None),
            Some(RunOutcome::Aborted(e)) => ("aborted", Some(e.to_string())),
            None => ("running", None),
        };
        SummaryJson {
            outcome,
            reason,
            exit_code: self.exit_code(),
            errors: self.errors,
            transients_completed: self.transients_completed,
            slices_completed: self.slices_completed,
            up_phase_ms: self
                .up_phases
                .iter()
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                .collect(),
            started_at: timestamp(&self.started_at),
            finished_at: self.finished_at.as_ref().map(timestamp),
        }
    }
}

/// Serializable view of a `RunSummary`.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryJson {
    pub outcome: &'static str,
    pub reason: Option<String>,
    pub exit_code: i32,
    pub errors: u32,
    pub transients_completed: u32,
    pub slices_completed: u32,
    pub up_phase_ms: Vec<u64>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Started at {}", timestamp(&self.started_at))?;
        for m in &self.messages {
            writeln!(f, "{m}")?;
        }
        if let Some(RunOutcome::Aborted(e)) = &self.outcome {
            writeln!(f, "Reason: {e}")?;
        }
        write!(f, "{}", self.status_line())
    }
}
