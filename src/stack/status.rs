//! Stack status classification and poll budgeting.

use serde::Serialize;
use std::time::Duration;

/// How an observed status affects a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// Terminal, converged.
    Success,
    /// Terminal, failed or rolling back.
    Failure,
    /// Still moving; poll again.
    InProgress,
}

/// Classifies a stack status string.
///
/// Failure markers are checked first, so `UPDATE_ROLLBACK_COMPLETE` is a failure.
#[must_use]
pub fn classify(status: &str) -> StatusClass {
    if status.contains("ROLLBACK") || status.contains("FAILED") {
        StatusClass::Failure
    } else if status.contains("COMPLETE") {
        StatusClass::Success
    } else {
        StatusClass::InProgress
    }
}

/// Millisecond budget for a poll loop.
///
/// `None` means poll forever. A budget at or below zero is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    granted: Option<i64>,
    remaining: Option<i64>,
}

impl PollBudget {
    /// Creates a budget from an optional millisecond value.
    #[must_use]
    pub const fn from_ms(ms: Option<i64>) -> Self {
        Self {
            granted: ms,
            remaining: ms,
        }
    }

    /// A budget that never runs out.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self::from_ms(None)
    }

    /// Returns true if no further poll may be issued.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        match self.remaining {
            Some(ms) => ms <= 0,
            None => false,
        }
    }

    /// Charges one poll interval against the budget.
    pub fn consume(&mut self, interval: Duration) {
        if let Some(ms) = self.remaining.as_mut() {
            let step = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
            *ms = ms.saturating_sub(step);
        }
    }

    /// Milliseconds left, if bounded.
    #[must_use]
    pub const fn remaining_ms(&self) -> Option<i64> {
        self.remaining
    }

    /// Milliseconds originally granted (negative grants report as zero).
    #[must_use]
    pub fn granted_ms(&self) -> u64 {
        self.granted
            .map_or(0, |ms| u64::try_from(ms.max(0)).unwrap_or_default())
    }
}
