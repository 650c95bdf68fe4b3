//! Cooperative cancellation: a cheap shared flag probed at defined points
//! (between files, every 100 source lines, between graph-builder phases).

use crate::error::{KgError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation handle for one parse job.
///
/// The orchestrator registers the token under the source id; an external
/// cancel request flips the flag, and the next probe inside the parser or
/// builder raises [`KgError::Cancelled`].
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the job cancelled. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Raise if the job has been cancelled.
    pub fn probe(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(KgError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Probe combining the job-wide cancellation flag with an optional per-file
/// deadline. Deadline overruns fail the file, not the job; cancellation
/// propagates to the orchestrator.
#[derive(Clone)]
pub struct ParseProbe {
    token: CancelToken,
    deadline: Option<Instant>,
}

impl ParseProbe {
    pub fn new(token: CancelToken, budget: Option<Duration>) -> Self {
        Self { token, deadline: budget.map(|d| Instant::now() + d) }
    }

    /// Probe without a deadline (used between files and by the builder).
    pub fn unbounded(token: CancelToken) -> Self {
        Self { token, deadline: None }
    }

    pub fn check(&self) -> Result<()> {
        self.token.probe()?;
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                return Err(KgError::Timeout("file parse budget exceeded".to_string()));
            }
        }
        Ok(())
    }
}
