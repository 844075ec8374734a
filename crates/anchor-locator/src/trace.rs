//! Decision trace for resolution passes
//!
//! The resolver reports every lookup it performs to a [`ResolutionObserver`].
//! Production wiring logs through `tracing`; tests record the events and
//! assert on them.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::LocatorError;

/// Resolution stage a lookup belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Candidate,
    Fallback,
    Generic,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Candidate => "candidate",
            Stage::Fallback => "fallback",
            Stage::Generic => "generic",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a single lookup produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Matched,
    NotFound,
    TimedOut,
    Invalid { reason: String },
    Rejected { validator: &'static str },
}

impl From<&LocatorError> for Outcome {
    fn from(err: &LocatorError) -> Self {
        match err {
            LocatorError::NoMatch(_) | LocatorError::Exhausted(_) => Outcome::NotFound,
            LocatorError::Timeout { .. } => Outcome::TimedOut,
            LocatorError::InvalidCandidate { reason, .. } => Outcome::Invalid {
                reason: reason.clone(),
            },
            LocatorError::Rejected { validator, .. } => Outcome::Rejected {
                validator: *validator,
            },
        }
    }
}

/// One entry of the decision trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub site: String,
    pub stage: Stage,
    /// Position of the rule within its stage
    pub index: usize,
    pub selector: String,
    pub outcome: Outcome,
}

/// Receives the decision trace of every resolution pass
pub trait ResolutionObserver: Send + Sync {
    fn on_event(&self, event: &TraceEvent);
}

impl<F> ResolutionObserver for F
where
    F: Fn(&TraceEvent) + Send + Sync,
{
    fn on_event(&self, event: &TraceEvent) {
        self(event)
    }
}

/// Logs each event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ResolutionObserver for TracingObserver {
    fn on_event(&self, event: &TraceEvent) {
        match &event.outcome {
            Outcome::Matched => info!(
                site = %event.site,
                stage = %event.stage,
                selector = %event.selector,
                "Anchor candidate matched"
            ),
            outcome => debug!(
                site = %event.site,
                stage = %event.stage,
                index = event.index,
                selector = %event.selector,
                ?outcome,
                "Anchor candidate skipped"
            ),
        }
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ResolutionObserver for NoopObserver {
    fn on_event(&self, _event: &TraceEvent) {}
}

/// Keeps events in memory for later inspection
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<TraceEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    /// Drain recorded events.
    pub fn take(&self) -> Vec<TraceEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl ResolutionObserver for RecordingObserver {
    fn on_event(&self, event: &TraceEvent) {
        self.events.lock().push(event.clone());
    }
}
