//! Logging capability handed to the probe runner.
//!
//! The runner reports what happened as [`ProbeEvent`]s through a
//! [`ProbeLog`]; it never touches the global subscriber itself.

use std::fmt;
use std::sync::Mutex;

use cp_common::ReadStrategy;

use crate::logging::{event_names, LogContext, Stage};

/// Something worth logging during a probe run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeEvent {
    RunStarted {
        strategy: ReadStrategy,
        trials: u32,
        max_attempts: u32,
    },
    AncestorCreated {
        key: String,
    },
    AncestorFailed {
        error: String,
    },
    WriteFailed {
        trial: u32,
        error: String,
    },
    /// First read of a trial that came back in an unexpected shape.
    UnexpectedRead {
        trial: u32,
        attempt: u32,
        observed: String,
    },
    TrialRecorded {
        trial: u32,
        attempts: u32,
        elapsed_ms: f64,
    },
    TrialExhausted {
        trial: u32,
        attempts: u32,
        elapsed_ms: f64,
    },
    RunAborted {
        error: String,
    },
    RunFinished {
        recorded: u32,
        exhausted: u32,
        skipped: u32,
    },
}

impl ProbeEvent {
    /// Stable event name.
    pub fn name(&self) -> &'static str {
        match self {
            ProbeEvent::RunStarted { .. } => event_names::RUN_STARTED,
            ProbeEvent::AncestorCreated { .. } => event_names::ANCESTOR_CREATED,
            ProbeEvent::AncestorFailed { .. } => event_names::ANCESTOR_FAILED,
            ProbeEvent::WriteFailed { .. } => event_names::WRITE_FAILED,
            ProbeEvent::UnexpectedRead { .. } => event_names::POLL_UNEXPECTED,
            ProbeEvent::TrialRecorded { .. } => event_names::TRIAL_RECORDED,
            ProbeEvent::TrialExhausted { .. } => event_names::TRIAL_EXHAUSTED,
            ProbeEvent::RunAborted { .. } => event_names::RUN_ABORTED,
            ProbeEvent::RunFinished { .. } => event_names::RUN_FINISHED,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            ProbeEvent::RunStarted { .. } => Stage::Init,
            ProbeEvent::AncestorCreated { .. } | ProbeEvent::AncestorFailed { .. } => Stage::Setup,
            ProbeEvent::WriteFailed { .. } => Stage::Write,
            ProbeEvent::UnexpectedRead { .. }
            | ProbeEvent::TrialRecorded { .. }
            | ProbeEvent::TrialExhausted { .. }
            | ProbeEvent::RunAborted { .. } => Stage::Poll,
            ProbeEvent::RunFinished { .. } => Stage::Report,
        }
    }

    /// Trial index, for per-trial events.
    pub fn trial(&self) -> Option<u32> {
        match self {
            ProbeEvent::WriteFailed { trial, .. }
            | ProbeEvent::UnexpectedRead { trial, .. }
            | ProbeEvent::TrialRecorded { trial, .. }
            | ProbeEvent::TrialExhausted { trial, .. } => Some(*trial),
            _ => None,
        }
    }
}

impl fmt::Display for ProbeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeEvent::RunStarted {
                strategy,
                trials,
                max_attempts,
            } => write!(
                f,
                "probe started: strategy={} trials={} max_attempts={}",
                strategy, trials, max_attempts
            ),
            ProbeEvent::AncestorCreated { key } => write!(f, "ancestor created: {}", key),
            ProbeEvent::AncestorFailed { error } => write!(f, "ancestor put failed: {}", error),
            ProbeEvent::WriteFailed { trial, error } => {
                write!(f, "trial {}: put failed: {}", trial, error)
            }
            ProbeEvent::UnexpectedRead {
                trial,
                attempt,
                observed,
            } => write!(f, "trial {} attempt {}: {}", trial, attempt, observed),
            ProbeEvent::TrialRecorded {
                trial,
                attempts,
                elapsed_ms,
            } => write!(
                f,
                "trial {}: visible after {} attempts, {:.3} ms",
                trial, attempts, elapsed_ms
            ),
            ProbeEvent::TrialExhausted {
                trial,
                attempts,
                elapsed_ms,
            } => write!(
                f,
                "trial {}: not visible after {} attempts, {:.3} ms",
                trial, attempts, elapsed_ms
            ),
            ProbeEvent::RunAborted { error } => write!(f, "probe aborted: {}", error),
            ProbeEvent::RunFinished {
                recorded,
                exhausted,
                skipped,
            } => write!(
                f,
                "probe finished: recorded={} exhausted={} skipped={}",
                recorded, exhausted, skipped
            ),
        }
    }
}

/// Where the runner sends its events.
pub trait ProbeLog {
    fn info(&self, event: &ProbeEvent);
    fn error(&self, event: &ProbeEvent);
}

/// Forwards probe events to `tracing` with correlation ids.
#[derive(Debug, Clone)]
pub struct TracingProbeLog {
    ctx: LogContext,
}

impl TracingProbeLog {
    pub fn new(ctx: LogContext) -> Self {
        TracingProbeLog { ctx }
    }
}

impl ProbeLog for TracingProbeLog {
    fn info(&self, event: &ProbeEvent) {
        tracing::info!(
            target: "cp_core::probe",
            event = event.name(),
            run_id = %self.ctx.run_id,
            host_id = %self.ctx.host_id,
            run_prefix = self.ctx.run_prefix.as_deref(),
            stage = %event.stage(),
            trial = event.trial(),
            message = %event,
        );
    }

    fn error(&self, event: &ProbeEvent) {
        tracing::error!(
            target: "cp_core::probe",
            event = event.name(),
            run_id = %self.ctx.run_id,
            host_id = %self.ctx.host_id,
            run_prefix = self.ctx.run_prefix.as_deref(),
            stage = %event.stage(),
            trial = event.trial(),
            message = %event,
        );
    }
}

/// Severity an event was logged at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingProbeLog {
    events: Mutex<Vec<(Severity, ProbeEvent)>>,
}

impl RecordingProbeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    pub fn events(&self) -> Vec<(Severity, ProbeEvent)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events with the given name.
    pub fn named(&self, name: &str) -> Vec<ProbeEvent> {
        self.events()
            .into_iter()
            .filter(|(_, event)| event.name() == name)
            .map(|(_, event)| event)
            .collect()
    }

    fn push(&self, severity: Severity, event: &ProbeEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push((severity, event.clone()));
        }
    }
}

impl ProbeLog for RecordingProbeLog {
    fn info(&self, event: &ProbeEvent) {
        self.push(Severity::Info, event);
    }

    fn error(&self, event: &ProbeEvent) {
        self.push(Severity::Error, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_and_stages() {
        let event = ProbeEvent::TrialExhausted {
            trial: 2,
            attempts: 401,
            elapsed_ms: 2100.0,
        };
        assert_eq!(event.name(), "poll.trial_exhausted");
        assert_eq!(event.stage(), Stage::Poll);
        assert_eq!(event.trial(), Some(2));
        assert_eq!(
            event.to_string(),
            "trial 2: not visible after 401 attempts, 2100.000 ms"
        );
    }

    #[test]
    fn test_recording_log_keeps_order_and_severity() {
        let log = RecordingProbeLog::new();
        log.info(&ProbeEvent::AncestorCreated { key: "k".into() });
        log.error(&ProbeEvent::WriteFailed {
            trial: 0,
            error: "boom".into(),
        });

        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, Severity::Info);
        assert_eq!(events[1].0, Severity::Error);
        assert_eq!(log.named(event_names::WRITE_FAILED).len(), 1);
    }
}
