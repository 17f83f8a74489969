use std::{
    fmt,
    sync::Mutex,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context, Result};

/// Timing of one protocol step. `parent_event` is empty for top-level steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsEvent {
    pub event: String,
    pub parent_event: String,
    pub duration: Duration,
}

pub trait MetricsLogger: Send + Sync {
    fn log(&self, event: &MetricsEvent) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct NoopMetricsLogger;

impl MetricsLogger for NoopMetricsLogger {
    fn log(&self, _event: &MetricsEvent) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemMetricsLogger(Mutex<Vec<MetricsEvent>>);

impl MemMetricsLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MetricsEvent> {
        self.0
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl MetricsLogger for MemMetricsLogger {
    fn log(&self, event: &MetricsEvent) -> Result<()> {
        self.0
            .lock()
            .map_err(|_| anyhow!("metrics log lock poisoned"))?
            .push(event.clone());
        Ok(())
    }
}

/// Measures a step from creation until [Timer::finish].
pub(crate) struct Timer {
    event: String,
    parent_event: String,
    start: Instant,
}

impl Timer {
    pub(crate) fn start(event: impl Into<String>, parent_event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            parent_event: parent_event.into(),
            start: Instant::now(),
        }
    }

    /// Record the event. A logger failure is tagged with [MetricsLogFailure]
    /// so it keeps its own kind when it surfaces through a network step.
    pub(crate) fn finish(self, logger: &dyn MetricsLogger) -> Result<()> {
        let failure = MetricsLogFailure(self.event.clone());
        logger
            .log(&MetricsEvent {
                event: self.event,
                parent_event: self.parent_event,
                duration: self.start.elapsed(),
            })
            .context(failure)
    }
}

/// Context attached to errors returned by a [MetricsLogger].
#[derive(Debug)]
pub(crate) struct MetricsLogFailure(String);

impl fmt::Display for MetricsLogFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to log metrics event '{}'", self.0)
    }
}
