//! Weather source adapters.
//!
//! Each adapter polls one external service, parses the payload into the
//! shared types and publishes its own slice of the aggregated state. A
//! failed poll is logged and leaves the previously published slice alone;
//! the periodic task that drives it keeps running.

pub mod netatmo;
pub mod openweathermap;
pub mod wettercom;

pub use netatmo::NetatmoSource;
pub use openweathermap::OpenWeatherMapSource;
pub use wettercom::WetterComSource;

use tracing::{debug, warn};

use crate::error::SourceError;
use crate::scheduler::Ticks;

/// When a source first runs and how often it repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub delay: Ticks,
    pub interval: Ticks,
}

impl Cadence {
    pub fn new(delay: Ticks, interval: Ticks) -> Self {
        Self {
            delay,
            interval: interval.max(1),
        }
    }
}

/// Every weather source implements this trait.
pub trait Source {
    /// Short identifier used in logs (e.g. "netatmo").
    fn name(&self) -> &'static str;

    fn cadence(&self) -> Cadence;

    /// Fetch, parse and publish. On error nothing is published.
    fn fetch(&mut self) -> Result<(), SourceError>;

    /// Scheduled entry point: [`Source::fetch`] with every failure logged.
    ///
    /// The error is handed back so the task can react to auth failures.
    fn refresh(&mut self) -> Result<(), SourceError> {
        debug!(source = self.name(), "starting data refresh");
        let result = self.fetch();
        match &result {
            Ok(()) => debug!(source = self.name(), "data refresh successful"),
            Err(e @ SourceError::NotAuthenticated { .. }) => {
                debug!(source = self.name(), error = %e, "skipping refresh")
            }
            Err(e) => warn!(source = self.name(), error = %e, "data refresh failed"),
        }
        result
    }
}

/// Read a JSON number that some providers send as a string.
///
/// Non-finite values ("NaN", "inf") are rejected.
pub(crate) fn lenient_f64(value: &serde_json::Value) -> Option<f64> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Read an integer code that some providers send as a string.
pub(crate) fn lenient_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
