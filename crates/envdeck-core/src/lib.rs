//! # envdeck Core Library
//!
//! Data acquisition and normalization for a home weather-station dashboard.
//! Three external weather sources and one ambient-light sensor are polled on a
//! cooperative, tick-driven scheduler and folded into a single read model that
//! an external renderer consumes.
//!
//! ## Architecture
//!
//! - **Scheduler**: A tick-driven task table (one-shot and periodic tasks).
//!   No threads -- the caller invokes `tick()` at a fixed cadence.
//! - **Session**: OAuth password/refresh-token lifecycle for the credentialed
//!   station source, re-armed through the scheduler.
//! - **Sources**: Netatmo station, OpenWeatherMap forecast and wetter.com
//!   outlook adapters. Each publishes its own slice of the state atomically.
//! - **Normalize**: Provider weather codes mapped onto one condition taxonomy.
//! - **Brightness**: Ambient-light feedback loop driving a display backlight.
//!
//! ## Key Components
//!
//! - [`Scheduler`]: Cooperative task table
//! - [`Station`]: Runtime state the scheduled tasks operate on
//! - [`StateHandle`]: Shared, snapshot-readable [`AggregatedState`]
//! - [`Config`]: TOML configuration

pub mod brightness;
pub mod config;
pub mod error;
pub mod http;
pub mod normalize;
pub mod scheduler;
pub mod session;
pub mod sources;
pub mod state;
pub mod station;

pub use brightness::{BrightnessController, BrightnessSink, LightSensor, SysfsBacklight, Tsl2561};
pub use config::Config;
pub use error::{ConfigError, CoreError, SensorError, SourceError};
pub use http::{HttpClient, ReqwestClient};
pub use normalize::{Provider, WeatherCondition};
pub use scheduler::{Scheduler, TaskContext, TaskId, Ticks};
pub use session::{CredentialSession, SessionState, SessionStep};
pub use state::{
    AggregatedState, BrightnessState, DailyOutlook, ForecastEntry, StateHandle, StationReading,
};
pub use station::Station;
