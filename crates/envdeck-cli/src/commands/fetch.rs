use clap::ValueEnum;
use envdeck_core::sources::Source;
use envdeck_core::{Config, SessionStep, SourceError, Station};
use std::path::Path;

#[derive(Clone, Copy, ValueEnum)]
pub enum FetchTarget {
    /// Credentialed station readings
    Station,
    /// Daily forecast
    Forecast,
    /// Today's outlook
    Outlook,
}

pub fn run(config_path: &Path, target: FetchTarget) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_from(config_path)?;
    let mut station = Station::from_config(&config)?;

    let json = match target {
        FetchTarget::Station => {
            let source = station
                .netatmo
                .as_mut()
                .ok_or_else(|| not_configured("netatmo"))?;
            if let SessionStep::RetryAfter(_) = source.authenticate(0) {
                return Err(SourceError::Auth("password grant failed".into()).into());
            }
            source.fetch()?;
            serde_json::to_string_pretty(&station.state.snapshot().station)?
        }
        FetchTarget::Forecast => {
            station
                .openweathermap
                .as_mut()
                .ok_or_else(|| not_configured("openweathermap"))?
                .fetch()?;
            serde_json::to_string_pretty(&station.state.snapshot().forecast)?
        }
        FetchTarget::Outlook => {
            station
                .wettercom
                .as_mut()
                .ok_or_else(|| not_configured("wettercom"))?
                .fetch()?;
            serde_json::to_string_pretty(&station.state.snapshot().outlook)?
        }
    };

    println!("{json}");
    Ok(())
}

fn not_configured(source: &str) -> String {
    format!("{source} is not configured (see `envdeck config check`)")
}
