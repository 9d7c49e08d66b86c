//! Credentialed station source (Netatmo weather station).
//!
//! Reads the base station plus its rain and outdoor modules through
//! `api/getstationsdata`. The access token comes from the
//! [`CredentialSession`] this source owns; without one a poll is a no-op.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{Cadence, Source};
use crate::error::SourceError;
use crate::http::{join_url, HttpClient};
use crate::scheduler::Ticks;
use crate::session::{ClientCredentials, CredentialSession, SessionStep};
use crate::state::{
    Alarm, IndoorReading, Location, OutdoorReading, RainReading, StateHandle, StationReading,
    TemperatureReading, Trend,
};

pub const DEFAULT_BASE_URL: &str = "https://api.netatmo.net";

/// Module roles are fixed by position in the station's module list.
pub const RAIN_MODULE_INDEX: usize = 0;
pub const OUTDOOR_MODULE_INDEX: usize = 1;

/// Length of the provider prefix on alarm descriptions.
const ALARM_PREFIX_LEN: usize = 13;

const NAME: &str = "netatmo";

pub struct NetatmoSource {
    base_url: String,
    session: CredentialSession,
    http: Arc<dyn HttpClient>,
    state: StateHandle,
    cadence: Cadence,
}

impl NetatmoSource {
    pub fn new(
        base_url: impl Into<String>,
        credentials: ClientCredentials,
        http: Arc<dyn HttpClient>,
        state: StateHandle,
    ) -> Self {
        let base_url = base_url.into();
        let session = CredentialSession::new(NAME, join_url(&base_url, "oauth2/token"), credentials);
        Self {
            base_url,
            session,
            http,
            state,
            cadence: Cadence::new(0, 900),
        }
    }

    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Ticks) -> Self {
        self.session = self.session.with_retry_interval(retry_interval);
        self
    }

    pub fn session(&self) -> &CredentialSession {
        &self.session
    }

    /// The session and the transport it grants through.
    pub fn session_parts(&mut self) -> (&mut CredentialSession, &dyn HttpClient) {
        (&mut self.session, self.http.as_ref())
    }

    /// Run the password grant directly, outside the scheduler.
    pub fn authenticate(&mut self, now: Ticks) -> SessionStep {
        self.session.authenticate(self.http.as_ref(), now)
    }
}

impl Source for NetatmoSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn cadence(&self) -> Cadence {
        self.cadence
    }

    fn fetch(&mut self) -> Result<(), SourceError> {
        let token = self
            .session
            .access_token()
            .ok_or_else(|| SourceError::NotAuthenticated {
                service: NAME.to_string(),
            })?;

        let url = join_url(&self.base_url, "api/getstationsdata");
        let body = self
            .http
            .post_form(&url, &[("access_token", token)])
            .map_err(|e| match e {
                SourceError::Http {
                    status: 401 | 403,
                    url,
                } => SourceError::Auth(format!("{url} rejected the access token")),
                other => other,
            })?;

        let reading = parse_station(body)?;
        debug!(
            source = NAME,
            city = reading.city.as_deref().unwrap_or("?"),
            latitude = reading.location.latitude,
            longitude = reading.location.longitude,
            timezone = %reading.location.timezone,
            "station location"
        );
        self.state.publish_station(reading);
        Ok(())
    }
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StationsResponse {
    body: StationsBody,
}

#[derive(Debug, Deserialize)]
struct StationsBody {
    user: User,
    devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
struct User {
    administrative: Administrative,
}

#[derive(Debug, Deserialize)]
struct Administrative {
    reg_locale: String,
}

#[derive(Debug, Deserialize)]
struct Device {
    station_name: String,
    #[serde(default)]
    wifi_status: Option<u32>,
    #[serde(default)]
    co2_calibrating: bool,
    place: Place,
    dashboard_data: IndoorData,
    #[serde(default)]
    modules: Vec<Module>,
    #[serde(default)]
    meteo_alarms: Vec<WireAlarm>,
}

#[derive(Debug, Deserialize)]
struct Place {
    #[serde(default)]
    city: Option<String>,
    /// `[longitude, latitude]`
    location: (f64, f64),
    timezone: String,
}

#[derive(Debug, Deserialize)]
struct IndoorData {
    #[serde(rename = "Temperature")]
    temperature: f64,
    min_temp: f64,
    max_temp: f64,
    #[serde(default)]
    temp_trend: Option<Trend>,
    #[serde(rename = "CO2")]
    co2: f64,
    #[serde(rename = "Humidity")]
    humidity: f64,
    #[serde(rename = "Pressure")]
    pressure: f64,
    #[serde(default)]
    pressure_trend: Option<Trend>,
    #[serde(rename = "Noise")]
    noise: f64,
}

#[derive(Debug, Deserialize)]
struct Module {
    battery_percent: u8,
    rf_status: u32,
    dashboard_data: Value,
}

#[derive(Debug, Deserialize)]
struct OutdoorData {
    #[serde(rename = "Temperature")]
    temperature: f64,
    min_temp: f64,
    max_temp: f64,
    #[serde(default)]
    temp_trend: Option<Trend>,
    #[serde(rename = "Humidity")]
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct RainData {
    sum_rain_1: f64,
    #[serde(default)]
    sum_rain_24: f64,
}

#[derive(Debug, Deserialize)]
struct WireAlarm {
    #[serde(rename = "type")]
    kind: i64,
    level: i64,
    descr: String,
}

/// Parse a `getstationsdata` response into a [`StationReading`].
///
/// Only the first device is read.
pub fn parse_station(body: Value) -> Result<StationReading, SourceError> {
    if let Some(error) = body.get("error") {
        return Err(api_error(error));
    }

    let response: StationsResponse = serde_json::from_value(body)?;
    let locale = response.body.user.administrative.reg_locale.replace('-', "_");
    let device = response
        .body
        .devices
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::Parse("no station device in response".into()))?;

    let outdoor_module = module(&device.modules, OUTDOOR_MODULE_INDEX, "outdoor")?;
    let outdoor: OutdoorData = serde_json::from_value(outdoor_module.dashboard_data.clone())
        .map_err(|e| SourceError::Parse(format!("outdoor module: {e}")))?;
    let rain_module = module(&device.modules, RAIN_MODULE_INDEX, "rain")?;
    let rain: RainData = serde_json::from_value(rain_module.dashboard_data.clone())
        .map_err(|e| SourceError::Parse(format!("rain module: {e}")))?;

    let indoor = device.dashboard_data;
    let (longitude, latitude) = device.place.location;

    Ok(StationReading {
        name: device.station_name,
        city: device.place.city,
        locale,
        location: Location {
            latitude,
            longitude,
            timezone: device.place.timezone,
        },
        wifi_status: device.wifi_status,
        co2_calibrating: device.co2_calibrating,
        indoor: IndoorReading {
            temperature: TemperatureReading {
                current: indoor.temperature,
                min: indoor.min_temp,
                max: indoor.max_temp,
                trend: indoor.temp_trend,
            },
            humidity: indoor.humidity,
            co2: indoor.co2,
            pressure: indoor.pressure,
            pressure_trend: indoor.pressure_trend,
            noise: indoor.noise,
        },
        outdoor: OutdoorReading {
            temperature: TemperatureReading {
                current: outdoor.temperature,
                min: outdoor.min_temp,
                max: outdoor.max_temp,
                trend: outdoor.temp_trend,
            },
            humidity: outdoor.humidity,
            battery_percent: outdoor_module.battery_percent,
            rf_status: outdoor_module.rf_status,
        },
        rain: RainReading {
            last_hour: rain.sum_rain_1,
            last_day: rain.sum_rain_24,
            battery_percent: rain_module.battery_percent,
            rf_status: rain_module.rf_status,
        },
        alarms: device
            .meteo_alarms
            .into_iter()
            .map(|a| Alarm {
                kind: a.kind,
                level: a.level,
                description: a.descr.chars().skip(ALARM_PREFIX_LEN).collect(),
            })
            .collect(),
    })
}

fn module<'a>(modules: &'a [Module], index: usize, role: &str) -> Result<&'a Module, SourceError> {
    modules
        .get(index)
        .ok_or_else(|| SourceError::Parse(format!("{role} module missing at index {index}")))
}

/// `{"error": {"code": .., "message": ..}}` envelope. Codes 2 and 3 are
/// invalid and expired access tokens.
fn api_error(error: &Value) -> SourceError {
    let code = error.get("code").and_then(Value::as_i64);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    match code {
        Some(2 | 3) => SourceError::Auth(message),
        _ => SourceError::Parse(format!("provider error {}: {message}", code.unwrap_or(-1))),
    }
}
