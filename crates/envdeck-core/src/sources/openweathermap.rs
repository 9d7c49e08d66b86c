//! Daily forecast source (OpenWeatherMap `forecast/daily`).

use chrono::{DateTime, Local, NaiveDate};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{Cadence, Source};
use crate::error::SourceError;
use crate::http::{join_url, HttpClient};
use crate::normalize;
use crate::state::{ForecastEntry, Location, StateHandle};

pub const DEFAULT_BASE_URL: &str = "http://api.openweathermap.org/data/2.5";

const NAME: &str = "openweathermap";

/// Request parameters besides the location.
#[derive(Debug, Clone)]
pub struct ForecastQuery {
    pub app_id: String,
    pub units: String,
    pub lang: String,
    pub days: u32,
}

impl ForecastQuery {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            units: "metric".into(),
            lang: "de".into(),
            days: 10,
        }
    }
}

pub struct OpenWeatherMapSource {
    base_url: String,
    query: ForecastQuery,
    /// Used until the station source has published a location.
    fallback: Location,
    http: Arc<dyn HttpClient>,
    state: StateHandle,
    cadence: Cadence,
}

impl OpenWeatherMapSource {
    pub fn new(
        base_url: impl Into<String>,
        query: ForecastQuery,
        fallback: Location,
        http: Arc<dyn HttpClient>,
        state: StateHandle,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            query,
            fallback,
            http,
            state,
            cadence: Cadence::new(5, 900),
        }
    }

    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    /// The station's location if known, else the fallback.
    pub fn location(&self) -> Location {
        self.state
            .read(|s| s.location().cloned())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Source for OpenWeatherMapSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn cadence(&self) -> Cadence {
        self.cadence
    }

    fn fetch(&mut self) -> Result<(), SourceError> {
        let location = self.location();
        debug!(
            source = NAME,
            latitude = location.latitude,
            longitude = location.longitude,
            timezone = %location.timezone,
            "using location"
        );

        let lat = location.latitude.to_string();
        let lon = location.longitude.to_string();
        let cnt = self.query.days.to_string();
        let url = join_url(&self.base_url, "forecast/daily");
        let body = self.http.get_json(
            &url,
            &[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("mode", "json"),
                ("appid", self.query.app_id.as_str()),
                ("units", self.query.units.as_str()),
                ("lang", self.query.lang.as_str()),
                ("cnt", cnt.as_str()),
            ],
        )?;

        let entries = parse_forecast(body)?;
        debug!(source = NAME, days = entries.len(), "forecast parsed");
        self.state.publish_forecast(entries);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct DailyForecast {
    list: Vec<DailyEntry>,
}

#[derive(Debug, Deserialize)]
struct DailyEntry {
    dt: i64,
    temp: DailyTemperature,
    #[serde(default)]
    pressure: Option<f64>,
    #[serde(default)]
    humidity: Option<f64>,
    weather: Vec<WireWeather>,
    #[serde(default)]
    clouds: f64,
    #[serde(default)]
    rain: f64,
    #[serde(default)]
    snow: f64,
}

#[derive(Debug, Deserialize)]
struct DailyTemperature {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct WireWeather {
    id: i64,
    #[serde(default)]
    description: String,
}

/// Parse a `forecast/daily` response, one entry per listed day.
pub fn parse_forecast(body: Value) -> Result<Vec<ForecastEntry>, SourceError> {
    let forecast: DailyForecast = serde_json::from_value(body)?;
    forecast.list.into_iter().map(entry).collect()
}

fn entry(day: DailyEntry) -> Result<ForecastEntry, SourceError> {
    let weather = day
        .weather
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::Parse(format!("no weather for dt {}", day.dt)))?;

    Ok(ForecastEntry {
        date: local_date(day.dt)?,
        condition: normalize::openweathermap(weather.id),
        code: weather.id,
        description: weather.description,
        temp_min: round_tenth(day.temp.min),
        temp_max: round_tenth(day.temp.max),
        rain: day.rain,
        snow: day.snow,
        precipitation: day.rain + day.snow,
        clouds: day.clouds,
        pressure: day.pressure,
        humidity: day.humidity,
    })
}

fn local_date(timestamp: i64) -> Result<NaiveDate, SourceError> {
    DateTime::from_timestamp(timestamp, 0)
        .map(|utc| utc.with_timezone(&Local).date_naive())
        .ok_or_else(|| SourceError::Parse(format!("timestamp {timestamp} out of range")))
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::WeatherCondition;
    use serde_json::json;

    // 2024-03-01 12:00 UTC; daily entries are stamped around midday.
    const MARCH_FIRST_NOON: i64 = 1_709_294_400;

    fn payload() -> Value {
        json!({
            "city": { "name": "Berlin" },
            "list": [
                {
                    "dt": MARCH_FIRST_NOON,
                    "temp": { "min": 3.24, "max": 11.06 },
                    "pressure": 1021.5,
                    "humidity": 71,
                    "weather": [{ "id": 501, "description": "mäßiger Regen" }],
                    "clouds": 90,
                    "rain": 4.25
                },
                {
                    "dt": MARCH_FIRST_NOON + 86_400,
                    "temp": { "min": 1.0, "max": 8.0 },
                    "weather": [{ "id": 800, "description": "Klarer Himmel" }]
                }
            ]
        })
    }

    #[test]
    fn parses_daily_entries() {
        let entries = parse_forecast(payload()).unwrap();
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        let expected = DateTime::from_timestamp(MARCH_FIRST_NOON, 0)
            .unwrap()
            .with_timezone(&Local)
            .date_naive();
        assert_eq!(first.date, expected);
        assert_eq!(entries[1].date, expected.succ_opt().unwrap());
        assert_eq!(first.condition, Some(WeatherCondition::Rain));
        assert_eq!(first.temp_min, 3.2);
        assert_eq!(first.temp_max, 11.1);
        assert_eq!(first.precipitation, 4.25);
        assert_eq!(first.humidity, Some(71.0));
    }

    #[test]
    fn missing_clouds_rain_snow_default_to_zero() {
        let entries = parse_forecast(payload()).unwrap();
        let second = &entries[1];
        assert_eq!(second.clouds, 0.0);
        assert_eq!(second.rain, 0.0);
        assert_eq!(second.snow, 0.0);
        assert_eq!(second.precipitation, 0.0);
        assert_eq!(second.pressure, None);
        assert_eq!(second.condition, Some(WeatherCondition::Clear));
    }

    #[test]
    fn entry_without_weather_fails_whole_payload() {
        let mut body = payload();
        body["list"][1]["weather"] = json!([]);
        assert!(matches!(parse_forecast(body), Err(SourceError::Parse(_))));
    }

    #[test]
    fn missing_list_is_parse_error() {
        assert!(matches!(
            parse_forecast(json!({ "cod": "401" })),
            Err(SourceError::Parse(_))
        ));
    }
}
