//! Aggregated read model.
//!
//! Every source owns exactly one slice of [`AggregatedState`] and publishes
//! it with a single replace under the write lock, so a reader never sees a
//! half-updated source. Readers take an owned [`AggregatedState`] snapshot.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

use crate::normalize::WeatherCondition;

/// Geographic position of the station. Also drives the forecast request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub current: f64,
    pub min: f64,
    pub max: f64,
    pub trend: Option<Trend>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndoorReading {
    pub temperature: TemperatureReading,
    pub humidity: f64,
    /// ppm
    pub co2: f64,
    /// mbar
    pub pressure: f64,
    pub pressure_trend: Option<Trend>,
    /// dB
    pub noise: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutdoorReading {
    pub temperature: TemperatureReading,
    pub humidity: f64,
    pub battery_percent: u8,
    pub rf_status: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RainReading {
    /// mm over the last hour
    pub last_hour: f64,
    /// mm over the last 24 hours
    pub last_day: f64,
    pub battery_percent: u8,
    pub rf_status: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub kind: i64,
    pub level: i64,
    pub description: String,
}

/// Everything the credentialed station source reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationReading {
    pub name: String,
    pub city: Option<String>,
    /// Locale for display formatting, e.g. `de_DE`.
    pub locale: String,
    pub location: Location,
    pub wifi_status: Option<u32>,
    pub co2_calibrating: bool,
    pub indoor: IndoorReading,
    pub outdoor: OutdoorReading,
    pub rain: RainReading,
    pub alarms: Vec<Alarm>,
}

/// One future day from the forecast source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub date: NaiveDate,
    pub condition: Option<WeatherCondition>,
    /// Raw provider condition id.
    pub code: i64,
    pub description: String,
    pub temp_min: f64,
    pub temp_max: f64,
    pub rain: f64,
    pub snow: f64,
    /// rain + snow, mm
    pub precipitation: f64,
    /// percent
    pub clouds: f64,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
}

/// Intraday slot of the checksum-signed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bucket {
    #[serde(rename = "06:00")]
    Morning,
    #[serde(rename = "11:00")]
    Midday,
    #[serde(rename = "17:00")]
    Evening,
    #[serde(rename = "23:00")]
    Night,
}

impl Bucket {
    /// Key of the bucket in the provider payload.
    pub fn key(&self) -> &'static str {
        match self {
            Bucket::Morning => "06:00",
            Bucket::Midday => "11:00",
            Bucket::Evening => "17:00",
            Bucket::Night => "23:00",
        }
    }

    /// Bucket covering the given local hour.
    ///
    /// Hours 23..=5 all map to the 23:00 slot of the current day's record.
    pub fn for_hour(hour: u32) -> Self {
        match hour {
            6..=10 => Bucket::Morning,
            11..=16 => Bucket::Midday,
            17..=22 => Bucket::Evening,
            _ => Bucket::Night,
        }
    }
}

/// Today's outlook from the checksum-signed source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyOutlook {
    pub date: NaiveDate,
    pub temp_min: f64,
    pub temp_max: f64,
    pub bucket: Bucket,
    pub code: i64,
    pub condition: Option<WeatherCondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrightnessState {
    /// Raw channel 0 (visible + infrared).
    pub ambient: u16,
    /// Raw channel 1 (infrared).
    pub infrared: u16,
    /// Smoothed illuminance.
    pub lux: f64,
    pub brightness: u16,
    pub min_brightness: u16,
    pub max_brightness: u16,
    /// Weight of the newest sample in the smoothing.
    pub weight: f64,
}

/// The single externally-readable snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedState {
    pub station: Option<StationReading>,
    pub forecast: Vec<ForecastEntry>,
    pub outlook: Option<DailyOutlook>,
    pub brightness: Option<BrightnessState>,
}

impl AggregatedState {
    /// Forecast entry for the given day, if the forecast covers it.
    pub fn forecast_for(&self, date: NaiveDate) -> Option<&ForecastEntry> {
        self.forecast.iter().find(|e| e.date == date)
    }

    /// Latest known station location.
    pub fn location(&self) -> Option<&Location> {
        self.station.as_ref().map(|s| &s.location)
    }
}

/// Cloneable handle onto the shared [`AggregatedState`].
///
/// Each `publish_*` method replaces one slice in a single write.
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<RwLock<AggregatedState>>,
}

impl StateHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> AggregatedState {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Read a projection of the state without copying all of it.
    pub fn read<T>(&self, f: impl FnOnce(&AggregatedState) -> T) -> T {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn publish_station(&self, reading: StationReading) {
        self.write(|s| s.station = Some(reading));
    }

    pub fn publish_forecast(&self, entries: Vec<ForecastEntry>) {
        self.write(|s| s.forecast = entries);
    }

    pub fn publish_outlook(&self, outlook: DailyOutlook) {
        self.write(|s| s.outlook = Some(outlook));
    }

    pub fn publish_brightness(&self, brightness: BrightnessState) {
        self.write(|s| s.brightness = Some(brightness));
    }

    fn write(&self, f: impl FnOnce(&mut AggregatedState)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(date: NaiveDate) -> ForecastEntry {
        ForecastEntry {
            date,
            condition: Some(WeatherCondition::Clear),
            code: 800,
            description: "Klarer Himmel".into(),
            temp_min: 3.2,
            temp_max: 11.0,
            rain: 0.0,
            snow: 0.0,
            precipitation: 0.0,
            clouds: 0.0,
            pressure: None,
            humidity: None,
        }
    }

    #[test]
    fn bucket_selection_follows_hour_table() {
        assert_eq!(Bucket::for_hour(6), Bucket::Morning);
        assert_eq!(Bucket::for_hour(10), Bucket::Morning);
        assert_eq!(Bucket::for_hour(11), Bucket::Midday);
        assert_eq!(Bucket::for_hour(14), Bucket::Midday);
        assert_eq!(Bucket::for_hour(17), Bucket::Evening);
        assert_eq!(Bucket::for_hour(22), Bucket::Evening);
        assert_eq!(Bucket::for_hour(23), Bucket::Night);
        assert_eq!(Bucket::for_hour(2), Bucket::Night);
        assert_eq!(Bucket::for_hour(5), Bucket::Night);
        assert_eq!(Bucket::for_hour(14).key(), "11:00");
        assert_eq!(Bucket::for_hour(2).key(), "23:00");
    }

    #[test]
    fn forecast_publish_replaces_whole_sequence() {
        let handle = StateHandle::new();
        let d1 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        handle.publish_forecast(vec![entry(d1), entry(d2)]);
        handle.publish_forecast(vec![entry(d2)]);

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.forecast.len(), 1);
        assert!(snapshot.forecast_for(d1).is_none());
        assert_eq!(snapshot.forecast_for(d2).map(|e| e.code), Some(800));
    }

    #[test]
    fn snapshot_is_detached_from_later_writes() {
        let handle = StateHandle::new();
        let before = handle.snapshot();
        handle.publish_forecast(vec![entry(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())]);
        assert!(before.forecast.is_empty());
        assert_eq!(handle.read(|s| s.forecast.len()), 1);
    }
}
