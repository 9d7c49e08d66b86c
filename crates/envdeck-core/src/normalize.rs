//! Weather condition normalization.
//!
//! Each provider reports conditions as a proprietary integer code. These
//! functions classify a code into the shared [`WeatherCondition`] taxonomy.
//! Ranges are inclusive and the first match wins; unmapped codes yield
//! `None`, which the renderer shows as an unknown placeholder.
//!
//! Display text and icons are derived elsewhere -- this is classification only.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    Cloudy,
    Drizzle,
    Rain,
    HeavyRain,
    Hail,
    Snow,
    HeavySnow,
    Fog,
    Wind,
    Thunderstorm,
    Tornado,
}

impl WeatherCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherCondition::Clear => "clear",
            WeatherCondition::Cloudy => "cloudy",
            WeatherCondition::Drizzle => "drizzle",
            WeatherCondition::Rain => "rain",
            WeatherCondition::HeavyRain => "heavy_rain",
            WeatherCondition::Hail => "hail",
            WeatherCondition::Snow => "snow",
            WeatherCondition::HeavySnow => "heavy_snow",
            WeatherCondition::Fog => "fog",
            WeatherCondition::Wind => "wind",
            WeatherCondition::Thunderstorm => "thunderstorm",
            WeatherCondition::Tornado => "tornado",
        }
    }
}

impl fmt::Display for WeatherCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Code vocabularies known to the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenWeatherMap condition ids (forecast source).
    OpenWeatherMap,
    /// wetter.com `w` codes (checksum-signed source).
    WetterCom,
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "owm" | "openweathermap" => Ok(Provider::OpenWeatherMap),
            "wettercom" | "wetter.com" | "wetter" => Ok(Provider::WetterCom),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Classify `code` using the given provider's table.
pub fn classify(provider: Provider, code: i64) -> Option<WeatherCondition> {
    match provider {
        Provider::OpenWeatherMap => openweathermap(code),
        Provider::WetterCom => wettercom(code),
    }
}

/// OpenWeatherMap condition id to condition.
pub fn openweathermap(code: i64) -> Option<WeatherCondition> {
    use WeatherCondition::*;
    let condition = match code {
        200..=299 => Thunderstorm,
        300..=399 => Drizzle,
        // No 4xx group exists.
        500 => Drizzle,
        501 => Rain,
        502..=599 => HeavyRain,
        600..=601 => Snow,
        602..=699 => HeavySnow,
        700..=780 => Fog,
        781 => Tornado,
        800 => Clear,
        801..=804 => Cloudy,
        900..=902 => Tornado,
        905 | 957..=962 => Wind,
        906 => Hail,
        _ => return None,
    };
    Some(condition)
}

/// wetter.com `w` code to condition.
pub fn wettercom(code: i64) -> Option<WeatherCondition> {
    use WeatherCondition::*;
    let condition = match code {
        0 => Clear,
        1 | 2 | 3 | 10..=39 => Cloudy,
        4 | 40..=49 => Fog,
        5 | 50 | 51 | 53 | 56 => Drizzle,
        6 | 8 | 60 | 61 | 63 => Rain,
        55 | 65 | 80 | 81 | 82 => HeavyRain,
        57 | 66 | 67 | 69 | 83 | 84 => Hail,
        7 | 68 | 70 | 71 | 73 | 85 => Snow,
        75 | 86 => HeavySnow,
        9 | 90..=99 => Thunderstorm,
        _ => return None,
    };
    Some(condition)
}
