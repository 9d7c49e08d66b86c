//! TOML-based configuration.
//!
//! Holds, per source, the credentials and endpoints plus the polling
//! intervals, the fallback location and the brightness loop settings.
//!
//! Configuration is stored at `~/.config/envdeck/config.toml`
//! (`~/.config/envdeck-dev/` with `ENVDECK_ENV=dev`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::scheduler::Ticks;
use crate::session::ClientCredentials;
use crate::state::Location;

/// Credentialed station source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetatmoConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_netatmo_url")]
    pub base_url: String,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: Ticks,
    #[serde(default = "default_retry_interval")]
    pub retry_interval: Ticks,
}

/// Anonymous forecast source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenWeatherMapConfig {
    #[serde(default)]
    pub app_id: String,
    #[serde(default = "default_owm_url")]
    pub base_url: String,
    #[serde(default = "default_units")]
    pub units: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Number of forecast days requested.
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: Ticks,
    /// Let the station source publish a location first.
    #[serde(default = "default_owm_delay")]
    pub initial_delay: Ticks,
}

/// Checksum-signed outlook source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WetterComConfig {
    #[serde(default)]
    pub city_code: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_wettercom_url")]
    pub base_url: String,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: Ticks,
}

/// Used for the forecast request until the station reports its position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

/// Ambient-light backlight regulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrightnessConfig {
    #[serde(default)]
    pub enabled: bool,
    /// `/dev/i2c-<bus>`
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,
    #[serde(default = "default_i2c_address")]
    pub address: u8,
    /// Backlight brightness file.
    #[serde(default = "default_backlight")]
    pub device: PathBuf,
    #[serde(default = "default_min_brightness")]
    pub min_brightness: u16,
    #[serde(default = "default_max_brightness")]
    pub max_brightness: u16,
    #[serde(default = "default_initial_brightness")]
    pub initial_brightness: u16,
    #[serde(default = "default_initial_lux")]
    pub initial_lux: f64,
    /// Weight of the newest sample; 1.0 disables smoothing.
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_brightness_interval")]
    pub interval: Ticks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/envdeck/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub netatmo: NetatmoConfig,
    #[serde(default)]
    pub openweathermap: OpenWeatherMapConfig,
    #[serde(default)]
    pub wettercom: WetterComConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub brightness: BrightnessConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

// Default functions
fn default_netatmo_url() -> String {
    "https://api.netatmo.net".into()
}
fn default_owm_url() -> String {
    "http://api.openweathermap.org/data/2.5".into()
}
fn default_wettercom_url() -> String {
    "http://api.wetter.com".into()
}
fn default_refresh_interval() -> Ticks {
    900
}
fn default_retry_interval() -> Ticks {
    crate::session::DEFAULT_RETRY_INTERVAL
}
fn default_owm_delay() -> Ticks {
    5
}
fn default_units() -> String {
    "metric".into()
}
fn default_lang() -> String {
    "de".into()
}
fn default_days() -> u32 {
    10
}
fn default_latitude() -> f64 {
    52.52
}
fn default_longitude() -> f64 {
    13.405
}
fn default_timezone() -> String {
    "Europe/Berlin".into()
}
fn default_i2c_bus() -> u8 {
    1
}
fn default_i2c_address() -> u8 {
    crate::brightness::TSL2561_ADDRESS
}
fn default_backlight() -> PathBuf {
    PathBuf::from("/sys/class/backlight/rpi_backlight/brightness")
}
fn default_min_brightness() -> u16 {
    15
}
fn default_max_brightness() -> u16 {
    255
}
fn default_initial_brightness() -> u16 {
    120
}
fn default_initial_lux() -> f64 {
    2.0
}
fn default_weight() -> f64 {
    0.05
}
fn default_brightness_interval() -> Ticks {
    1
}
fn default_timeout_secs() -> u64 {
    20
}

impl Default for NetatmoConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            username: String::new(),
            password: String::new(),
            base_url: default_netatmo_url(),
            refresh_interval: default_refresh_interval(),
            retry_interval: default_retry_interval(),
        }
    }
}

impl Default for OpenWeatherMapConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            base_url: default_owm_url(),
            units: default_units(),
            lang: default_lang(),
            days: default_days(),
            refresh_interval: default_refresh_interval(),
            initial_delay: default_owm_delay(),
        }
    }
}

impl Default for WetterComConfig {
    fn default() -> Self {
        Self {
            city_code: String::new(),
            project_name: String::new(),
            api_key: String::new(),
            base_url: default_wettercom_url(),
            refresh_interval: default_refresh_interval(),
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: default_latitude(),
            longitude: default_longitude(),
            timezone: default_timezone(),
        }
    }
}

impl Default for BrightnessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            i2c_bus: default_i2c_bus(),
            address: default_i2c_address(),
            device: default_backlight(),
            min_brightness: default_min_brightness(),
            max_brightness: default_max_brightness(),
            initial_brightness: default_initial_brightness(),
            initial_lux: default_initial_lux(),
            weight: default_weight(),
            interval: default_brightness_interval(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl NetatmoConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.username.is_empty()
    }

    pub fn credentials(&self) -> ClientCredentials {
        ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

impl OpenWeatherMapConfig {
    pub fn is_configured(&self) -> bool {
        !self.app_id.is_empty()
    }
}

impl WetterComConfig {
    pub fn is_configured(&self) -> bool {
        !self.city_code.is_empty() && !self.project_name.is_empty() && !self.api_key.is_empty()
    }
}

impl From<&LocationConfig> for Location {
    fn from(config: &LocationConfig) -> Self {
        Location {
            latitude: config.latitude,
            longitude: config.longitude,
            timezone: config.timezone.clone(),
        }
    }
}

/// Returns `~/.config/envdeck[-dev]/` based on ENVDECK_ENV.
pub fn data_dir() -> PathBuf {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("ENVDECK_ENV").unwrap_or_else(|_| "production".to_string());

    if env == "dev" {
        base_dir.join("envdeck-dev")
    } else {
        base_dir.join("envdeck")
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::MissingKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;

            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(_) => {
                    if let Ok(n) = value.parse::<u64>() {
                        serde_json::Value::Number(n.into())
                    } else if let Ok(n) = value.parse::<f64>() {
                        serde_json::Number::from_f64(n)
                            .map(serde_json::Value::Number)
                            .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                    } else {
                        return Err(invalid(format!("cannot parse '{value}' as number")));
                    }
                }
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                }
                _ => serde_json::Value::String(value.into()),
            };

            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    /// Default config file location.
    pub fn path() -> PathBuf {
        data_dir().join("config.toml")
    }

    /// Load from the default location, or defaults if the file is absent.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path())
    }

    /// Load from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Parse from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key, in memory only.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not parse
    /// as the key's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Problems that keep a source or the brightness loop from starting.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut problems = Vec::new();

        for (key, url) in [
            ("netatmo.base_url", &self.netatmo.base_url),
            ("openweathermap.base_url", &self.openweathermap.base_url),
            ("wettercom.base_url", &self.wettercom.base_url),
        ] {
            if let Err(e) = url::Url::parse(url) {
                problems.push(ConfigError::InvalidValue {
                    key: key.into(),
                    message: e.to_string(),
                });
            }
        }

        if !self.netatmo.is_configured() {
            problems.push(ConfigError::MissingKey("netatmo.client_id / netatmo.username".into()));
        }
        if !self.openweathermap.is_configured() {
            problems.push(ConfigError::MissingKey("openweathermap.app_id".into()));
        }
        if !self.wettercom.is_configured() {
            problems.push(ConfigError::MissingKey(
                "wettercom.city_code / wettercom.project_name / wettercom.api_key".into(),
            ));
        }

        let b = &self.brightness;
        if b.min_brightness > b.max_brightness {
            problems.push(ConfigError::InvalidValue {
                key: "brightness.min_brightness".into(),
                message: format!("{} exceeds max_brightness {}", b.min_brightness, b.max_brightness),
            });
        }
        if !(b.weight > 0.0 && b.weight <= 1.0) {
            problems.push(ConfigError::InvalidValue {
                key: "brightness.weight".into(),
                message: format!("{} is outside (0, 1]", b.weight),
            });
        }

        problems
    }
}
