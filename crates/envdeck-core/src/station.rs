//! Runtime state the scheduled tasks operate on.
//!
//! A [`Station`] owns every configured source, the brightness loop and the
//! shared [`StateHandle`]. [`Station::install`] registers the startup task
//! table on a [`Scheduler<Station>`]:
//!
//! ```text
//! auth        delay 0   once (re-arms itself)
//! station     delay 0   every 900
//! forecast    delay 5   every 900
//! outlook     delay 0   every 900
//! brightness  delay 1   every 1
//! ```

use std::sync::Arc;
use tracing::{info, warn};

use crate::brightness::{BrightnessController, BrightnessSink, LightSensor, SysfsBacklight};
use crate::config::{BrightnessConfig, Config};
use crate::error::{CoreError, SensorError};
use crate::http::{HttpClient, ReqwestClient};
use crate::scheduler::{Scheduler, TaskContext, TaskId, Ticks};
use crate::session::{self, CredentialSession, SessionHost};
use crate::sources::openweathermap::ForecastQuery;
use crate::sources::wettercom::WetterComAccount;
use crate::sources::{
    Cadence, NetatmoSource, OpenWeatherMapSource, Source, WetterComSource,
};
use crate::state::{Location, StateHandle};

pub struct Station {
    pub state: StateHandle,
    pub netatmo: Option<NetatmoSource>,
    pub openweathermap: Option<OpenWeatherMapSource>,
    pub wettercom: Option<WetterComSource>,
    pub brightness: Option<BrightnessController>,
    brightness_interval: Ticks,
}

impl Station {
    /// A station with no sources; attach them with the `with_*` builders.
    pub fn new(state: StateHandle) -> Self {
        Self {
            state,
            netatmo: None,
            openweathermap: None,
            wettercom: None,
            brightness: None,
            brightness_interval: 1,
        }
    }

    /// Build every source the configuration has credentials for.
    ///
    /// Unconfigured sources are skipped with a log line. The brightness loop
    /// is only built when enabled and its sensor bus opens.
    pub fn from_config(config: &Config) -> Result<Self, CoreError> {
        let timeout = std::time::Duration::from_secs(config.http.timeout_secs.max(1));
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new(timeout)?);
        let mut station = Self::with_http(config, http);

        if config.brightness.enabled {
            match open_sensor(&config.brightness) {
                Ok(sensor) => {
                    let sink = SysfsBacklight::new(&config.brightness.device);
                    station = station.with_brightness(sensor, Box::new(sink), &config.brightness);
                }
                Err(e) => warn!(error = %e, "brightness control disabled"),
            }
        }
        Ok(station)
    }

    /// Build the weather sources over an existing transport.
    pub fn with_http(config: &Config, http: Arc<dyn HttpClient>) -> Self {
        let state = StateHandle::new();
        let mut station = Self::new(state.clone());

        let c = &config.netatmo;
        if c.is_configured() {
            station.netatmo = Some(
                NetatmoSource::new(&c.base_url, c.credentials(), http.clone(), state.clone())
                    .with_retry_interval(c.retry_interval)
                    .with_cadence(Cadence::new(0, c.refresh_interval)),
            );
        } else {
            info!(source = "netatmo", "no credentials configured, source disabled");
        }

        let c = &config.openweathermap;
        if c.is_configured() {
            let query = ForecastQuery {
                app_id: c.app_id.clone(),
                units: c.units.clone(),
                lang: c.lang.clone(),
                days: c.days,
            };
            station.openweathermap = Some(
                OpenWeatherMapSource::new(
                    &c.base_url,
                    query,
                    Location::from(&config.location),
                    http.clone(),
                    state.clone(),
                )
                .with_cadence(Cadence::new(c.initial_delay, c.refresh_interval)),
            );
        } else {
            info!(source = "openweathermap", "no app id configured, source disabled");
        }

        let c = &config.wettercom;
        if c.is_configured() {
            let account = WetterComAccount {
                city_code: c.city_code.clone(),
                project_name: c.project_name.clone(),
                api_key: c.api_key.clone(),
            };
            station.wettercom = Some(
                WetterComSource::new(&c.base_url, account, http, state)
                    .with_cadence(Cadence::new(0, c.refresh_interval)),
            );
        } else {
            info!(source = "wettercom", "no account configured, source disabled");
        }

        station
    }

    pub fn with_brightness(
        mut self,
        sensor: Box<dyn LightSensor + Send>,
        sink: Box<dyn BrightnessSink + Send>,
        config: &BrightnessConfig,
    ) -> Self {
        self.brightness = Some(BrightnessController::new(
            sensor,
            sink,
            self.state.clone(),
            config,
        ));
        self.brightness_interval = config.interval.max(1);
        self
    }

    /// Register the startup task table. Returns the ids in registration order.
    pub fn install(&self, scheduler: &mut Scheduler<Station>) -> Vec<TaskId> {
        let mut ids = Vec::new();

        if let Some(source) = &self.netatmo {
            ids.push(session::start(scheduler));
            let cadence = source.cadence();
            ids.push(scheduler.schedule_interval(
                cadence.delay,
                cadence.interval,
                |ctx: &mut TaskContext<'_, Station>| {
                    let Some(source) = ctx.state.netatmo.as_mut() else {
                        return;
                    };
                    if source.refresh().is_err_and(|e| e.is_auth()) {
                        session::reauthenticate(ctx);
                    }
                },
            ));
        }
        if let Some(source) = &self.openweathermap {
            ids.push(schedule_source(scheduler, source.cadence(), |s| {
                s.openweathermap.as_mut().map(|x| x as &mut dyn Source)
            }));
        }
        if let Some(source) = &self.wettercom {
            ids.push(schedule_source(scheduler, source.cadence(), |s| {
                s.wettercom.as_mut().map(|x| x as &mut dyn Source)
            }));
        }
        if self.brightness.is_some() {
            ids.push(scheduler.schedule_interval(
                1,
                self.brightness_interval,
                |ctx: &mut TaskContext<'_, Station>| {
                    if let Some(controller) = ctx.state.brightness.as_mut() {
                        controller.refresh();
                    }
                },
            ));
        }

        info!(tasks = ids.len(), "station tasks installed");
        ids
    }
}

impl SessionHost for Station {
    fn session_parts(&mut self) -> Option<(&mut CredentialSession, &dyn HttpClient)> {
        self.netatmo.as_mut().map(NetatmoSource::session_parts)
    }
}

fn schedule_source(
    scheduler: &mut Scheduler<Station>,
    cadence: Cadence,
    select: fn(&mut Station) -> Option<&mut dyn Source>,
) -> TaskId {
    scheduler.schedule_interval(
        cadence.delay,
        cadence.interval,
        move |ctx: &mut TaskContext<'_, Station>| {
            if let Some(source) = select(ctx.state) {
                let _ = source.refresh();
            }
        },
    )
}

#[cfg(target_os = "linux")]
fn open_sensor(config: &BrightnessConfig) -> Result<Box<dyn LightSensor + Send>, SensorError> {
    let sensor = crate::brightness::open_tsl2561(config.i2c_bus, config.address)?;
    Ok(Box::new(sensor))
}

#[cfg(not(target_os = "linux"))]
fn open_sensor(_config: &BrightnessConfig) -> Result<Box<dyn LightSensor + Send>, SensorError> {
    Err(SensorError::Bus("i2c-dev is only available on Linux".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use serde_json::Value;

    struct Offline;

    impl HttpClient for Offline {
        fn get_json(&self, url: &str, _query: &[(&str, &str)]) -> Result<Value, SourceError> {
            Err(SourceError::Network(format!("{url}: offline")))
        }

        fn post_form(&self, url: &str, _form: &[(&str, &str)]) -> Result<Value, SourceError> {
            Err(SourceError::Network(format!("{url}: offline")))
        }
    }

    fn configured() -> Config {
        let mut config = Config::default();
        config.netatmo.client_id = "cid".into();
        config.netatmo.username = "me".into();
        config.openweathermap.app_id = "app".into();
        config.wettercom.city_code = "DE0001020".into();
        config.wettercom.project_name = "deck".into();
        config.wettercom.api_key = "key".into();
        config
    }

    #[test]
    fn unconfigured_sources_are_not_built() {
        let station = Station::with_http(&Config::default(), Arc::new(Offline));
        assert!(station.netatmo.is_none());
        assert!(station.openweathermap.is_none());
        assert!(station.wettercom.is_none());

        let mut scheduler = Scheduler::new();
        assert!(station.install(&mut scheduler).is_empty());
    }

    #[test]
    fn install_registers_startup_table() {
        let station = Station::with_http(&configured(), Arc::new(Offline));
        let mut scheduler = Scheduler::new();
        let ids = station.install(&mut scheduler);

        assert_eq!(ids.len(), 4);
        let due: Vec<_> = ids.iter().map(|id| scheduler.due_time(*id)).collect();
        assert_eq!(due, vec![Some(0), Some(0), Some(5), Some(0)]);
        assert_eq!(scheduler.interval(ids[0]), None);
        assert_eq!(scheduler.interval(ids[1]), Some(900));
        assert_eq!(scheduler.interval(ids[2]), Some(900));
    }

    #[test]
    fn offline_sources_keep_their_tasks() {
        let mut station = Station::with_http(&configured(), Arc::new(Offline));
        let mut scheduler = Scheduler::new();
        let ids = station.install(&mut scheduler);

        scheduler.tick(0, &mut station);
        scheduler.tick(5, &mut station);
        assert_eq!(station.state.snapshot(), Default::default());
        for id in &ids[1..] {
            assert!(scheduler.is_scheduled(*id));
        }
        // The failed password grant re-armed itself.
        assert_eq!(scheduler.len(), 4);
    }
}
