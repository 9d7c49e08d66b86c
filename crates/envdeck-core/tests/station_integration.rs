//! End-to-end tests: a configured station driven by the scheduler over a
//! fake transport.

use envdeck_core::config::Config;
use envdeck_core::{HttpClient, Scheduler, SessionState, SourceError, Station};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Routes requests by URL path suffix and records what was asked for.
#[derive(Default)]
struct FakeHttp {
    routes: Mutex<HashMap<&'static str, Result<Value, SourceError>>>,
    requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl FakeHttp {
    fn route(&self, suffix: &'static str, response: Result<Value, SourceError>) {
        self.routes.lock().unwrap().insert(suffix, response);
    }

    fn fail_everything(&self) {
        let mut routes = self.routes.lock().unwrap();
        for response in routes.values_mut() {
            *response = Err(SourceError::Network("connection reset".into()));
        }
    }

    fn requests_to(&self, suffix: &str) -> Vec<Vec<(String, String)>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url.ends_with(suffix))
            .map(|(_, params)| params.clone())
            .collect()
    }

    fn respond(&self, url: &str, params: &[(&str, &str)]) -> Result<Value, SourceError> {
        self.requests.lock().unwrap().push((
            url.to_string(),
            params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));
        let routes = self.routes.lock().unwrap();
        routes
            .iter()
            .find(|(suffix, _)| url.ends_with(*suffix) || url.contains(&format!("{}/", suffix)))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| {
                Err(SourceError::Http {
                    status: 404,
                    url: url.to_string(),
                })
            })
    }
}

impl HttpClient for FakeHttp {
    fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, SourceError> {
        self.respond(url, query)
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, SourceError> {
        self.respond(url, form)
    }
}

fn config() -> Config {
    let mut config = Config::default();
    config.netatmo.client_id = "cid".into();
    config.netatmo.client_secret = "secret".into();
    config.netatmo.username = "me@example.org".into();
    config.netatmo.password = "hunter2".into();
    config.openweathermap.app_id = "app".into();
    config.wettercom.city_code = "DE0001020".into();
    config.wettercom.project_name = "deck".into();
    config.wettercom.api_key = "key".into();
    config
}

fn stations_payload() -> Value {
    json!({
        "body": {
            "user": { "administrative": { "reg_locale": "de-DE" } },
            "devices": [{
                "station_name": "Zuhause",
                "wifi_status": 52,
                "co2_calibrating": false,
                "place": { "city": "Hamburg", "location": [9.99, 53.55], "timezone": "Europe/Berlin" },
                "dashboard_data": {
                    "Temperature": 21.5, "min_temp": 19.0, "max_temp": 22.1,
                    "CO2": 612, "Humidity": 48, "Pressure": 1013.2,
                    "pressure_trend": "stable", "Noise": 38
                },
                "modules": [
                    { "battery_percent": 80, "rf_status": 64,
                      "dashboard_data": { "sum_rain_1": 0.3, "sum_rain_24": 2.1 } },
                    { "battery_percent": 55, "rf_status": 71,
                      "dashboard_data": { "Temperature": 4.2, "min_temp": -1.3, "max_temp": 6.0, "Humidity": 86 } }
                ]
            }]
        }
    })
}

fn forecast_payload() -> Value {
    json!({
        "list": [{
            "dt": 1_709_294_400,
            "temp": { "min": 3.24, "max": 11.06 },
            "weather": [{ "id": 800, "description": "Klarer Himmel" }]
        }]
    })
}

fn healthy_http() -> Arc<FakeHttp> {
    let http = Arc::new(FakeHttp::default());
    http.route(
        "oauth2/token",
        Ok(json!({ "access_token": "a1", "refresh_token": "r1", "expires_in": 10800 })),
    );
    http.route("api/getstationsdata", Ok(stations_payload()));
    http.route("forecast/daily", Ok(forecast_payload()));
    // No record for today: the outlook stays empty without failing the task.
    http.route("forecast/weather/city", Ok(json!({ "city": { "forecast": {} } })));
    http
}

#[test]
fn first_ticks_populate_station_and_forecast() {
    let http = healthy_http();
    let mut station = Station::with_http(&config(), http.clone());
    let mut scheduler = Scheduler::new();
    station.install(&mut scheduler);

    scheduler.tick(0, &mut station);
    let session = station.netatmo.as_ref().unwrap().session();
    assert_eq!(session.state(), SessionState::Authenticated);

    let snapshot = station.state.snapshot();
    let reading = snapshot.station.as_ref().unwrap();
    assert_eq!(reading.city.as_deref(), Some("Hamburg"));
    assert_eq!(reading.rain.last_day, 2.1);
    assert!(snapshot.forecast.is_empty());

    scheduler.tick(5, &mut station);
    let snapshot = station.state.snapshot();
    assert_eq!(snapshot.forecast.len(), 1);
    assert_eq!(snapshot.forecast[0].temp_min, 3.2);

    // The forecast asked for the station's coordinates, not the fallback.
    let forecast_requests = http.requests_to("forecast/daily");
    assert_eq!(forecast_requests.len(), 1);
    assert!(forecast_requests[0].contains(&("lat".to_string(), "53.55".to_string())));
    assert!(forecast_requests[0].contains(&("lon".to_string(), "9.99".to_string())));
}

#[test]
fn station_request_carries_access_token() {
    let http = healthy_http();
    let mut station = Station::with_http(&config(), http.clone());
    let mut scheduler = Scheduler::new();
    station.install(&mut scheduler);
    scheduler.tick(0, &mut station);

    let requests = http.requests_to("api/getstationsdata");
    assert_eq!(requests, vec![vec![("access_token".to_string(), "a1".to_string())]]);
}

#[test]
fn failing_sources_keep_previous_state_and_tasks() {
    let http = healthy_http();
    let mut station = Station::with_http(&config(), http.clone());
    let mut scheduler = Scheduler::new();
    let ids = station.install(&mut scheduler);

    scheduler.tick(0, &mut station);
    scheduler.tick(5, &mut station);
    let before = station.state.snapshot();

    http.fail_everything();
    scheduler.tick(900, &mut station);
    scheduler.tick(905, &mut station);

    assert_eq!(station.state.snapshot(), before);
    for id in &ids[1..] {
        assert!(scheduler.is_scheduled(*id), "task {id} was dropped");
    }
}

#[test]
fn unchanged_payloads_leave_snapshot_unchanged() {
    let http = healthy_http();
    let mut station = Station::with_http(&config(), http);
    let mut scheduler = Scheduler::new();
    station.install(&mut scheduler);

    scheduler.tick(0, &mut station);
    scheduler.tick(5, &mut station);
    let first = station.state.snapshot();

    scheduler.tick(900, &mut station);
    scheduler.tick(905, &mut station);
    assert_eq!(station.state.snapshot(), first);
}

#[test]
fn rejected_credentials_leave_station_unpublished() {
    let http = healthy_http();
    http.route("oauth2/token", Ok(json!({ "error": "invalid_client" })));
    let mut station = Station::with_http(&config(), http.clone());
    let mut scheduler = Scheduler::new();
    station.install(&mut scheduler);

    scheduler.tick(0, &mut station);
    assert!(station.state.snapshot().station.is_none());
    assert!(http.requests_to("api/getstationsdata").is_empty());
    assert_eq!(
        station.netatmo.as_ref().unwrap().session().state(),
        SessionState::RetryWait
    );

    // The retry fires a minute later with the password grant again.
    http.route(
        "oauth2/token",
        Ok(json!({ "access_token": "a2", "refresh_token": "r2", "expires_in": 3600 })),
    );
    scheduler.tick(60, &mut station);
    assert_eq!(
        station.netatmo.as_ref().unwrap().session().state(),
        SessionState::Authenticated
    );
    assert_eq!(http.requests_to("oauth2/token").len(), 2);
}

#[test]
fn revoked_token_triggers_password_grant_retry() {
    let http = healthy_http();
    http.route(
        "api/getstationsdata",
        Ok(json!({ "error": { "code": 3, "message": "Access token expired" } })),
    );
    let mut station = Station::with_http(&config(), http.clone());
    let mut scheduler = Scheduler::new();
    station.install(&mut scheduler);

    scheduler.tick(0, &mut station);
    let session = station.netatmo.as_ref().unwrap().session();
    assert_eq!(session.state(), SessionState::RetryWait);
    assert_eq!(session.access_token(), None);
    assert!(station.state.snapshot().station.is_none());

    // The refresh armed for tick 5400 was replaced by a retry a minute out.
    http.route("api/getstationsdata", Ok(stations_payload()));
    scheduler.tick(60, &mut station);
    assert_eq!(http.requests_to("oauth2/token").len(), 2);
    assert_eq!(
        station.netatmo.as_ref().unwrap().session().state(),
        SessionState::Authenticated
    );

    scheduler.tick(900, &mut station);
    let snapshot = station.state.snapshot();
    assert_eq!(snapshot.station.as_ref().unwrap().city.as_deref(), Some("Hamburg"));
    assert_eq!(http.requests_to("oauth2/token").len(), 2);
    // Station, forecast, outlook and a single refresh.
    assert_eq!(scheduler.len(), 4);
}
