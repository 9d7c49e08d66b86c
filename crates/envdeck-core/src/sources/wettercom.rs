//! Checksum-signed outlook source (wetter.com).
//!
//! The provider only covers today and the next two days; the source keeps
//! today's min/max and the condition of the bucket covering the local hour.

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use md5::{Digest, Md5};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{lenient_f64, lenient_i64, Cadence, Source};
use crate::error::SourceError;
use crate::http::{join_url, HttpClient};
use crate::normalize;
use crate::state::{Bucket, DailyOutlook, StateHandle};

pub const DEFAULT_BASE_URL: &str = "http://api.wetter.com";

const NAME: &str = "wettercom";

/// Account and city the requests are signed for.
#[derive(Debug, Clone)]
pub struct WetterComAccount {
    pub city_code: String,
    pub project_name: String,
    pub api_key: String,
}

impl WetterComAccount {
    /// Hex MD5 of `project_name + api_key + city_code`.
    pub fn checksum(&self) -> String {
        let mut hasher = Md5::new();
        hasher.update(self.project_name.as_bytes());
        hasher.update(self.api_key.as_bytes());
        hasher.update(self.city_code.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn path(&self) -> String {
        format!(
            "forecast/weather/city/{}/project/{}/cs/{}",
            self.city_code,
            self.project_name,
            self.checksum()
        )
    }
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send>;

pub struct WetterComSource {
    base_url: String,
    account: WetterComAccount,
    http: Arc<dyn HttpClient>,
    state: StateHandle,
    clock: Clock,
    cadence: Cadence,
}

impl WetterComSource {
    pub fn new(
        base_url: impl Into<String>,
        account: WetterComAccount,
        http: Arc<dyn HttpClient>,
        state: StateHandle,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            account,
            http,
            state,
            clock: Box::new(|| Local::now().naive_local()),
            cadence: Cadence::new(0, 900),
        }
    }

    /// Replace the local wall clock used to pick today's record.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn url(&self) -> String {
        join_url(&self.base_url, &self.account.path())
    }
}

impl Source for WetterComSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn cadence(&self) -> Cadence {
        self.cadence
    }

    fn fetch(&mut self) -> Result<(), SourceError> {
        let body = self.http.get_json(&self.url(), &[("output", "json")])?;

        let now = (self.clock)();
        match parse_outlook(&body, now.date(), now.hour())? {
            Some(outlook) => {
                debug!(source = NAME, code = outlook.code, bucket = outlook.bucket.key(), "outlook parsed");
                self.state.publish_outlook(outlook);
            }
            None => warn!(source = NAME, date = %now.date(), "unable to find today in forecast"),
        }
        Ok(())
    }
}

/// Pick today's record out of a `city.forecast` payload.
///
/// Returns `Ok(None)` when the payload is well-formed but has no record
/// for `today`.
pub fn parse_outlook(
    body: &Value,
    today: NaiveDate,
    hour: u32,
) -> Result<Option<DailyOutlook>, SourceError> {
    let forecast = body
        .pointer("/city/forecast")
        .and_then(Value::as_object)
        .ok_or_else(|| SourceError::Parse("missing city.forecast".into()))?;

    let key = today.format("%Y-%m-%d").to_string();
    let Some(record) = forecast.get(&key) else {
        return Ok(None);
    };

    let bucket = Bucket::for_hour(hour);
    let bad = |name: &str| SourceError::Parse(format!("{key}: bad {name}"));

    let temp_min = lenient_f64(&record["tn"]).ok_or_else(|| bad("tn"))?;
    let temp_max = lenient_f64(&record["tx"]).ok_or_else(|| bad("tx"))?;
    let code = lenient_i64(&record[bucket.key()]["w"]).ok_or_else(|| bad("w"))?;

    Ok(Some(DailyOutlook {
        date: today,
        temp_min,
        temp_max,
        bucket,
        code,
        condition: normalize::wettercom(code),
    }))
}
