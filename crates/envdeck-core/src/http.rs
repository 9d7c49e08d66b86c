//! Blocking JSON transport for the weather sources.
//!
//! Sources talk to the network through the [`HttpClient`] trait so tests can
//! substitute canned payloads. [`ReqwestClient`] is the real implementation:
//! an async `reqwest::Client` driven to completion on a private
//! current-thread tokio runtime, since every scheduled task runs
//! synchronously on the tick thread.

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::trace;

use crate::error::SourceError;

const USER_AGENT: &str = concat!("envdeck/", env!("CARGO_PKG_VERSION"));

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Minimal JSON-over-HTTP surface the sources need.
pub trait HttpClient: Send + Sync {
    /// `GET url?query` and decode the body as JSON.
    fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, SourceError>;

    /// `POST url` with a form-encoded body and decode the response as JSON.
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, SourceError>;
}

pub struct ReqwestClient {
    client: Client,
    runtime: tokio::runtime::Runtime,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SourceError::Network(format!("failed to start HTTP runtime: {e}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self { client, runtime })
    }

    fn execute(&self, request: RequestBuilder, url: &str) -> Result<Value, SourceError> {
        let (status, body) = self.runtime.block_on(async {
            let resp = request.send().await?;
            let status = resp.status();
            let body = resp.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        })
        .map_err(|e| SourceError::Network(e.to_string()))?;

        trace!(url, status = status.as_u16(), bytes = body.len(), "HTTP response");

        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        serde_json::from_str(&body).map_err(|e| SourceError::Parse(format!("{url}: {e}")))
    }
}

impl HttpClient for ReqwestClient {
    fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, SourceError> {
        self.execute(self.client.get(url).query(query), url)
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, SourceError> {
        self.execute(self.client.post(url).form(form), url)
    }
}

/// Join a base URL and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
