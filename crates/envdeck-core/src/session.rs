//! OAuth2 password-grant session for the credentialed station source.
//!
//! The session drives its own renewal through the scheduler:
//!
//! ```text
//! Unauthenticated -> Authenticating -> Authenticated -> RefreshPending -> Authenticated ...
//!                         |  ^                              |
//!                         v  |                              v
//!                       RetryWait <--------------------------
//! ```
//!
//! A successful grant arms the refresh task at half the token lifetime. Any
//! failure arms a password-grant retry after a fixed interval. There is no
//! retry cap and no backoff growth, so the session never fails terminally.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::http::HttpClient;
use crate::scheduler::{Scheduler, TaskContext, TaskId, Ticks};

/// Retry interval after a failed grant, in ticks.
pub const DEFAULT_RETRY_INTERVAL: Ticks = 60;

const SCOPE: &str = "read_station";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    RefreshPending,
    /// A failed grant; a password-grant retry is armed.
    RetryWait,
}

/// What the session wants armed next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    /// Run the refresh-token grant after this many ticks.
    RefreshAfter(Ticks),
    /// Re-run the password grant after this many ticks.
    RetryAfter(Ticks),
}

/// Resource-owner credentials for the password grant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: u64,
}

/// Access/refresh token pair plus the state machine around it.
#[derive(Debug, Clone)]
pub struct CredentialSession {
    service: String,
    token_url: String,
    credentials: ClientCredentials,
    state: SessionState,
    access_token: Option<String>,
    refresh_token: Option<String>,
    /// Lifetime of the current access token, in ticks.
    expires_in: Option<Ticks>,
    /// Tick at which the current access token was issued.
    obtained_at: Option<Ticks>,
    retry_interval: Ticks,
    /// The refresh or retry task currently armed for this session.
    armed: Option<TaskId>,
}

impl CredentialSession {
    pub fn new(
        service: impl Into<String>,
        token_url: impl Into<String>,
        credentials: ClientCredentials,
    ) -> Self {
        Self {
            service: service.into(),
            token_url: token_url.into(),
            credentials,
            state: SessionState::Unauthenticated,
            access_token: None,
            refresh_token: None,
            expires_in: None,
            obtained_at: None,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            armed: None,
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Ticks) -> Self {
        self.retry_interval = retry_interval.max(1);
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Current access token, only while authenticated.
    pub fn access_token(&self) -> Option<&str> {
        if self.is_authenticated() {
            self.access_token.as_deref()
        } else {
            None
        }
    }

    pub fn retry_interval(&self) -> Ticks {
        self.retry_interval
    }

    /// Tick at which the current access token expires.
    pub fn expires_at(&self) -> Option<Ticks> {
        Some(self.obtained_at? + self.expires_in?)
    }

    /// Ticks left on the current access token (0 once expired).
    pub fn remaining(&self, now: Ticks) -> Option<Ticks> {
        self.expires_at().map(|at| at.saturating_sub(now))
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Password grant. Entered at startup and from every retry.
    pub fn authenticate(&mut self, http: &dyn HttpClient, now: Ticks) -> SessionStep {
        self.state = SessionState::Authenticating;
        debug!(service = %self.service, "starting authentication");

        let form = [
            ("grant_type", "password"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
            ("scope", SCOPE),
        ];

        match request_tokens(http, &self.token_url, &form) {
            Ok(tokens) => {
                info!(service = %self.service, "authentication successful");
                self.store(tokens, now)
            }
            Err(e) => {
                warn!(service = %self.service, error = %e, retry_in = self.retry_interval, "authentication failed");
                self.fail()
            }
        }
    }

    /// Refresh-token grant, run at half the token lifetime.
    pub fn refresh(&mut self, http: &dyn HttpClient, now: Ticks) -> SessionStep {
        self.state = SessionState::RefreshPending;
        debug!(service = %self.service, "starting access token refresh");

        let Some(refresh_token) = self.refresh_token.clone() else {
            warn!(service = %self.service, "no refresh token held, falling back to authentication");
            return self.fail();
        };

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        match request_tokens(http, &self.token_url, &form) {
            Ok(tokens) => {
                info!(service = %self.service, "access token refreshed");
                self.store(tokens, now)
            }
            Err(e) => {
                warn!(service = %self.service, error = %e, retry_in = self.retry_interval, "access token refresh failed");
                self.fail()
            }
        }
    }

    /// Drop the access token after the provider rejected it.
    pub fn invalidate(&mut self) -> SessionStep {
        warn!(service = %self.service, retry_in = self.retry_interval, "access token rejected");
        self.access_token = None;
        self.fail()
    }

    fn store(&mut self, tokens: TokenResponse, now: Ticks) -> SessionStep {
        self.access_token = Some(tokens.access_token);
        if let Some(refresh) = tokens.refresh_token {
            self.refresh_token = Some(refresh);
        }
        self.expires_in = Some(tokens.expires_in);
        self.obtained_at = Some(now);
        self.state = SessionState::Authenticated;

        SessionStep::RefreshAfter((tokens.expires_in / 2).max(1))
    }

    fn fail(&mut self) -> SessionStep {
        self.state = SessionState::RetryWait;
        SessionStep::RetryAfter(self.retry_interval)
    }
}

fn request_tokens(
    http: &dyn HttpClient,
    token_url: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, SourceError> {
    let body = http.post_form(token_url, form).map_err(|e| match e {
        SourceError::Http { status: 400 | 401 | 403, url } => {
            SourceError::Auth(format!("token endpoint {url} rejected the grant"))
        }
        other => other,
    })?;
    parse_token_response(body)
}

fn parse_token_response(body: Value) -> Result<TokenResponse, SourceError> {
    if let Some(error) = body.get("error") {
        return Err(SourceError::Auth(error.to_string()));
    }
    serde_json::from_value(body).map_err(|e| SourceError::Parse(format!("token response: {e}")))
}

// ── Scheduler wiring ────────────────────────────────────────────────

/// Runtime state that owns a [`CredentialSession`] and its transport.
///
/// Returning `None` (no credentialed source configured) makes the session
/// tasks no-ops that do not re-arm.
pub trait SessionHost {
    fn session_parts(&mut self) -> Option<(&mut CredentialSession, &dyn HttpClient)>;
}

/// Arm the initial authentication. Called once at startup.
pub fn start<S: SessionHost + 'static>(scheduler: &mut Scheduler<S>) -> TaskId {
    scheduler.schedule_once(0, authenticate_task::<S>)
}

fn authenticate_task<S: SessionHost + 'static>(ctx: &mut TaskContext<'_, S>) {
    let now = ctx.now();
    let Some((session, http)) = ctx.state.session_parts() else {
        return;
    };
    let step = session.authenticate(http, now);
    arm(ctx, step);
}

fn refresh_task<S: SessionHost + 'static>(ctx: &mut TaskContext<'_, S>) {
    let now = ctx.now();
    let Some((session, http)) = ctx.state.session_parts() else {
        return;
    };
    let step = session.refresh(http, now);
    arm(ctx, step);
}

/// Replace a rejected access token with a password-grant retry.
///
/// Called from a source task when the provider answered with an auth
/// error. The pending refresh is cancelled so only the retry stays armed.
pub fn reauthenticate<S: SessionHost + 'static>(ctx: &mut TaskContext<'_, S>) {
    let Some((session, _)) = ctx.state.session_parts() else {
        return;
    };
    let previous = session.armed.take();
    let step = session.invalidate();
    if let Some(id) = previous {
        ctx.cancel(id);
    }
    arm(ctx, step);
}

fn arm<S: SessionHost + 'static>(ctx: &mut TaskContext<'_, S>, step: SessionStep) {
    let id = match step {
        SessionStep::RefreshAfter(delay) => ctx.schedule_once(delay, refresh_task::<S>),
        SessionStep::RetryAfter(delay) => ctx.schedule_once(delay, authenticate_task::<S>),
    };
    if let Some((session, _)) = ctx.state.session_parts() {
        session.armed = Some(id);
    }
}
