//! Credentials that carry an expiry and know how to renew themselves.
//!
//! Renewal is single-flight per instance: the check, the refresh callback and
//! the state swap all happen under one async lock. Callers that queue on the
//! lock while a refresh is running get that refresh's outcome, success or
//! error, and never start another one.
//! State is only replaced after the callback returned a complete credential
//! set; a failed or cancelled refresh leaves the previous values in place.

use std::{
    fmt,
    future::Future,
    sync::{Arc, Mutex},
};

use futures_util::future::BoxFuture;
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    credentials::{Credentials, FrozenCredentials, Metadata},
    error::{Error, Result},
    time_source::{self, SharedTimeSource, TimeSource},
    util::redact::redact_value,
};

/// Within this window before expiry a refresh is attempted, but a failure is
/// tolerated while the current credentials are still usable.
pub const ADVISORY_REFRESH_TIMEOUT: Duration = Duration::minutes(15);

/// Within this window before expiry a refresh must succeed.
pub const MANDATORY_REFRESH_TIMEOUT: Duration = Duration::minutes(10);

const REQUIRED_FIELDS: [&str; 4] = ["access_key", "secret_key", "token", "expiry_time"];

/// Future returned by a [`Refresh`] callback.
pub type RefreshFuture = BoxFuture<'static, Result<Option<Metadata>>>;

/// Produces a fresh credential [`Metadata`] mapping.
///
/// `Ok(None)` and an empty mapping both mean "no credentials" and are reported
/// as a retrieval failure by the credentials object.
pub trait Refresh: Send + Sync {
    fn refresh(&self) -> RefreshFuture;
}

impl<F, Fut> Refresh for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Metadata>>> + Send + 'static,
{
    fn refresh(&self) -> RefreshFuture {
        Box::pin(self())
    }
}

/// Shared, type-erased refresh callback.
pub type SharedRefresh = Arc<dyn Refresh>;

#[derive(Clone)]
struct State {
    credentials: Option<FrozenCredentials>,
    expiry_time: Option<OffsetDateTime>,
    /// Completed refresh attempts.
    attempts: u64,
    /// Error returned by the latest attempt.
    last_error: Option<Error>,
}

struct Inner {
    method: String,
    refresh: SharedRefresh,
    time_source: SharedTimeSource,
    advisory: Duration,
    mandatory: Duration,
    state: Mutex<State>,
    refresh_lock: tokio::sync::Mutex<()>,
}

/// Credentials with an expiry time and a refresh callback.
///
/// Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct RefreshableCredentials {
    inner: Arc<Inner>,
}

/// Builder for [`RefreshableCredentials`].
pub struct RefreshableCredentialsBuilder {
    refresh: SharedRefresh,
    method: String,
    initial: Option<(FrozenCredentials, OffsetDateTime)>,
    time_source: Option<SharedTimeSource>,
    advisory: Duration,
    mandatory: Duration,
}

impl RefreshableCredentialsBuilder {
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Initial credential set and its expiry. The expiry may already be past.
    pub fn credentials(mut self, credentials: &Credentials, expiry_time: OffsetDateTime) -> Self {
        self.initial = Some((credentials.get_frozen_credentials(), expiry_time));
        self
    }

    pub fn time_source(mut self, time_source: impl TimeSource + 'static) -> Self {
        self.time_source = Some(Arc::new(time_source));
        self
    }

    pub fn shared_time_source(mut self, time_source: SharedTimeSource) -> Self {
        self.time_source = Some(time_source);
        self
    }

    /// Overrides the advisory and mandatory refresh windows.
    pub fn refresh_windows(mut self, advisory: Duration, mandatory: Duration) -> Self {
        self.advisory = advisory;
        self.mandatory = mandatory.min(advisory);
        self
    }

    /// Without [`credentials`](Self::credentials) the result has no expiry and
    /// fetches on first use, like [`build_deferred`](Self::build_deferred).
    pub fn build(self) -> RefreshableCredentials {
        let (credentials, expiry_time) = match self.initial {
            Some((creds, expiry)) => (Some(creds), Some(expiry)),
            None => (None, None),
        };
        RefreshableCredentials {
            inner: Arc::new(Inner {
                method: self.method,
                refresh: self.refresh,
                time_source: self.time_source.unwrap_or_else(time_source::system),
                advisory: self.advisory,
                mandatory: self.mandatory,
                state: Mutex::new(State {
                    credentials,
                    expiry_time,
                    attempts: 0,
                    last_error: None,
                }),
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Builds credentials that fetch nothing until first used.
    pub fn build_deferred(mut self) -> DeferredRefreshableCredentials {
        self.initial = None;
        DeferredRefreshableCredentials(self.build())
    }
}

impl RefreshableCredentials {
    pub fn builder(refresh: impl Refresh + 'static) -> RefreshableCredentialsBuilder {
        Self::builder_shared(Arc::new(refresh))
    }

    pub fn builder_shared(refresh: SharedRefresh) -> RefreshableCredentialsBuilder {
        RefreshableCredentialsBuilder {
            refresh,
            method: crate::credentials::EXPLICIT_METHOD.to_string(),
            initial: None,
            time_source: None,
            advisory: ADVISORY_REFRESH_TIMEOUT,
            mandatory: MANDATORY_REFRESH_TIMEOUT,
        }
    }

    /// Wraps `credentials` (keeping its method tag) with an expiry and a refresh callback.
    pub fn new(
        credentials: &Credentials,
        expiry_time: OffsetDateTime,
        refresh: impl Refresh + 'static,
    ) -> Self {
        Self::builder(refresh)
            .method(credentials.method())
            .credentials(credentials, expiry_time)
            .build()
    }

    /// Builds from an initial metadata mapping, validated like a refresh result.
    pub fn create_from_metadata(
        metadata: Metadata,
        refresh: SharedRefresh,
        method: impl Into<String>,
        time_source: SharedTimeSource,
    ) -> Result<Self> {
        let method = method.into();
        let parsed = ParsedMetadata::parse(&method, Some(metadata))?;
        let mut builder = Self::builder_shared(refresh)
            .method(method)
            .shared_time_source(time_source);
        builder.initial = Some((parsed.credentials, parsed.expiry_time));
        Ok(builder.build())
    }

    pub fn method(&self) -> &str {
        &self.inner.method
    }

    pub fn expiry_time(&self) -> Option<OffsetDateTime> {
        self.state().expiry_time
    }

    /// Current values without triggering a refresh.
    pub fn current(&self) -> Option<FrozenCredentials> {
        self.state().credentials
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// True when "now" is within `refresh_in` of the expiry time, or past it.
    ///
    /// `None` uses the advisory window. Credentials that were never loaded
    /// always need a refresh.
    pub fn refresh_needed(&self, refresh_in: Option<Duration>) -> bool {
        let Some(expiry_time) = self.state().expiry_time else {
            return true;
        };
        let refresh_in = refresh_in.unwrap_or(self.inner.advisory);
        let remaining = expiry_time - self.inner.time_source.now();
        remaining < refresh_in
    }

    /// Returns a snapshot of the credentials, refreshing them first if needed.
    pub async fn get_frozen_credentials(&self) -> Result<FrozenCredentials> {
        self.refresh_if_needed().await?;
        self.current().ok_or_else(|| {
            Error::credential_retrieval(self.method(), "credentials were never loaded")
        })
    }

    async fn refresh_if_needed(&self) -> Result<()> {
        let seen = self.state().attempts;
        if !self.refresh_needed(None) {
            return Ok(());
        }

        let _guard = self.inner.refresh_lock.lock().await;
        let state = self.state();
        // An attempt completed while this caller waited: share its outcome.
        if state.attempts != seen {
            return state.last_error.map_or(Ok(()), Err);
        }
        if !self.refresh_needed(None) {
            return Ok(());
        }

        let outcome = self.attempt_refresh().await;
        let mut state = self.lock_state();
        state.attempts += 1;
        state.last_error = outcome.as_ref().err().cloned();
        outcome
    }

    /// One refresh attempt. Runs with the refresh lock held.
    async fn attempt_refresh(&self) -> Result<()> {
        let is_mandatory = self.refresh_needed(Some(self.inner.mandatory));
        if let Err(err) = self.run_refresh().await {
            if is_mandatory || self.current().is_none() {
                return Err(err);
            }
            #[cfg(feature = "tracing")]
            tracing::warn!(
                method = %self.inner.method,
                error = %err,
                "advisory credential refresh failed, keeping current credentials"
            );
            return Ok(());
        }

        if self.refresh_needed(Some(self.inner.mandatory)) {
            return Err(Error::credential_retrieval(
                self.method(),
                "credentials were refreshed, but the refreshed credentials are still expired",
            ));
        }
        Ok(())
    }

    async fn run_refresh(&self) -> Result<()> {
        let refresh = self.inner.refresh.refresh();

        #[cfg(feature = "tracing")]
        let refresh = tracing::Instrument::instrument(
            refresh,
            tracing::debug_span!("credchain.refresh", method = %self.inner.method),
        );

        let result = refresh
            .await
            .and_then(|metadata| ParsedMetadata::parse(&self.inner.method, metadata));

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "credchain_refresh_total",
            "method" => self.inner.method.clone(),
            "outcome" => if result.is_ok() { "success" } else { "error" },
        )
        .increment(1);

        let parsed = result?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            method = %self.inner.method,
            expiry_time = %parsed.expiry_time,
            "credentials refreshed"
        );

        let mut state = self.lock_state();
        state.credentials = Some(parsed.credentials);
        state.expiry_time = Some(parsed.expiry_time);
        Ok(())
    }

    fn state(&self) -> State {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for RefreshableCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("RefreshableCredentials")
            .field("method", &self.inner.method)
            .field(
                "access_key",
                &state.credentials.as_ref().map(|c| redact_value(&c.access_key)),
            )
            .field("expiry_time", &state.expiry_time)
            .finish()
    }
}

/// Refreshable credentials that perform no fetch until first used.
///
/// The first [`get_frozen_credentials`](Self::get_frozen_credentials) call
/// runs the callback once; callers racing with it wait for that result.
#[derive(Clone, Debug)]
pub struct DeferredRefreshableCredentials(RefreshableCredentials);

impl DeferredRefreshableCredentials {
    pub fn new(refresh: impl Refresh + 'static, method: impl Into<String>) -> Self {
        RefreshableCredentials::builder(refresh)
            .method(method)
            .build_deferred()
    }

    pub fn method(&self) -> &str {
        self.0.method()
    }

    pub fn refresh_needed(&self, refresh_in: Option<Duration>) -> bool {
        self.0.refresh_needed(refresh_in)
    }

    pub async fn get_frozen_credentials(&self) -> Result<FrozenCredentials> {
        self.0.get_frozen_credentials().await
    }

    pub fn into_inner(self) -> RefreshableCredentials {
        self.0
    }
}

/// A validated refresh result.
pub(crate) struct ParsedMetadata {
    pub(crate) credentials: FrozenCredentials,
    pub(crate) expiry_time: OffsetDateTime,
}

impl ParsedMetadata {
    /// Validates a metadata mapping.
    ///
    /// All four fields must be present. An empty `token` value means the
    /// credentials carry no session token.
    pub(crate) fn parse(method: &str, metadata: Option<Metadata>) -> Result<Self> {
        let metadata = metadata.unwrap_or_default();
        let missing = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| match metadata.get(*field) {
                Some(value) => *field != "token" && value.trim().is_empty(),
                None => true,
            })
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(Error::credential_retrieval(
                method,
                format!(
                    "credential refresh failed, response did not contain: {}",
                    missing.join(", ")
                ),
            ));
        }

        let field = |name: &str| metadata.get(name).cloned().unwrap_or_default();
        let expiry_time = parse_expiry(method, &field("expiry_time"))?;
        let token = field("token");

        Ok(Self {
            credentials: FrozenCredentials {
                access_key: field("access_key"),
                secret_key: field("secret_key"),
                token: (!token.is_empty()).then_some(token),
            },
            expiry_time,
        })
    }
}

pub(crate) fn parse_expiry(method: &str, value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value.trim(), &Rfc3339).map_err(|e| {
        Error::credential_retrieval(method, format!("invalid expiry_time {value:?}: {e}"))
    })
}

pub(crate) fn format_expiry(value: OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}
