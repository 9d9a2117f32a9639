//! Exchanges source credentials (or a web identity token) for role credentials.
//!
//! Both fetchers consult a [`CredentialCache`](crate::cache::CredentialCache)
//! first. Entries are keyed by a SHA-1 digest of the canonical request
//! parameters, so any fetcher asking for the same role with the same arguments
//! lands on the same entry. Stale entries are ignored and overwritten.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use time::OffsetDateTime;

use crate::{
    cache::{InMemoryCache, SharedCache},
    credentials::{
        ADVISORY_REFRESH_TIMEOUT, FrozenCredentials, Metadata, ProvidedCredentials,
        refreshable::format_expiry,
    },
    error::{Error, Result},
    time_source::{self, SharedTimeSource},
    util::{json::to_canonical_string, redact::redact_value},
};

pub mod token;

pub use token::{FileWebIdentityTokenLoader, SharedTokenLoader, WebIdentityTokenLoader};

/// Credentials block of an STS response.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StsCredentials {
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    pub secret_access_key: String,
    #[serde(rename = "SessionToken")]
    pub session_token: String,
    #[serde(rename = "Expiration", with = "time::serde::rfc3339")]
    pub expiration: OffsetDateTime,
}

impl fmt::Debug for StsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StsCredentials")
            .field("access_key_id", &redact_value(&self.access_key_id))
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssumedRoleUser {
    #[serde(rename = "AssumedRoleId")]
    pub assumed_role_id: String,
    #[serde(rename = "Arn")]
    pub arn: String,
}

/// Response of `AssumeRole` / `AssumeRoleWithWebIdentity`, also the cached form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssumeRoleResponse {
    #[serde(rename = "Credentials")]
    pub credentials: StsCredentials,
    #[serde(
        rename = "AssumedRoleUser",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub assumed_role_user: Option<AssumedRoleUser>,
}

impl AssumeRoleResponse {
    pub fn new(credentials: StsCredentials) -> Self {
        Self {
            credentials,
            assumed_role_user: None,
        }
    }

    fn to_metadata(&self) -> Metadata {
        let creds = &self.credentials;
        Metadata::from([
            ("access_key".to_string(), creds.access_key_id.clone()),
            ("secret_key".to_string(), creds.secret_access_key.clone()),
            ("token".to_string(), creds.session_token.clone()),
            ("expiry_time".to_string(), format_expiry(creds.expiration)),
        ])
    }
}

/// Optional arguments of an assume-role call.
///
/// Every field that is set takes part in the cache key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AssumeRoleParams {
    #[serde(rename = "RoleSessionName", skip_serializing_if = "Option::is_none")]
    pub role_session_name: Option<String>,
    #[serde(rename = "ExternalId", skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(rename = "SerialNumber", skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(rename = "DurationSeconds", skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
    /// Inline session policy as JSON text.
    #[serde(rename = "Policy", skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

impl AssumeRoleParams {
    pub fn role_session_name(mut self, value: impl Into<String>) -> Self {
        self.role_session_name = Some(value.into());
        self
    }

    pub fn external_id(mut self, value: impl Into<String>) -> Self {
        self.external_id = Some(value.into());
        self
    }

    pub fn serial_number(mut self, value: impl Into<String>) -> Self {
        self.serial_number = Some(value.into());
        self
    }

    pub fn duration_seconds(mut self, value: u32) -> Self {
        self.duration_seconds = Some(value);
        self
    }

    pub fn policy(mut self, value: impl Into<String>) -> Self {
        self.policy = Some(value.into());
        self
    }
}

/// Request handed to [`StsClient::assume_role`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub role_session_name: String,
    pub external_id: Option<String>,
    pub serial_number: Option<String>,
    pub token_code: Option<String>,
    pub duration_seconds: Option<u32>,
    pub policy: Option<String>,
}

/// Request handed to [`StsClient::assume_role_with_web_identity`].
#[derive(Clone, PartialEq, Eq)]
pub struct AssumeRoleWithWebIdentityRequest {
    pub role_arn: String,
    pub role_session_name: String,
    pub web_identity_token: String,
    pub duration_seconds: Option<u32>,
    pub policy: Option<String>,
}

impl fmt::Debug for AssumeRoleWithWebIdentityRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumeRoleWithWebIdentityRequest")
            .field("role_arn", &self.role_arn)
            .field("role_session_name", &self.role_session_name)
            .field("web_identity_token", &"<redacted>")
            .field("duration_seconds", &self.duration_seconds)
            .field("policy", &self.policy)
            .finish()
    }
}

/// The STS operations the fetchers need. Implemented by the caller.
#[async_trait]
pub trait StsClient: Send + Sync {
    async fn assume_role(&self, request: AssumeRoleRequest) -> Result<AssumeRoleResponse> {
        let _ = request;
        Err(Error::client("assume_role is not supported by this client", None))
    }

    async fn assume_role_with_web_identity(
        &self,
        request: AssumeRoleWithWebIdentityRequest,
    ) -> Result<AssumeRoleResponse> {
        let _ = request;
        Err(Error::client(
            "assume_role_with_web_identity is not supported by this client",
            None,
        ))
    }

    /// Releases the client. Called once after every operation, success or not.
    ///
    /// When the caller drops the operation before it completes, the release is
    /// spawned onto the current tokio runtime instead.
    async fn close(&self) {}
}

/// Creates an STS client, signed with `credentials` when given.
#[async_trait]
pub trait ClientCreator: Send + Sync {
    async fn create_client(
        &self,
        credentials: Option<FrozenCredentials>,
    ) -> Result<Box<dyn StsClient>>;
}

/// Shared, type-erased client creator.
pub type SharedClientCreator = Arc<dyn ClientCreator>;

/// Supplies the current MFA token code for a device serial number.
pub type MfaPrompter = Arc<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Owns a client until it is closed; dropping it early spawns the close.
struct ClientGuard {
    client: Arc<dyn StsClient>,
    released: bool,
}

impl ClientGuard {
    fn new(client: Box<dyn StsClient>) -> Self {
        Self {
            client: Arc::from(client),
            released: false,
        }
    }

    async fn close(mut self) {
        self.released = true;
        self.client.close().await;
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let client = self.client.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { client.close().await });
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("sts client dropped outside a tokio runtime, close skipped");
            }
        }
    }
}

/// Runs one client operation and releases the client afterwards, including
/// when the returned future is dropped before completion.
async fn with_client<T, F, Fut>(
    creator: &dyn ClientCreator,
    credentials: Option<FrozenCredentials>,
    op: F,
) -> Result<T>
where
    F: FnOnce(Arc<dyn StsClient>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let guard = ClientGuard::new(creator.create_client(credentials).await?);
    let result = op(guard.client.clone()).await;
    guard.close().await;
    result
}

/// Digest of the canonical JSON of `RoleArn` plus the set parameters.
///
/// `Policy` is parsed first so its own keys are sorted too.
pub fn cache_key(role_arn: &str, params: &impl Serialize) -> String {
    let mut args = match serde_json::to_value(params) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    args.insert(
        "RoleArn".to_string(),
        serde_json::Value::String(role_arn.to_string()),
    );
    let policy = match args.get("Policy") {
        Some(serde_json::Value::String(policy)) => {
            serde_json::from_str::<serde_json::Value>(policy).ok()
        }
        _ => None,
    };
    if let Some(policy) = policy {
        args.insert("Policy".to_string(), policy);
    }

    let canonical = to_canonical_string(&serde_json::Value::Object(args));
    hex::encode(Sha1::digest(canonical.as_bytes()))
}

fn generated_session_name(now: OffsetDateTime) -> String {
    format!("credchain-session-{}", now.unix_timestamp())
}

/// Cache lookup, fetch and write-back shared by both fetchers.
struct CachedFetch {
    cache: SharedCache,
    cache_key: String,
    time_source: SharedTimeSource,
}

impl CachedFetch {
    async fn fetch<F, Fut>(&self, fetch: F) -> Result<Metadata>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AssumeRoleResponse>>,
    {
        let response = match self.load_from_cache().await {
            Some(response) => response,
            None => {
                let response = fetch().await?;
                self.cache.set(&self.cache_key, &response).await?;
                response
            }
        };
        Ok(response.to_metadata())
    }

    async fn load_from_cache(&self) -> Option<AssumeRoleResponse> {
        let response = self.cache.get(&self.cache_key).await;

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "credchain_assume_role_cache_total",
            "result" => if response.is_some() { "hit" } else { "miss" },
        )
        .increment(1);

        let response = response?;
        let remaining = response.credentials.expiration - self.time_source.now();
        if remaining < ADVISORY_REFRESH_TIMEOUT {
            #[cfg(feature = "tracing")]
            tracing::debug!(cache_key = %self.cache_key, "cached role credentials expired");
            return None;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(cache_key = %self.cache_key, "using cached role credentials");
        Some(response)
    }
}

/// Fetches role credentials with `AssumeRole`, signed by source credentials.
pub struct AssumeRoleCredentialFetcher {
    client_creator: SharedClientCreator,
    source_credentials: ProvidedCredentials,
    role_arn: String,
    extra_args: AssumeRoleParams,
    mfa_prompter: Option<MfaPrompter>,
    cached: CachedFetch,
}

impl AssumeRoleCredentialFetcher {
    pub fn new(
        client_creator: SharedClientCreator,
        source_credentials: impl Into<ProvidedCredentials>,
        role_arn: impl Into<String>,
    ) -> Self {
        let role_arn = role_arn.into();
        let extra_args = AssumeRoleParams::default();
        Self {
            client_creator,
            source_credentials: source_credentials.into(),
            cached: CachedFetch {
                cache: Arc::new(InMemoryCache::new()),
                cache_key: cache_key(&role_arn, &extra_args),
                time_source: time_source::system(),
            },
            role_arn,
            extra_args,
            mfa_prompter: None,
        }
    }

    pub fn with_extra_args(mut self, extra_args: AssumeRoleParams) -> Self {
        self.cached.cache_key = cache_key(&self.role_arn, &extra_args);
        self.extra_args = extra_args;
        self
    }

    pub fn with_cache(mut self, cache: SharedCache) -> Self {
        self.cached.cache = cache;
        self
    }

    pub fn with_mfa_prompter(mut self, prompter: MfaPrompter) -> Self {
        self.mfa_prompter = Some(prompter);
        self
    }

    pub fn with_time_source(mut self, time_source: SharedTimeSource) -> Self {
        self.cached.time_source = time_source;
        self
    }

    pub fn cache_key(&self) -> &str {
        &self.cached.cache_key
    }

    pub fn role_arn(&self) -> &str {
        &self.role_arn
    }

    /// Returns `{access_key, secret_key, token, expiry_time}` for the role.
    pub async fn fetch_credentials(&self) -> Result<Metadata> {
        self.cached.fetch(|| self.assume_role()).await
    }

    async fn assume_role(&self) -> Result<AssumeRoleResponse> {
        let request = self.request()?;
        let source = self.source_credentials.get_frozen_credentials().await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(role_arn = %self.role_arn, "calling AssumeRole");

        with_client(self.client_creator.as_ref(), Some(source), |client| async move {
            client.assume_role(request).await
        })
        .await
    }

    fn request(&self) -> Result<AssumeRoleRequest> {
        let args = &self.extra_args;
        let token_code = match (&args.serial_number, &self.mfa_prompter) {
            (Some(serial), Some(prompter)) => Some(prompter(serial)?),
            (Some(_), None) => {
                return Err(Error::invalid_config(
                    "role requires an MFA token but no MFA prompter is configured",
                ));
            }
            (None, _) => None,
        };
        Ok(AssumeRoleRequest {
            role_arn: self.role_arn.clone(),
            role_session_name: args
                .role_session_name
                .clone()
                .unwrap_or_else(|| generated_session_name(self.cached.time_source.now())),
            external_id: args.external_id.clone(),
            serial_number: args.serial_number.clone(),
            token_code,
            duration_seconds: args.duration_seconds,
            policy: args.policy.clone(),
        })
    }
}

impl fmt::Debug for AssumeRoleCredentialFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumeRoleCredentialFetcher")
            .field("role_arn", &self.role_arn)
            .field("extra_args", &self.extra_args)
            .field("cache_key", &self.cached.cache_key)
            .finish()
    }
}

/// Fetches role credentials with `AssumeRoleWithWebIdentity`.
///
/// No source credentials are involved; the token is loaded on every call and
/// never takes part in the cache key.
pub struct AssumeRoleWithWebIdentityCredentialFetcher {
    client_creator: SharedClientCreator,
    token_loader: SharedTokenLoader,
    role_arn: String,
    extra_args: AssumeRoleParams,
    cached: CachedFetch,
}

impl AssumeRoleWithWebIdentityCredentialFetcher {
    pub fn new(
        client_creator: SharedClientCreator,
        token_loader: impl WebIdentityTokenLoader + 'static,
        role_arn: impl Into<String>,
    ) -> Self {
        Self::with_shared_loader(client_creator, Arc::new(token_loader), role_arn)
    }

    pub fn with_shared_loader(
        client_creator: SharedClientCreator,
        token_loader: SharedTokenLoader,
        role_arn: impl Into<String>,
    ) -> Self {
        let role_arn = role_arn.into();
        let extra_args = AssumeRoleParams::default();
        Self {
            client_creator,
            token_loader,
            cached: CachedFetch {
                cache: Arc::new(InMemoryCache::new()),
                cache_key: cache_key(&role_arn, &extra_args),
                time_source: time_source::system(),
            },
            role_arn,
            extra_args,
        }
    }

    /// Only `role_session_name`, `duration_seconds` and `policy` apply here.
    pub fn with_extra_args(mut self, extra_args: AssumeRoleParams) -> Self {
        let extra_args = AssumeRoleParams {
            external_id: None,
            serial_number: None,
            ..extra_args
        };
        self.cached.cache_key = cache_key(&self.role_arn, &extra_args);
        self.extra_args = extra_args;
        self
    }

    pub fn with_cache(mut self, cache: SharedCache) -> Self {
        self.cached.cache = cache;
        self
    }

    pub fn with_time_source(mut self, time_source: SharedTimeSource) -> Self {
        self.cached.time_source = time_source;
        self
    }

    pub fn cache_key(&self) -> &str {
        &self.cached.cache_key
    }

    pub fn role_arn(&self) -> &str {
        &self.role_arn
    }

    /// Returns `{access_key, secret_key, token, expiry_time}` for the role.
    pub async fn fetch_credentials(&self) -> Result<Metadata> {
        self.cached.fetch(|| self.assume_role()).await
    }

    async fn assume_role(&self) -> Result<AssumeRoleResponse> {
        let web_identity_token = self.token_loader.load_token().await?;
        let request = AssumeRoleWithWebIdentityRequest {
            role_arn: self.role_arn.clone(),
            role_session_name: self
                .extra_args
                .role_session_name
                .clone()
                .unwrap_or_else(|| generated_session_name(self.cached.time_source.now())),
            web_identity_token,
            duration_seconds: self.extra_args.duration_seconds,
            policy: self.extra_args.policy.clone(),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(role_arn = %self.role_arn, "calling AssumeRoleWithWebIdentity");

        with_client(self.client_creator.as_ref(), None, |client| async move {
            client.assume_role_with_web_identity(request).await
        })
        .await
    }
}

impl fmt::Debug for AssumeRoleWithWebIdentityCredentialFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumeRoleWithWebIdentityCredentialFetcher")
            .field("role_arn", &self.role_arn)
            .field("extra_args", &self.extra_args)
            .field("cache_key", &self.cached.cache_key)
            .finish()
    }
}
