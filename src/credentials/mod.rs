//! Credential values and the handle providers return.

use std::{collections::BTreeMap, fmt};

use crate::{
    error::Result,
    util::{redact::redact_opt, redact::redact_value, text::normalize_key},
};

pub mod refreshable;

pub use refreshable::{
    ADVISORY_REFRESH_TIMEOUT, DeferredRefreshableCredentials, MANDATORY_REFRESH_TIMEOUT, Refresh,
    RefreshFuture, RefreshableCredentials, SharedRefresh,
};

/// Raw credential mapping exchanged with refresh callbacks and fetchers.
///
/// Recognised keys are `access_key`, `secret_key`, `token` and `expiry_time`
/// (RFC 3339). Any other key is carried along and ignored.
pub type Metadata = BTreeMap<String, String>;

/// Method tag for credentials constructed directly by the caller.
pub const EXPLICIT_METHOD: &str = "explicit";

/// A point-in-time, read-only copy of a credential set.
#[derive(Clone, PartialEq, Eq)]
pub struct FrozenCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub token: Option<String>,
}

impl fmt::Debug for FrozenCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrozenCredentials")
            .field("access_key", &redact_value(&self.access_key))
            .field("secret_key", &"<redacted>")
            .field("token", &redact_opt(&self.token))
            .finish()
    }
}

/// Static access key, secret key and optional session token.
///
/// Keys are accepted as text or bytes and stored as one normalized UTF-8 form.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key: String,
    secret_key: String,
    token: Option<String>,
    method: String,
}

impl Credentials {
    pub fn new(access_key: impl AsRef<[u8]>, secret_key: impl AsRef<[u8]>) -> Self {
        Self {
            access_key: normalize_key(access_key),
            secret_key: normalize_key(secret_key),
            token: None,
            method: EXPLICIT_METHOD.to_string(),
        }
    }

    pub fn with_token(mut self, token: impl AsRef<[u8]>) -> Self {
        self.token = Some(normalize_key(token));
        self
    }

    /// Tags the credentials with the provider method that produced them.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn get_frozen_credentials(&self) -> FrozenCredentials {
        FrozenCredentials {
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            token: self.token.clone(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &redact_value(&self.access_key))
            .field("secret_key", &"<redacted>")
            .field("token", &redact_opt(&self.token))
            .field("method", &self.method)
            .finish()
    }
}

/// Credentials as returned by a provider or resolver.
#[derive(Clone, Debug)]
pub enum ProvidedCredentials {
    Static(Credentials),
    Refreshable(RefreshableCredentials),
}

impl ProvidedCredentials {
    /// Returns the tag of the provider that produced these credentials.
    pub fn method(&self) -> &str {
        match self {
            Self::Static(creds) => creds.method(),
            Self::Refreshable(creds) => creds.method(),
        }
    }

    /// Returns a snapshot, refreshing first when the credentials are near expiry.
    pub async fn get_frozen_credentials(&self) -> Result<FrozenCredentials> {
        match self {
            Self::Static(creds) => Ok(creds.get_frozen_credentials()),
            Self::Refreshable(creds) => creds.get_frozen_credentials().await,
        }
    }

    pub fn as_static(&self) -> Option<&Credentials> {
        match self {
            Self::Static(creds) => Some(creds),
            Self::Refreshable(_) => None,
        }
    }

    pub fn as_refreshable(&self) -> Option<&RefreshableCredentials> {
        match self {
            Self::Static(_) => None,
            Self::Refreshable(creds) => Some(creds),
        }
    }

    /// True when both handles refer to the same credential state.
    pub fn same_source(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Static(a), Self::Static(b)) => a == b,
            (Self::Refreshable(a), Self::Refreshable(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<Credentials> for ProvidedCredentials {
    fn from(value: Credentials) -> Self {
        Self::Static(value)
    }
}

impl From<RefreshableCredentials> for ProvidedCredentials {
    fn from(value: RefreshableCredentials) -> Self {
        Self::Refreshable(value)
    }
}

impl From<DeferredRefreshableCredentials> for ProvidedCredentials {
    fn from(value: DeferredRefreshableCredentials) -> Self {
        Self::Refreshable(value.into_inner())
    }
}
