use std::{error::Error as StdError, fmt, sync::Arc};

/// Library result type.
pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;
type SharedSource = Arc<dyn StdError + Send + Sync + 'static>;

/// Error type for credential resolution, refresh, and exchange.
///
/// A provider that simply has nothing to offer returns `Ok(None)`; every variant
/// here is a genuine failure that the caller should see.
///
/// Cloning is cheap; wrapped sources are shared.
#[derive(Clone)]
#[non_exhaustive]
pub enum Error {
    /// Invalid provider or profile configuration.
    InvalidConfig { message: String },

    /// A credential source returned absent, empty, or incomplete data.
    CredentialRetrieval { provider: String, message: String },

    /// A source supplied only one half of a key pair.
    PartialCredentials { provider: String, cred_var: String },

    /// A `source_profile` chain revisits a profile.
    ConfigCycle {
        profile: String,
        visited: Vec<String>,
    },

    /// The named profile does not exist in the loaded configuration.
    ProfileNotFound { profile: String },

    /// A `credential_source` names a provider the sourcer does not know.
    UnknownCredentialSource { name: String },

    /// The injected STS client reported a failure.
    Client {
        message: String,
        source: Option<SharedSource>,
    },

    /// Transport-level failure (HTTP client, IO).
    Transport {
        message: String,
        source: Option<SharedSource>,
    },

    /// Response decode or parse failure.
    Decode {
        message: String,
        source: Option<SharedSource>,
    },
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { message } => f
                .debug_struct("InvalidConfig")
                .field("message", message)
                .finish(),
            Self::CredentialRetrieval { provider, message } => f
                .debug_struct("CredentialRetrieval")
                .field("provider", provider)
                .field("message", message)
                .finish(),
            Self::PartialCredentials { provider, cred_var } => f
                .debug_struct("PartialCredentials")
                .field("provider", provider)
                .field("cred_var", cred_var)
                .finish(),
            Self::ConfigCycle { profile, visited } => f
                .debug_struct("ConfigCycle")
                .field("profile", profile)
                .field("visited", visited)
                .finish(),
            Self::ProfileNotFound { profile } => f
                .debug_struct("ProfileNotFound")
                .field("profile", profile)
                .finish(),
            Self::UnknownCredentialSource { name } => f
                .debug_struct("UnknownCredentialSource")
                .field("name", name)
                .finish(),
            Self::Client { message, source } => f
                .debug_struct("Client")
                .field("message", message)
                .field("source", source)
                .finish(),
            Self::Transport { message, source } => f
                .debug_struct("Transport")
                .field("message", message)
                .field("source", source)
                .finish(),
            Self::Decode { message, source } => f
                .debug_struct("Decode")
                .field("message", message)
                .field("source", source)
                .finish(),
        }
    }
}

impl Error {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a credential retrieval error attributed to a provider method.
    pub fn credential_retrieval(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CredentialRetrieval {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a partial credentials error.
    pub fn partial_credentials(provider: impl Into<String>, cred_var: impl Into<String>) -> Self {
        Self::PartialCredentials {
            provider: provider.into(),
            cred_var: cred_var.into(),
        }
    }

    /// Creates a client error with optional source.
    pub fn client(
        message: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Self::Client {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a transport error with optional source.
    pub fn transport(
        message: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a decode error with optional source.
    pub fn decode(
        message: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Self::Decode {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Returns the provider method the error is attributed to, when known.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::CredentialRetrieval { provider, .. }
            | Self::PartialCredentials { provider, .. } => Some(provider),
            Self::InvalidConfig { .. }
            | Self::ConfigCycle { .. }
            | Self::ProfileNotFound { .. }
            | Self::UnknownCredentialSource { .. }
            | Self::Client { .. }
            | Self::Transport { .. }
            | Self::Decode { .. } => None,
        }
    }

    /// Returns true if repeating the same call may succeed.
    ///
    /// Nothing in this crate retries on its own; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Client { .. } | Self::Transport { .. } => true,
            Self::InvalidConfig { .. }
            | Self::CredentialRetrieval { .. }
            | Self::PartialCredentials { .. }
            | Self::ConfigCycle { .. }
            | Self::ProfileNotFound { .. }
            | Self::UnknownCredentialSource { .. }
            | Self::Decode { .. } => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { message } => write!(f, "invalid config: {message}"),
            Self::CredentialRetrieval { provider, message } => {
                write!(f, "error retrieving credentials from {provider}: {message}")
            }
            Self::PartialCredentials { provider, cred_var } => {
                write!(f, "partial credentials found in {provider}, missing: {cred_var}")
            }
            Self::ConfigCycle { profile, visited } => write!(
                f,
                "infinite loop in credential configuration: profile {profile} revisited after [{}]",
                visited.join(" -> ")
            ),
            Self::ProfileNotFound { profile } => write!(f, "profile not found: {profile}"),
            Self::UnknownCredentialSource { name } => {
                write!(f, "unknown credential source: {name}")
            }
            Self::Client { message, .. } => write!(f, "client error: {message}"),
            Self::Transport { message, .. } => write!(f, "transport error: {message}"),
            Self::Decode { message, .. } => write!(f, "decode error: {message}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Client { source, .. }
            | Self::Transport { source, .. }
            | Self::Decode { source, .. } => {
                source.as_deref().map(|e| e as &(dyn StdError + 'static))
            }
            Self::InvalidConfig { .. }
            | Self::CredentialRetrieval { .. }
            | Self::PartialCredentials { .. }
            | Self::ConfigCycle { .. }
            | Self::ProfileNotFound { .. }
            | Self::UnknownCredentialSource { .. } => None,
        }
    }
}
