//! Async credential resolution for AWS-style provider chains.
//!
//! A [`CredentialResolver`] walks an ordered list of providers and returns the
//! first credentials found. Role-based providers return deferred credentials
//! that call STS on first use and refresh themselves before expiry; concurrent
//! callers share a single refresh.
//!
//! ## Quick start
//!
//! ```no_run
//! # async fn demo() -> Result<(), credchain::Error> {
//! use credchain::{ChainConfig, create_credential_resolver};
//!
//! let resolver = create_credential_resolver(&ChainConfig::default())?;
//! if let Some(creds) = resolver.load_credentials().await? {
//!     let frozen = creds.get_frozen_credentials().await?;
//!     println!("using {} credentials ({})", creds.method(), frozen.access_key);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Role sessions
//!
//! STS itself is not bundled. Implement [`ClientCreator`] and [`StsClient`]
//! over the client of your choice and pass the creator in [`ChainConfig`].
//! Assumed-role responses are cached under a stable digest of the request
//! (see [`fetcher::cache_key`]); [`JsonFileCache`] shares them with other
//! tools through `~/.aws/boto/cache`.

#[cfg(all(
    feature = "rustls",
    feature = "native-tls",
    not(feature = "allow-both-tls")
))]
compile_error!("Enable only one of: rustls, native-tls.");

/// Assume-role response caches.
pub mod cache;
/// Profile configuration supplied by the caller.
pub mod config;
/// Credential values, refreshable credentials and snapshots.
pub mod credentials;
/// Injected environment.
pub mod env;
/// STS exchanges and their cache keys.
pub mod fetcher;
/// Instance and container metadata collaborators.
pub mod metadata;
/// Credential providers.
pub mod providers;
/// Provider chains.
pub mod resolver;
/// Clocks.
pub mod time_source;

mod error;
mod util;

pub use cache::{CredentialCache, InMemoryCache, JsonFileCache, SharedCache};
pub use config::{Config, ConfigLoader, Profile, SharedConfigLoader};
pub use credentials::{
    Credentials, DeferredRefreshableCredentials, FrozenCredentials, Metadata, ProvidedCredentials,
    RefreshableCredentials,
};
pub use env::Env;
pub use error::{Error, Result};
pub use fetcher::{
    AssumeRoleCredentialFetcher, AssumeRoleParams, AssumeRoleResponse,
    AssumeRoleWithWebIdentityCredentialFetcher, ClientCreator, StsClient,
};
pub use providers::{CanonicalNameCredentialSourcer, CredentialProvider, ProvideCredentials};
pub use resolver::{ChainConfig, CredentialResolver, create_credential_resolver};
pub use time_source::{ManualTimeSource, SharedTimeSource, SystemTimeSource, TimeSource};
