//! Credential providers: one variant per credential source.
//!
//! Every provider answers `load()` with `Ok(Some(..))` when it supplied
//! credentials, `Ok(None)` when its source does not apply, and `Err(..)` only
//! for genuine failures.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::{credentials::ProvidedCredentials, error::Result};

mod assume_role;
mod container;
mod env;
mod explicit;
mod instance_metadata;
mod shared_config;
mod sourcer;
mod web_identity;

pub use assume_role::AssumeRoleProvider;
pub use container::{
    AUTH_TOKEN_ENV, ContainerProvider, FULL_URI_ENV, RELATIVE_URI_ENV,
};
pub use env::EnvProvider;
pub use explicit::StaticProvider;
pub use instance_metadata::InstanceMetadataProvider;
pub use shared_config::SharedConfigProvider;
pub use sourcer::CanonicalNameCredentialSourcer;
pub use web_identity::WebIdentityProvider;

/// A credential source defined outside this crate.
///
/// Plugged into a chain through [`CredentialProvider::Custom`].
#[async_trait]
pub trait ProvideCredentials: Send + Sync {
    fn method(&self) -> &str;

    fn canonical_name(&self) -> &str;

    async fn load(&self) -> Result<Option<ProvidedCredentials>>;
}

/// One link of a credential chain.
#[non_exhaustive]
#[derive(Clone)]
pub enum CredentialProvider {
    Static(StaticProvider),
    Env(EnvProvider),
    SharedConfig(SharedConfigProvider),
    InstanceMetadata(InstanceMetadataProvider),
    Container(ContainerProvider),
    AssumeRole(AssumeRoleProvider),
    WebIdentity(WebIdentityProvider),
    Custom(Arc<dyn ProvideCredentials>),
}

impl CredentialProvider {
    pub fn custom(provider: impl ProvideCredentials + 'static) -> Self {
        Self::Custom(Arc::new(provider))
    }

    /// Machine identifier, also the tag on credentials this provider returns.
    pub fn method(&self) -> &str {
        match self {
            Self::Static(_) => StaticProvider::METHOD,
            Self::Env(_) => EnvProvider::METHOD,
            Self::SharedConfig(_) => SharedConfigProvider::METHOD,
            Self::InstanceMetadata(_) => InstanceMetadataProvider::METHOD,
            Self::Container(_) => ContainerProvider::METHOD,
            Self::AssumeRole(_) => AssumeRoleProvider::METHOD,
            Self::WebIdentity(_) => WebIdentityProvider::METHOD,
            Self::Custom(p) => p.method(),
        }
    }

    /// Human identifier, as used by `credential_source`.
    pub fn canonical_name(&self) -> &str {
        match self {
            Self::Static(_) => StaticProvider::CANONICAL_NAME,
            Self::Env(_) => EnvProvider::CANONICAL_NAME,
            Self::SharedConfig(_) => SharedConfigProvider::CANONICAL_NAME,
            Self::InstanceMetadata(_) => InstanceMetadataProvider::CANONICAL_NAME,
            Self::Container(_) => ContainerProvider::CANONICAL_NAME,
            Self::AssumeRole(_) => AssumeRoleProvider::CANONICAL_NAME,
            Self::WebIdentity(_) => WebIdentityProvider::CANONICAL_NAME,
            Self::Custom(p) => p.canonical_name(),
        }
    }

    /// Attempts to load credentials from this source.
    pub fn load(&self) -> BoxFuture<'_, Result<Option<ProvidedCredentials>>> {
        Box::pin(async move {
            match self {
                Self::Static(p) => Ok(p.load()),
                Self::Env(p) => p.load(),
                Self::SharedConfig(p) => p.load(),
                Self::InstanceMetadata(p) => p.load().await,
                Self::Container(p) => p.load().await,
                Self::AssumeRole(p) => p.load().await,
                Self::WebIdentity(p) => p.load(),
                Self::Custom(p) => p.load().await,
            }
        })
    }
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("method", &self.method())
            .field("canonical_name", &self.canonical_name())
            .finish()
    }
}

impl From<StaticProvider> for CredentialProvider {
    fn from(value: StaticProvider) -> Self {
        Self::Static(value)
    }
}

impl From<EnvProvider> for CredentialProvider {
    fn from(value: EnvProvider) -> Self {
        Self::Env(value)
    }
}

impl From<SharedConfigProvider> for CredentialProvider {
    fn from(value: SharedConfigProvider) -> Self {
        Self::SharedConfig(value)
    }
}

impl From<InstanceMetadataProvider> for CredentialProvider {
    fn from(value: InstanceMetadataProvider) -> Self {
        Self::InstanceMetadata(value)
    }
}

impl From<ContainerProvider> for CredentialProvider {
    fn from(value: ContainerProvider) -> Self {
        Self::Container(value)
    }
}

impl From<AssumeRoleProvider> for CredentialProvider {
    fn from(value: AssumeRoleProvider) -> Self {
        Self::AssumeRole(value)
    }
}

impl From<WebIdentityProvider> for CredentialProvider {
    fn from(value: WebIdentityProvider) -> Self {
        Self::WebIdentity(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Config, SharedConfigLoader},
        credentials::Credentials,
        env::Env,
    };

    #[test]
    fn variants_report_their_tags() {
        let cases: Vec<(CredentialProvider, &str, &str)> = vec![
            (
                StaticProvider::new(Credentials::new("a", "b")).into(),
                "explicit",
                "Explicit",
            ),
            (
                EnvProvider::new(Env::from_map::<&str, &str>([])).into(),
                "env",
                "Environment",
            ),
            (
                SharedConfigProvider::new(SharedConfigLoader::new(Config::new()), "default")
                    .into(),
                "config-file",
                "SharedConfig",
            ),
        ];
        for (provider, method, canonical) in cases {
            assert_eq!(provider.method(), method);
            assert_eq!(provider.canonical_name(), canonical);
        }
    }
}
