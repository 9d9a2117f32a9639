//! Ordered provider chains.

use std::{fmt, sync::Arc};

use crate::{
    cache::{InMemoryCache, SharedCache},
    config::{Config, SharedConfigLoader},
    credentials::{Credentials, ProvidedCredentials},
    env::Env,
    error::{Error, Result},
    fetcher::{MfaPrompter, SharedClientCreator},
    metadata::{ContainerFetcher, IamRoleFetcher},
    providers::{
        AssumeRoleProvider, CanonicalNameCredentialSourcer, ContainerProvider, CredentialProvider,
        EnvProvider, InstanceMetadataProvider, SharedConfigProvider, StaticProvider,
        WebIdentityProvider,
    },
    time_source::{self, SharedTimeSource},
};

/// Tries providers in order and returns the first credentials found.
#[derive(Clone, Debug, Default)]
pub struct CredentialResolver {
    providers: Vec<CredentialProvider>,
}

impl CredentialResolver {
    pub fn new(providers: Vec<CredentialProvider>) -> Self {
        Self { providers }
    }

    /// Returns the first provider's credentials, or `None` if no provider applies.
    ///
    /// Providers after the first hit are never called. Errors stop the chain.
    pub async fn load_credentials(&self) -> Result<Option<ProvidedCredentials>> {
        for provider in &self.providers {
            #[cfg(feature = "tracing")]
            tracing::debug!(method = provider.method(), "looking for credentials");

            if let Some(creds) = provider.load().await? {
                #[cfg(feature = "tracing")]
                tracing::info!(method = provider.method(), "found credentials");

                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "credchain_resolved_total",
                    "method" => provider.method().to_string(),
                )
                .increment(1);

                return Ok(Some(creds));
            }
        }
        Ok(None)
    }

    pub fn providers(&self) -> &[CredentialProvider] {
        &self.providers
    }

    pub fn get_provider(&self, method: &str) -> Option<&CredentialProvider> {
        self.providers.iter().find(|p| p.method() == method)
    }

    /// Inserts `provider` immediately before the provider tagged `method`.
    pub fn insert_before(&mut self, method: &str, provider: CredentialProvider) -> Result<()> {
        let index = self.position(method)?;
        self.providers.insert(index, provider);
        Ok(())
    }

    /// Inserts `provider` immediately after the provider tagged `method`.
    pub fn insert_after(&mut self, method: &str, provider: CredentialProvider) -> Result<()> {
        let index = self.position(method)?;
        self.providers.insert(index + 1, provider);
        Ok(())
    }

    /// Removes the provider tagged `method`, if present.
    pub fn remove(&mut self, method: &str) -> Option<CredentialProvider> {
        let index = self.providers.iter().position(|p| p.method() == method)?;
        Some(self.providers.remove(index))
    }

    fn position(&self, method: &str) -> Result<usize> {
        self.providers
            .iter()
            .position(|p| p.method() == method)
            .ok_or_else(|| Error::invalid_config(format!("no provider with method {method}")))
    }
}

/// Inputs of the default chain.
///
/// Collaborators left unset drop the providers that need them, except the
/// metadata fetchers, which fall back to the HTTP clients when the `http`
/// feature is enabled.
#[derive(Clone)]
pub struct ChainConfig {
    pub env: Env,
    pub config_loader: SharedConfigLoader,
    /// Explicit profile. Without one, `AWS_PROFILE`, then `AWS_DEFAULT_PROFILE`,
    /// then `default` is used, and environment keys take precedence.
    pub profile_name: Option<String>,
    /// Static keys placed ahead of every other provider.
    pub explicit: Option<Credentials>,
    pub client_creator: Option<SharedClientCreator>,
    pub cache: SharedCache,
    pub mfa_prompter: Option<MfaPrompter>,
    pub iam_role_fetcher: Option<Arc<dyn IamRoleFetcher>>,
    pub container_fetcher: Option<Arc<dyn ContainerFetcher>>,
    pub time_source: SharedTimeSource,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            env: Env::process(),
            config_loader: SharedConfigLoader::new(Config::new()),
            profile_name: None,
            explicit: None,
            client_creator: None,
            cache: Arc::new(InMemoryCache::new()),
            mfa_prompter: None,
            iam_role_fetcher: None,
            container_fetcher: None,
            time_source: time_source::system(),
        }
    }
}

impl fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainConfig")
            .field("env", &self.env)
            .field("config_loader", &self.config_loader)
            .field("profile_name", &self.profile_name)
            .field("explicit", &self.explicit)
            .finish_non_exhaustive()
    }
}

impl ChainConfig {
    fn resolved_profile_name(&self) -> String {
        self.profile_name
            .clone()
            .or_else(|| self.env.get("AWS_PROFILE"))
            .or_else(|| self.env.get("AWS_DEFAULT_PROFILE"))
            .unwrap_or_else(|| "default".to_string())
    }

    fn metadata_disabled(&self) -> bool {
        self.env
            .get("AWS_EC2_METADATA_DISABLED")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    fn iam_role_fetcher(&self) -> Result<Option<Arc<dyn IamRoleFetcher>>> {
        if let Some(fetcher) = &self.iam_role_fetcher {
            return Ok(Some(fetcher.clone()));
        }
        #[cfg(feature = "http")]
        {
            Ok(Some(Arc::new(crate::metadata::InstanceMetadataFetcher::new()?)))
        }
        #[cfg(not(feature = "http"))]
        {
            Ok(None)
        }
    }

    fn container_fetcher(&self) -> Result<Option<Arc<dyn ContainerFetcher>>> {
        if let Some(fetcher) = &self.container_fetcher {
            return Ok(Some(fetcher.clone()));
        }
        #[cfg(feature = "http")]
        {
            Ok(Some(Arc::new(crate::metadata::ContainerMetadataFetcher::new()?)))
        }
        #[cfg(not(feature = "http"))]
        {
            Ok(None)
        }
    }
}

/// Builds the default chain:
/// explicit keys, environment, assume role, web identity, shared config,
/// container, instance metadata.
pub fn create_credential_resolver(config: &ChainConfig) -> Result<CredentialResolver> {
    let profile_name = config.resolved_profile_name();
    let time_source = config.time_source.clone();

    let env_provider: CredentialProvider = EnvProvider::new(config.env.clone())
        .with_time_source(time_source.clone())
        .into();
    let container_provider: Option<CredentialProvider> =
        config.container_fetcher()?.map(|fetcher| {
            ContainerProvider::with_shared_fetcher(config.env.clone(), fetcher)
                .with_time_source(time_source.clone())
                .into()
        });
    let instance_metadata_provider: Option<CredentialProvider> = if config.metadata_disabled() {
        None
    } else {
        config.iam_role_fetcher()?.map(|fetcher| {
            InstanceMetadataProvider::with_shared_fetcher(fetcher)
                .with_time_source(time_source.clone())
                .into()
        })
    };

    let mut providers = Vec::new();
    if let Some(explicit) = &config.explicit {
        providers.push(StaticProvider::new(explicit.clone()).into());
    }
    if config.profile_name.is_none() {
        providers.push(env_provider.clone());
    }
    if let Some(client_creator) = &config.client_creator {
        let mut sources = vec![env_provider];
        sources.extend(container_provider.clone());
        sources.extend(instance_metadata_provider.clone());

        let mut assume_role = AssumeRoleProvider::new(
            config.config_loader.clone(),
            client_creator.clone(),
            config.cache.clone(),
            &profile_name,
        )
        .with_credential_sourcer(CanonicalNameCredentialSourcer::new(sources))
        .with_time_source(time_source.clone());
        if let Some(prompter) = &config.mfa_prompter {
            assume_role = assume_role.with_mfa_prompter(prompter.clone());
        }
        providers.push(assume_role.into());
        providers.push(
            WebIdentityProvider::new(
                config.config_loader.clone(),
                client_creator.clone(),
                config.cache.clone(),
                &profile_name,
                config.env.clone(),
            )
            .with_time_source(time_source.clone())
            .into(),
        );
    }
    providers.push(SharedConfigProvider::new(config.config_loader.clone(), &profile_name).into());
    providers.extend(container_provider);
    providers.extend(instance_metadata_provider);

    Ok(CredentialResolver::new(providers))
}
