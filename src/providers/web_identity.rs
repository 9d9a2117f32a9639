use std::{fmt, sync::Arc};

use crate::{
    cache::SharedCache,
    config::{Profile, SharedConfigLoader},
    credentials::{ProvidedCredentials, RefreshableCredentials},
    env::Env,
    error::{Error, Result},
    fetcher::{
        AssumeRoleParams, AssumeRoleWithWebIdentityCredentialFetcher, FileWebIdentityTokenLoader,
        SharedClientCreator,
    },
    time_source::{self, SharedTimeSource},
};

const TOKEN_FILE_ENV: &str = "AWS_WEB_IDENTITY_TOKEN_FILE";
const ROLE_ARN_ENV: &str = "AWS_ROLE_ARN";
const ROLE_SESSION_NAME_ENV: &str = "AWS_ROLE_SESSION_NAME";

/// Exchanges an OIDC token file for role credentials.
///
/// Settings come from the environment first, then from the profile.
#[derive(Clone)]
pub struct WebIdentityProvider {
    config_loader: SharedConfigLoader,
    client_creator: SharedClientCreator,
    cache: SharedCache,
    profile_name: String,
    env: Env,
    time_source: SharedTimeSource,
}

impl WebIdentityProvider {
    pub const METHOD: &'static str = "assume-role-with-web-identity";
    pub const CANONICAL_NAME: &'static str = "AssumeRoleWithWebIdentity";

    pub fn new(
        config_loader: SharedConfigLoader,
        client_creator: SharedClientCreator,
        cache: SharedCache,
        profile_name: impl Into<String>,
        env: Env,
    ) -> Self {
        Self {
            config_loader,
            client_creator,
            cache,
            profile_name: profile_name.into(),
            env,
            time_source: time_source::system(),
        }
    }

    pub fn with_time_source(mut self, time_source: SharedTimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn load(&self) -> Result<Option<ProvidedCredentials>> {
        let config = self.config_loader.load_config()?;
        let profile = config.profile(&self.profile_name);
        let setting = |env_key: &str, profile_key: &str| {
            self.env
                .get(env_key)
                .or_else(|| profile.and_then(|p| p.get(profile_key)).map(str::to_string))
        };

        let Some(token_file) = setting(TOKEN_FILE_ENV, "web_identity_token_file") else {
            return Ok(None);
        };
        let Some(role_arn) = setting(ROLE_ARN_ENV, "role_arn") else {
            return Err(Error::invalid_config(format!(
                "web identity token file {token_file} is configured without a role_arn"
            )));
        };
        let session_name = setting(ROLE_SESSION_NAME_ENV, "role_session_name");

        Ok(Some(web_identity_credentials(
            &WebIdentitySettings {
                token_file,
                role_arn,
                session_name,
            },
            self.client_creator.clone(),
            self.cache.clone(),
            self.time_source.clone(),
        )))
    }
}

impl fmt::Debug for WebIdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebIdentityProvider")
            .field("profile_name", &self.profile_name)
            .finish_non_exhaustive()
    }
}

pub(super) struct WebIdentitySettings {
    pub(super) token_file: String,
    pub(super) role_arn: String,
    pub(super) session_name: Option<String>,
}

impl WebIdentitySettings {
    /// Settings of a profile used as a role source, if it names a token file.
    pub(super) fn from_profile(profile_name: &str, profile: &Profile) -> Result<Option<Self>> {
        let Some(token_file) = profile.get("web_identity_token_file") else {
            return Ok(None);
        };
        let role_arn = profile.get("role_arn").ok_or_else(|| {
            Error::invalid_config(format!(
                "profile {profile_name} has web_identity_token_file but no role_arn"
            ))
        })?;
        Ok(Some(Self {
            token_file: token_file.to_string(),
            role_arn: role_arn.to_string(),
            session_name: profile.get("role_session_name").map(str::to_string),
        }))
    }
}

/// Deferred credentials backed by an `AssumeRoleWithWebIdentity` fetcher.
pub(super) fn web_identity_credentials(
    settings: &WebIdentitySettings,
    client_creator: SharedClientCreator,
    cache: SharedCache,
    time_source: SharedTimeSource,
) -> ProvidedCredentials {
    let mut extra_args = AssumeRoleParams::default();
    extra_args.role_session_name = settings.session_name.clone();

    let fetcher = Arc::new(
        AssumeRoleWithWebIdentityCredentialFetcher::new(
            client_creator,
            FileWebIdentityTokenLoader::new(&settings.token_file),
            &settings.role_arn,
        )
        .with_extra_args(extra_args)
        .with_cache(cache)
        .with_time_source(time_source.clone()),
    );
    let refresh = move || {
        let fetcher = fetcher.clone();
        async move { fetcher.fetch_credentials().await.map(Some) }
    };
    RefreshableCredentials::builder(refresh)
        .method(WebIdentityProvider::METHOD)
        .shared_time_source(time_source)
        .build_deferred()
        .into()
}
