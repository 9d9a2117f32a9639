use std::{fmt, sync::Arc};

use crate::{
    cache::SharedCache,
    config::{Config, Profile, SharedConfigLoader},
    credentials::{Credentials, ProvidedCredentials, RefreshableCredentials},
    error::{Error, Result},
    fetcher::{AssumeRoleCredentialFetcher, AssumeRoleParams, MfaPrompter, SharedClientCreator},
    providers::{
        CanonicalNameCredentialSourcer,
        web_identity::{WebIdentitySettings, web_identity_credentials},
    },
    time_source::{self, SharedTimeSource},
};

/// Role credentials for a profile with `role_arn`.
///
/// The profile's source is either another profile (`source_profile`, followed
/// through any number of role hops) or a provider named by
/// `credential_source`. Every hop yields deferred credentials, so nothing is
/// exchanged until the credentials are first used.
#[derive(Clone)]
pub struct AssumeRoleProvider {
    config_loader: SharedConfigLoader,
    client_creator: SharedClientCreator,
    cache: SharedCache,
    profile_name: String,
    credential_sourcer: Option<CanonicalNameCredentialSourcer>,
    mfa_prompter: Option<MfaPrompter>,
    time_source: SharedTimeSource,
}

#[derive(Debug)]
struct RoleHop {
    role_arn: String,
    params: AssumeRoleParams,
}

enum RoleSource {
    Static(Credentials),
    WebIdentity(WebIdentitySettings),
    CredentialSource { profile: String, name: String },
}

/// Role hops ordered from the requested profile down to the source.
struct RoleChain {
    roles: Vec<RoleHop>,
    source: RoleSource,
}

impl AssumeRoleProvider {
    pub const METHOD: &'static str = "assume-role";
    pub const CANONICAL_NAME: &'static str = "AssumeRole";

    pub fn new(
        config_loader: SharedConfigLoader,
        client_creator: SharedClientCreator,
        cache: SharedCache,
        profile_name: impl Into<String>,
    ) -> Self {
        Self {
            config_loader,
            client_creator,
            cache,
            profile_name: profile_name.into(),
            credential_sourcer: None,
            mfa_prompter: None,
            time_source: time_source::system(),
        }
    }

    pub fn with_credential_sourcer(mut self, sourcer: CanonicalNameCredentialSourcer) -> Self {
        self.credential_sourcer = Some(sourcer);
        self
    }

    pub fn with_mfa_prompter(mut self, prompter: MfaPrompter) -> Self {
        self.mfa_prompter = Some(prompter);
        self
    }

    pub fn with_time_source(mut self, time_source: SharedTimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub async fn load(&self) -> Result<Option<ProvidedCredentials>> {
        let config = self.config_loader.load_config()?;
        match config.profile(&self.profile_name) {
            Some(profile) if is_role_profile(profile) => {}
            _ => return Ok(None),
        }

        let chain = resolve_chain(&config, &self.profile_name)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            profile = %self.profile_name,
            hops = chain.roles.len(),
            "resolved role chain"
        );

        let mut credentials = self.source_credentials(chain.source).await?;
        for hop in chain.roles.into_iter().rev() {
            credentials = self.assume_role(hop, credentials);
        }
        Ok(Some(credentials))
    }

    async fn source_credentials(&self, source: RoleSource) -> Result<ProvidedCredentials> {
        match source {
            RoleSource::Static(creds) => Ok(creds.into()),
            RoleSource::WebIdentity(settings) => Ok(web_identity_credentials(
                &settings,
                self.client_creator.clone(),
                self.cache.clone(),
                self.time_source.clone(),
            )),
            RoleSource::CredentialSource { profile, name } => {
                let sourcer = self.credential_sourcer.as_ref().ok_or_else(|| {
                    Error::invalid_config(format!(
                        "profile {profile} sets credential_source but no sourcer is configured"
                    ))
                })?;
                if !sourcer.is_supported(&name) {
                    return Err(Error::invalid_config(format!(
                        "credential_source {name} in profile {profile} is not supported"
                    )));
                }
                sourcer.source_credentials(&name).await?.ok_or_else(|| {
                    Error::credential_retrieval(
                        Self::METHOD,
                        format!(
                            "no credentials found in credential_source {name} referenced in profile {profile}"
                        ),
                    )
                })
            }
        }
    }

    fn assume_role(&self, hop: RoleHop, source: ProvidedCredentials) -> ProvidedCredentials {
        let mut fetcher =
            AssumeRoleCredentialFetcher::new(self.client_creator.clone(), source, hop.role_arn)
                .with_extra_args(hop.params)
                .with_cache(self.cache.clone())
                .with_time_source(self.time_source.clone());
        if let Some(prompter) = &self.mfa_prompter {
            fetcher = fetcher.with_mfa_prompter(prompter.clone());
        }

        let fetcher = Arc::new(fetcher);
        let refresh = move || {
            let fetcher = fetcher.clone();
            async move { fetcher.fetch_credentials().await.map(Some) }
        };
        RefreshableCredentials::builder(refresh)
            .method(Self::METHOD)
            .shared_time_source(self.time_source.clone())
            .build_deferred()
            .into()
    }
}

impl fmt::Debug for AssumeRoleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumeRoleProvider")
            .field("profile_name", &self.profile_name)
            .field("credential_sourcer", &self.credential_sourcer)
            .finish_non_exhaustive()
    }
}

fn is_role_profile(profile: &Profile) -> bool {
    profile.contains("role_arn") && !profile.contains("web_identity_token_file")
}

fn static_credentials(profile: &Profile) -> Credentials {
    let mut creds = Credentials::new(
        profile.get("aws_access_key_id").unwrap_or_default(),
        profile.get("aws_secret_access_key").unwrap_or_default(),
    );
    if let Some(token) = profile.get("aws_session_token") {
        creds = creds.with_token(token);
    }
    creds
}

impl RoleHop {
    fn from_profile(profile_name: &str, profile: &Profile) -> Result<Self> {
        let role_arn = profile.get("role_arn").ok_or_else(|| {
            Error::invalid_config(format!("profile {profile_name} has no role_arn"))
        })?;
        let duration_seconds = profile
            .get("duration_seconds")
            .map(|value| {
                value.parse::<u32>().map_err(|_| {
                    Error::invalid_config(format!(
                        "duration_seconds {value:?} in profile {profile_name} is not a number"
                    ))
                })
            })
            .transpose()?;
        let text = |key: &str| profile.get(key).map(str::to_string);
        Ok(Self {
            role_arn: role_arn.to_string(),
            params: AssumeRoleParams {
                role_session_name: text("role_session_name"),
                external_id: text("external_id"),
                serial_number: text("mfa_serial"),
                duration_seconds,
                ..AssumeRoleParams::default()
            },
        })
    }
}

/// Follows `source_profile` links from `profile_name` until a profile that
/// supplies credentials itself.
fn resolve_chain(config: &Config, profile_name: &str) -> Result<RoleChain> {
    let mut visited = vec![profile_name.to_string()];
    let mut roles = Vec::new();
    let mut current = profile_name.to_string();

    loop {
        let profile = config
            .profile(&current)
            .ok_or_else(|| Error::ProfileNotFound {
                profile: current.clone(),
            })?;
        roles.push(RoleHop::from_profile(&current, profile)?);

        let source_name = match (
            profile.get("source_profile"),
            profile.get("credential_source"),
        ) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid_config(format!(
                    "profile {current} sets both source_profile and credential_source"
                )));
            }
            (None, None) => {
                return Err(Error::invalid_config(format!(
                    "profile {current} sets role_arn without source_profile or credential_source"
                )));
            }
            (None, Some(name)) => {
                return Ok(RoleChain {
                    roles,
                    source: RoleSource::CredentialSource {
                        name: name.to_string(),
                        profile: current,
                    },
                });
            }
            (Some(source_name), None) => source_name,
        };

        let source = config
            .profile(source_name)
            .ok_or_else(|| Error::ProfileNotFound {
                profile: source_name.to_string(),
            })?;

        if source_name == current && source.has_static_credentials() {
            return Ok(RoleChain {
                roles,
                source: RoleSource::Static(static_credentials(source)),
            });
        }
        if visited.iter().any(|v| v == source_name) {
            return Err(Error::ConfigCycle {
                profile: source_name.to_string(),
                visited,
            });
        }
        visited.push(source_name.to_string());

        if source.has_static_credentials() && !is_role_profile(source) {
            return Ok(RoleChain {
                roles,
                source: RoleSource::Static(static_credentials(source)),
            });
        }
        if let Some(settings) = WebIdentitySettings::from_profile(source_name, source)? {
            return Ok(RoleChain {
                roles,
                source: RoleSource::WebIdentity(settings),
            });
        }
        if !is_role_profile(source) {
            if let Some(missing) = source.missing_static_key() {
                return Err(Error::partial_credentials(AssumeRoleProvider::METHOD, missing));
            }
            return Err(Error::invalid_config(format!(
                "source_profile {source_name} referenced by {current} supplies no credentials"
            )));
        }
        current = source_name.to_string();
    }
}
