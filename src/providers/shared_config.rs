use crate::{
    config::SharedConfigLoader,
    credentials::{Credentials, ProvidedCredentials},
    error::{Error, Result},
};

/// Static keys stored in a named profile.
#[derive(Clone, Debug)]
pub struct SharedConfigProvider {
    config_loader: SharedConfigLoader,
    profile_name: String,
}

impl SharedConfigProvider {
    pub const METHOD: &'static str = "config-file";
    pub const CANONICAL_NAME: &'static str = "SharedConfig";

    pub fn new(config_loader: SharedConfigLoader, profile_name: impl Into<String>) -> Self {
        Self {
            config_loader,
            profile_name: profile_name.into(),
        }
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub fn load(&self) -> Result<Option<ProvidedCredentials>> {
        let config = self.config_loader.load_config()?;
        let Some(profile) = config.profile(&self.profile_name) else {
            return Ok(None);
        };

        match (
            profile.get("aws_access_key_id"),
            profile.get("aws_secret_access_key"),
        ) {
            (None, None) => Ok(None),
            (Some(_), None) => Err(Error::partial_credentials(
                Self::METHOD,
                "aws_secret_access_key",
            )),
            (None, Some(_)) => Err(Error::partial_credentials(Self::METHOD, "aws_access_key_id")),
            (Some(access_key), Some(secret_key)) => {
                let mut creds = Credentials::new(access_key, secret_key).with_method(Self::METHOD);
                if let Some(token) = profile.get("aws_session_token") {
                    creds = creds.with_token(token);
                }
                Ok(Some(creds.into()))
            }
        }
    }
}
