use std::{fmt, sync::Arc};

use crate::{
    credentials::{Credentials, Metadata, ProvidedCredentials, RefreshableCredentials},
    env::Env,
    error::{Error, Result},
    time_source::{self, SharedTimeSource},
};

const ACCESS_KEY: &str = "AWS_ACCESS_KEY_ID";
const SECRET_KEY: &str = "AWS_SECRET_ACCESS_KEY";
const TOKEN: &str = "AWS_SESSION_TOKEN";
const LEGACY_TOKEN: &str = "AWS_SECURITY_TOKEN";
const EXPIRY_TIME: &str = "AWS_CREDENTIAL_EXPIRATION";

/// Keys from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.
///
/// When `AWS_CREDENTIAL_EXPIRATION` is set the result is refreshable and each
/// refresh re-reads the environment.
#[derive(Clone)]
pub struct EnvProvider {
    env: Env,
    time_source: SharedTimeSource,
}

impl EnvProvider {
    pub const METHOD: &'static str = "env";
    pub const CANONICAL_NAME: &'static str = "Environment";

    pub fn new(env: Env) -> Self {
        Self {
            env,
            time_source: time_source::system(),
        }
    }

    pub fn with_time_source(mut self, time_source: SharedTimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn load(&self) -> Result<Option<ProvidedCredentials>> {
        let Some(metadata) = read_env(&self.env, false)? else {
            return Ok(None);
        };

        if !metadata.contains_key("expiry_time") {
            let mut creds = Credentials::new(&metadata["access_key"], &metadata["secret_key"])
                .with_method(Self::METHOD);
            if let Some(token) = metadata.get("token") {
                creds = creds.with_token(token);
            }
            return Ok(Some(creds.into()));
        }

        let env = self.env.clone();
        let refresh = move || {
            let env = env.clone();
            async move { read_env(&env, true) }
        };
        RefreshableCredentials::create_from_metadata(
            metadata,
            Arc::new(refresh),
            Self::METHOD,
            self.time_source.clone(),
        )
        .map(|creds| Some(creds.into()))
    }
}

impl fmt::Debug for EnvProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvProvider").field("env", &self.env).finish()
    }
}

fn read_env(env: &Env, require_expiry: bool) -> Result<Option<Metadata>> {
    let access_key = env.get(ACCESS_KEY);
    let secret_key = env.get(SECRET_KEY);
    let (access_key, secret_key) = match (access_key, secret_key) {
        (None, None) => return Ok(None),
        (Some(_), None) => {
            return Err(Error::partial_credentials(EnvProvider::METHOD, SECRET_KEY));
        }
        (None, Some(_)) => {
            return Err(Error::partial_credentials(EnvProvider::METHOD, ACCESS_KEY));
        }
        (Some(a), Some(s)) => (a, s),
    };

    let mut metadata = Metadata::from([
        ("access_key".to_string(), access_key),
        ("secret_key".to_string(), secret_key),
    ]);
    if let Some(token) = env.get(TOKEN).or_else(|| env.get(LEGACY_TOKEN)) {
        metadata.insert("token".to_string(), token);
    }
    match env.get(EXPIRY_TIME) {
        Some(expiry) => {
            metadata.insert("expiry_time".to_string(), expiry);
            metadata.entry("token".to_string()).or_default();
        }
        None if require_expiry => {
            return Err(Error::partial_credentials(EnvProvider::METHOD, EXPIRY_TIME));
        }
        None => {}
    }
    Ok(Some(metadata))
}
