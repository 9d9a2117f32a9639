//! Profile configuration handed to providers by the caller.

use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::error::Result;

/// One named profile: a flat `key -> value` mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Profile {
    values: BTreeMap<String, String>,
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Returns a trimmed, non-empty value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub(crate) fn has_static_credentials(&self) -> bool {
        self.contains("aws_access_key_id") && self.contains("aws_secret_access_key")
    }

    /// The absent half of a static key pair when only one half is set.
    pub(crate) fn missing_static_key(&self) -> Option<&'static str> {
        match (
            self.contains("aws_access_key_id"),
            self.contains("aws_secret_access_key"),
        ) {
            (true, false) => Some("aws_secret_access_key"),
            (false, true) => Some("aws_access_key_id"),
            _ => None,
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Profile
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Loaded configuration: `{profiles: {name: {key: value}}}`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    profiles: BTreeMap<String, Profile>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, name: impl Into<String>, profile: Profile) -> Self {
        self.profiles.insert(name.into(), profile);
        self
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn profiles(&self) -> impl Iterator<Item = (&str, &Profile)> {
        self.profiles.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Produces the current configuration on demand.
///
/// Implemented for [`Config`] itself and for closures returning one.
pub trait ConfigLoader: Send + Sync {
    fn load_config(&self) -> Result<Config>;
}

impl ConfigLoader for Config {
    fn load_config(&self) -> Result<Config> {
        Ok(self.clone())
    }
}

impl<F> ConfigLoader for F
where
    F: Fn() -> Config + Send + Sync,
{
    fn load_config(&self) -> Result<Config> {
        Ok(self())
    }
}

/// Shared, type-erased config loader.
#[derive(Clone)]
pub struct SharedConfigLoader(Arc<dyn ConfigLoader>);

impl SharedConfigLoader {
    pub fn new(loader: impl ConfigLoader + 'static) -> Self {
        Self(Arc::new(loader))
    }

    pub fn load_config(&self) -> Result<Config> {
        self.0.load_config()
    }
}

impl fmt::Debug for SharedConfigLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedConfigLoader")
    }
}
