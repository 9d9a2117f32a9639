use std::{collections::HashMap, fmt, sync::Arc};

/// Environment variables consulted by providers.
///
/// Providers never touch `std::env` directly, so chains can be exercised
/// against a fixed mapping.
#[derive(Clone, Default)]
pub struct Env {
    vars: Option<Arc<HashMap<String, String>>>,
}

impl Env {
    /// Reads from the real process environment.
    pub fn process() -> Self {
        Self { vars: None }
    }

    /// Reads from a fixed mapping.
    pub fn from_map<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: Some(Arc::new(
                vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            )),
        }
    }

    /// Returns the value of `key`, treating empty values as absent.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match &self.vars {
            Some(vars) => vars.get(key).cloned(),
            None => std::env::var(key).ok(),
        };
        value.filter(|v| !v.is_empty())
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.vars {
            None => f.write_str("Env(process)"),
            Some(vars) => {
                let mut keys = vars.keys().collect::<Vec<_>>();
                keys.sort();
                f.debug_tuple("Env").field(&keys).finish()
            }
        }
    }
}
