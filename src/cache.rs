//! Storage for assume-role responses, keyed by a digest of the request.

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt as _;

use crate::{
    env::Env,
    error::{Error, Result},
    fetcher::AssumeRoleResponse,
};

/// Key/value store for raw assume-role responses.
///
/// Implementations need not check expiry; fetchers validate the embedded
/// `Expiration` of every entry they read.
#[async_trait]
pub trait CredentialCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<AssumeRoleResponse>;

    async fn set(&self, key: &str, response: &AssumeRoleResponse) -> Result<()>;
}

/// Shared, type-erased cache.
pub type SharedCache = Arc<dyn CredentialCache>;

/// Process-local cache. Clones share the same entries.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<Mutex<HashMap<String, AssumeRoleResponse>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, response: AssumeRoleResponse) {
        self.lock().insert(key.into(), response);
    }

    pub fn get_entry(&self, key: &str) -> Option<AssumeRoleResponse> {
        self.lock().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys = self.lock().keys().cloned().collect::<Vec<_>>();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, AssumeRoleResponse>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("keys", &self.keys())
            .finish()
    }
}

#[async_trait]
impl CredentialCache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<AssumeRoleResponse> {
        self.get_entry(key)
    }

    async fn set(&self, key: &str, response: &AssumeRoleResponse) -> Result<()> {
        self.insert(key, response.clone());
        Ok(())
    }
}

/// One JSON file per entry in a directory.
///
/// Unreadable or malformed files are treated as misses.
#[derive(Clone, Debug)]
pub struct JsonFileCache {
    dir: PathBuf,
}

impl JsonFileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.aws/boto/cache`, the directory other SDKs share role sessions in.
    pub fn default_dir(env: &Env) -> Result<PathBuf> {
        let home = env
            .get("HOME")
            .or_else(|| env.get("USERPROFILE"))
            .ok_or_else(|| Error::invalid_config("cannot determine home dir"))?;
        Ok(Path::new(&home).join(".aws").join("boto").join("cache"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe = key.replace([':', '/', '\\'], "_");
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl CredentialCache for JsonFileCache {
    async fn get(&self, key: &str) -> Option<AssumeRoleResponse> {
        let contents = tokio::fs::read(self.path_for(key)).await.ok()?;
        serde_json::from_slice(&contents).ok()
    }

    async fn set(&self, key: &str, response: &AssumeRoleResponse) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            Error::transport(
                format!("failed to create cache dir {}", self.dir.display()),
                Some(Box::new(e)),
            )
        })?;

        let body = serde_json::to_vec(response)
            .map_err(|e| Error::decode("failed to serialize cache entry", Some(Box::new(e))))?;

        let path = self.path_for(key);
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&path).await.map_err(|e| {
            Error::transport(
                format!("failed to open cache file {}", path.display()),
                Some(Box::new(e)),
            )
        })?;
        let written = async {
            file.write_all(&body).await?;
            file.flush().await
        };
        written.await.map_err(|e| {
            Error::transport(
                format!("failed to write cache file {}", path.display()),
                Some(Box::new(e)),
            )
        })
    }
}
