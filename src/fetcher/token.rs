use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Yields the OIDC token presented to `AssumeRoleWithWebIdentity`.
#[async_trait]
pub trait WebIdentityTokenLoader: Send + Sync {
    async fn load_token(&self) -> Result<String>;
}

#[async_trait]
impl<F> WebIdentityTokenLoader for F
where
    F: Fn() -> String + Send + Sync,
{
    async fn load_token(&self) -> Result<String> {
        Ok(self())
    }
}

/// Shared, type-erased token loader.
pub type SharedTokenLoader = Arc<dyn WebIdentityTokenLoader>;

/// Reads the token from a file on every call, so rotated tokens are picked up.
#[derive(Clone, Debug)]
pub struct FileWebIdentityTokenLoader {
    path: PathBuf,
}

impl FileWebIdentityTokenLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl WebIdentityTokenLoader for FileWebIdentityTokenLoader {
    async fn load_token(&self) -> Result<String> {
        let token = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::invalid_config(format!(
                "failed to read web identity token {}: {e}",
                self.path.display()
            ))
        })?;
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::invalid_config("web identity token is empty"));
        }
        Ok(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closures_yield_tokens() {
        let loader = || "totally.a.token".to_string();
        assert_eq!(loader.load_token().await.unwrap(), "totally.a.token");
    }

    #[tokio::test]
    async fn file_loader_trims_and_rejects_empty_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");

        std::fs::write(&path, "  abc.def \n").unwrap();
        let loader = FileWebIdentityTokenLoader::new(&path);
        assert_eq!(loader.load_token().await.unwrap(), "abc.def");

        std::fs::write(&path, "\n").unwrap();
        assert!(loader.load_token().await.is_err());

        let missing = FileWebIdentityTokenLoader::new(dir.path().join("nope"));
        assert!(matches!(
            missing.load_token().await,
            Err(Error::InvalidConfig { .. })
        ));
    }
}
