use std::{fmt, sync::Arc};

use crate::{
    credentials::{ProvidedCredentials, RefreshableCredentials},
    error::Result,
    metadata::IamRoleFetcher,
    time_source::{self, SharedTimeSource},
};

/// Role credentials from the instance metadata service.
#[derive(Clone)]
pub struct InstanceMetadataProvider {
    fetcher: Arc<dyn IamRoleFetcher>,
    time_source: SharedTimeSource,
}

impl InstanceMetadataProvider {
    pub const METHOD: &'static str = "iam-role";
    pub const CANONICAL_NAME: &'static str = "Ec2InstanceMetadata";

    pub fn new(fetcher: impl IamRoleFetcher + 'static) -> Self {
        Self::with_shared_fetcher(Arc::new(fetcher))
    }

    pub fn with_shared_fetcher(fetcher: Arc<dyn IamRoleFetcher>) -> Self {
        Self {
            fetcher,
            time_source: time_source::system(),
        }
    }

    pub fn with_time_source(mut self, time_source: SharedTimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    pub async fn load(&self) -> Result<Option<ProvidedCredentials>> {
        let metadata = match self.fetcher.retrieve_iam_role_credentials().await? {
            Some(metadata) if !metadata.is_empty() => metadata,
            _ => return Ok(None),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            role_name = metadata.get("role_name").map(String::as_str).unwrap_or(""),
            "found credentials from instance metadata"
        );

        let fetcher = self.fetcher.clone();
        let refresh = move || {
            let fetcher = fetcher.clone();
            async move { fetcher.retrieve_iam_role_credentials().await }
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

impl fmt::Debug for InstanceMetadataProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceMetadataProvider").finish_non_exhaustive()
    }
}
