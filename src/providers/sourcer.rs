use crate::{
    credentials::ProvidedCredentials,
    error::{Error, Result},
    providers::{AssumeRoleProvider, CredentialProvider},
};

/// Names that also consult the assume-role provider, ahead of the named one.
const SHARED_NAMES: [&str; 2] = ["sharedconfig", "sharedcredentials"];

/// Looks providers up by `CANONICAL_NAME`, ignoring case.
///
/// Backs the `credential_source` profile setting.
#[derive(Clone, Debug, Default)]
pub struct CanonicalNameCredentialSourcer {
    providers: Vec<CredentialProvider>,
}

impl CanonicalNameCredentialSourcer {
    pub fn new(providers: Vec<CredentialProvider>) -> Self {
        Self { providers }
    }

    pub fn is_supported(&self, name: &str) -> bool {
        self.by_canonical_name(name).is_some()
    }

    /// Loads credentials from the provider named `name`.
    ///
    /// Fails with [`Error::UnknownCredentialSource`] when nothing matches.
    pub async fn source_credentials(&self, name: &str) -> Result<Option<ProvidedCredentials>> {
        let named = self.by_canonical_name(name);
        let mut candidates = Vec::with_capacity(2);
        if SHARED_NAMES.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            candidates.extend(
                self.providers
                    .iter()
                    .find(|p| p.method() == AssumeRoleProvider::METHOD),
            );
        }
        candidates.extend(named);
        if candidates.is_empty() {
            return Err(Error::UnknownCredentialSource {
                name: name.to_string(),
            });
        }

        for provider in candidates {
            if let Some(creds) = provider.load().await? {
                return Ok(Some(creds));
            }
        }
        Ok(None)
    }

    fn by_canonical_name(&self, name: &str) -> Option<&CredentialProvider> {
        self.providers
            .iter()
            .find(|p| p.canonical_name().eq_ignore_ascii_case(name))
    }
}
