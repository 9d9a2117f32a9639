use crate::credentials::{Credentials, EXPLICIT_METHOD, ProvidedCredentials};

/// Always yields the credentials it was built with.
#[derive(Clone, Debug)]
pub struct StaticProvider {
    credentials: Credentials,
}

impl StaticProvider {
    pub const METHOD: &'static str = EXPLICIT_METHOD;
    pub const CANONICAL_NAME: &'static str = "Explicit";

    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: credentials.with_method(Self::METHOD),
        }
    }

    pub fn load(&self) -> Option<ProvidedCredentials> {
        Some(self.credentials.clone().into())
    }
}
