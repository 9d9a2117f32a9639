use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use credchain::{
    ClientCreator, Credentials, FrozenCredentials, ProvideCredentials, ProvidedCredentials,
    Result, StsClient,
    fetcher::{
        AssumeRoleRequest, AssumeRoleResponse, AssumeRoleWithWebIdentityRequest, StsCredentials,
    },
};
use time::{Duration, OffsetDateTime};

pub(crate) fn some_future_time() -> OffsetDateTime {
    OffsetDateTime::now_utc() + Duration::hours(24)
}

/// Provider with fixed tags and result that counts its `load` calls.
#[derive(Clone)]
pub(crate) struct CountingProvider {
    method: String,
    canonical_name: String,
    credentials: Option<Credentials>,
    calls: Arc<AtomicUsize>,
}

impl CountingProvider {
    pub(crate) fn new(method: &str, canonical_name: &str, credentials: Option<Credentials>) -> Self {
        Self {
            method: method.to_string(),
            canonical_name: canonical_name.to_string(),
            credentials,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProvideCredentials for CountingProvider {
    fn method(&self) -> &str {
        &self.method
    }

    fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    async fn load(&self) -> Result<Option<ProvidedCredentials>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.credentials.clone().map(Into::into))
    }
}

#[derive(Default)]
struct FakeStsState {
    created_with: Mutex<Vec<Option<String>>>,
    role_arns: Mutex<Vec<String>>,
    closed: AtomicUsize,
}

/// STS stand-in answering every call with `foo` / `bar` / `baz`.
#[derive(Clone, Default)]
pub(crate) struct FakeSts {
    state: Arc<FakeStsState>,
}

impl FakeSts {
    /// Access keys the clients were created with, in call order.
    pub(crate) fn created_with(&self) -> Vec<Option<String>> {
        self.state.created_with.lock().unwrap().clone()
    }

    pub(crate) fn role_arns(&self) -> Vec<String> {
        self.state.role_arns.lock().unwrap().clone()
    }

    pub(crate) fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }
}

fn response() -> AssumeRoleResponse {
    AssumeRoleResponse::new(StsCredentials {
        access_key_id: "foo".to_string(),
        secret_access_key: "bar".to_string(),
        session_token: "baz".to_string(),
        expiration: some_future_time(),
    })
}

struct FakeClient {
    state: Arc<FakeStsState>,
}

#[async_trait]
impl StsClient for FakeClient {
    async fn assume_role(&self, request: AssumeRoleRequest) -> Result<AssumeRoleResponse> {
        self.state.role_arns.lock().unwrap().push(request.role_arn);
        Ok(response())
    }

    async fn assume_role_with_web_identity(
        &self,
        request: AssumeRoleWithWebIdentityRequest,
    ) -> Result<AssumeRoleResponse> {
        self.state.role_arns.lock().unwrap().push(request.role_arn);
        Ok(response())
    }

    async fn close(&self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClientCreator for FakeSts {
    async fn create_client(
        &self,
        credentials: Option<FrozenCredentials>,
    ) -> Result<Box<dyn StsClient>> {
        self.state
            .created_with
            .lock()
            .unwrap()
            .push(credentials.map(|c| c.access_key));
        Ok(Box::new(FakeClient {
            state: self.state.clone(),
        }))
    }
}
