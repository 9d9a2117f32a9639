use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
    sync::Arc,
};

use http::{HeaderMap, HeaderValue, header::AUTHORIZATION};
use url::{Host, Url};

use crate::{
    credentials::{Metadata, ProvidedCredentials, RefreshableCredentials},
    env::Env,
    error::{Error, Result},
    metadata::{ContainerFetcher, JsonObject},
    time_source::{self, SharedTimeSource},
};

pub const RELATIVE_URI_ENV: &str = "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI";
pub const FULL_URI_ENV: &str = "AWS_CONTAINER_CREDENTIALS_FULL_URI";
pub const AUTH_TOKEN_ENV: &str = "AWS_CONTAINER_AUTHORIZATION_TOKEN";

const ALLOWED_IPV4: [Ipv4Addr; 2] = [
    Ipv4Addr::new(169, 254, 170, 2),
    Ipv4Addr::new(169, 254, 170, 23),
];
const ALLOWED_IPV6: Ipv6Addr = Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x23);

/// Role credentials served by a container credentials endpoint.
///
/// Applies only when one of the container URI variables is set.
#[derive(Clone)]
pub struct ContainerProvider {
    env: Env,
    fetcher: Arc<dyn ContainerFetcher>,
    time_source: SharedTimeSource,
}

impl ContainerProvider {
    pub const METHOD: &'static str = "container-role";
    pub const CANONICAL_NAME: &'static str = "EcsContainer";

    pub fn new(env: Env, fetcher: impl ContainerFetcher + 'static) -> Self {
        Self::with_shared_fetcher(env, Arc::new(fetcher))
    }

    pub fn with_shared_fetcher(env: Env, fetcher: Arc<dyn ContainerFetcher>) -> Self {
        Self {
            env,
            fetcher,
            time_source: time_source::system(),
        }
    }

    pub fn with_time_source(mut self, time_source: SharedTimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    pub async fn load(&self) -> Result<Option<ProvidedCredentials>> {
        let (url, headers) = if let Some(relative) = self.env.get(RELATIVE_URI_ENV) {
            (self.fetcher.full_url(&relative), None)
        } else if let Some(full) = self.env.get(FULL_URI_ENV) {
            validate_full_uri(&full)?;
            (full, self.auth_headers()?)
        } else {
            return Ok(None);
        };

        let metadata = fetch(self.fetcher.as_ref(), &url, headers.clone()).await?;

        let fetcher = self.fetcher.clone();
        let refresh = move || {
            let fetcher = fetcher.clone();
            let url = url.clone();
            let headers = headers.clone();
            async move { fetch(fetcher.as_ref(), &url, headers).await.map(Some) }
        };
        RefreshableCredentials::create_from_metadata(
            metadata,
            Arc::new(refresh),
            Self::METHOD,
            self.time_source.clone(),
        )
        .map(|creds| Some(creds.into()))
    }

    fn auth_headers(&self) -> Result<Option<HeaderMap>> {
        let Some(token) = self.env.get(AUTH_TOKEN_ENV) else {
            return Ok(None);
        };
        let mut value = HeaderValue::from_str(&token).map_err(|_| {
            Error::invalid_config(format!("{AUTH_TOKEN_ENV} is not a valid header value"))
        })?;
        value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(Some(headers))
    }
}

impl fmt::Debug for ContainerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerProvider")
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

async fn fetch(
    fetcher: &dyn ContainerFetcher,
    url: &str,
    headers: Option<HeaderMap>,
) -> Result<Metadata> {
    let response = fetcher.retrieve_full_uri(url, headers).await?;
    Ok(to_metadata(&response))
}

fn to_metadata(response: &JsonObject) -> Metadata {
    [
        ("AccessKeyId", "access_key"),
        ("SecretAccessKey", "secret_key"),
        ("Token", "token"),
        ("Expiration", "expiry_time"),
    ]
    .into_iter()
    .filter_map(|(from, to)| {
        response
            .get(from)
            .and_then(|v| v.as_str())
            .map(|v| (to.to_string(), v.to_string()))
    })
    .collect()
}

/// Plain-http full URIs must stay on the local host or the container endpoint.
fn validate_full_uri(full_uri: &str) -> Result<()> {
    let url = Url::parse(full_uri)
        .map_err(|e| Error::invalid_config(format!("invalid {FULL_URI_ENV} {full_uri:?}: {e}")))?;
    if url.scheme() == "https" {
        return Ok(());
    }
    let allowed = url.scheme() == "http"
        && match url.host() {
            Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
            Some(Host::Ipv4(ip)) => ip.is_loopback() || ALLOWED_IPV4.contains(&ip),
            Some(Host::Ipv6(ip)) => ip.is_loopback() || ip == ALLOWED_IPV6,
            None => false,
        };
    if allowed {
        Ok(())
    } else {
        Err(Error::invalid_config(format!(
            "unsupported host in {FULL_URI_ENV}: {full_uri}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, Option<HeaderMap>)>>,
    }

    #[async_trait]
    impl ContainerFetcher for Recorder {
        async fn retrieve_full_uri(
            &self,
            url: &str,
            headers: Option<HeaderMap>,
        ) -> Result<JsonObject> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), headers));
            let body = json!({
                "AccessKeyId": "access_key",
                "SecretAccessKey": "secret_key",
                "Token": "token",
                "Expiration": "2999-01-01T00:00:00Z",
                "RoleArn": "arn:aws:iam::1:role/task",
            });
            Ok(body.as_object().cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn full_uri_sends_the_authorization_token() {
        let recorder = Arc::new(Recorder::default());
        let env = Env::from_map([
            (FULL_URI_ENV, "http://localhost:8080/creds"),
            (AUTH_TOKEN_ENV, "Basic abc"),
        ]);
        let provider = ContainerProvider::with_shared_fetcher(env, recorder.clone());
        let creds = provider.load().await.unwrap().unwrap();
        assert_eq!(creds.method(), "container-role");

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls[0].0, "http://localhost:8080/creds");
        let headers = calls[0].1.as_ref().unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Basic abc");
    }

    #[tokio::test]
    async fn full_uri_on_a_remote_http_host_is_rejected() {
        let env = Env::from_map([(FULL_URI_ENV, "http://example.com/creds")]);
        let provider = ContainerProvider::new(env, Recorder::default());
        assert!(matches!(
            provider.load().await,
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn full_uri_host_rules() {
        for ok in [
            "https://example.com/creds",
            "http://127.0.0.1/creds",
            "http://169.254.170.2/creds",
            "http://169.254.170.23/v1/credentials",
            "http://[::1]:80/creds",
            "http://[fd00:ec2::23]/creds",
        ] {
            assert!(validate_full_uri(ok).is_ok(), "{ok}");
        }
        for bad in ["http://10.0.0.1/creds", "ftp://localhost/creds", "not a url"] {
            assert!(validate_full_uri(bad).is_err(), "{bad}");
        }
    }
}
