//! Instance and container metadata collaborators.
//!
//! Providers only see the [`IamRoleFetcher`] and [`ContainerFetcher`] traits.
//! With the `http` feature, reqwest-backed implementations talk to the real
//! link-local endpoints.

use async_trait::async_trait;
use http::HeaderMap;

use crate::{credentials::Metadata, error::Result};

/// Link-local address of the container credentials endpoint.
pub const CONTAINER_METADATA_IP: &str = "169.254.170.2";

/// Base URL of the instance metadata service.
pub const INSTANCE_METADATA_URL: &str = "http://169.254.169.254";

/// A decoded JSON object as returned by a metadata endpoint.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Retrieves the credentials of the role attached to this instance.
#[async_trait]
pub trait IamRoleFetcher: Send + Sync {
    /// Returns `{role_name, access_key, secret_key, token, expiry_time}`, or
    /// `None` when no role is attached.
    async fn retrieve_iam_role_credentials(&self) -> Result<Option<Metadata>>;
}

/// Retrieves credentials from a container credentials endpoint.
#[async_trait]
pub trait ContainerFetcher: Send + Sync {
    /// Full URL for a relative URI under the link-local container endpoint.
    fn full_url(&self, relative_uri: &str) -> String {
        format!("http://{CONTAINER_METADATA_IP}{relative_uri}")
    }

    /// GETs `url` and returns the decoded JSON body.
    async fn retrieve_full_uri(&self, url: &str, headers: Option<HeaderMap>)
    -> Result<JsonObject>;
}

#[cfg(feature = "http")]
pub use self::http_fetchers::{ContainerMetadataFetcher, InstanceMetadataFetcher};

#[cfg(feature = "http")]
mod http_fetchers {
    use std::time::Duration;

    use async_trait::async_trait;
    use http::{HeaderMap, HeaderValue, StatusCode};

    use super::{ContainerFetcher, INSTANCE_METADATA_URL, IamRoleFetcher, JsonObject};
    use crate::{
        credentials::Metadata,
        error::{Error, Result},
        util::text::truncate_snippet,
    };

    const TOKEN_PATH: &str = "/latest/api/token";
    const ROLE_PATH: &str = "/latest/meta-data/iam/security-credentials/";
    const TOKEN_TTL_SECONDS: &str = "21600";
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
    const DEFAULT_CONTAINER_TIMEOUT: Duration = Duration::from_secs(2);

    #[derive(serde::Deserialize)]
    struct RoleCredentials {
        #[serde(rename = "Code")]
        code: Option<String>,
        #[serde(rename = "AccessKeyId")]
        access_key_id: Option<String>,
        #[serde(rename = "SecretAccessKey")]
        secret_access_key: Option<String>,
        #[serde(rename = "Token")]
        token: Option<String>,
        #[serde(rename = "Expiration")]
        expiration: Option<String>,
    }

    impl RoleCredentials {
        fn into_metadata(self, role_name: &str) -> Result<Metadata> {
            if let Some(code) = self.code.as_deref().filter(|c| *c != "Success") {
                return Err(Error::decode(
                    format!("instance metadata returned code {code}"),
                    None,
                ));
            }
            let field = |value: Option<String>, name: &str| {
                value
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| Error::decode(format!("missing {name} in role credentials"), None))
            };
            Ok(Metadata::from([
                ("role_name".to_string(), role_name.to_string()),
                (
                    "access_key".to_string(),
                    field(self.access_key_id, "AccessKeyId")?,
                ),
                (
                    "secret_key".to_string(),
                    field(self.secret_access_key, "SecretAccessKey")?,
                ),
                ("token".to_string(), field(self.token, "Token")?),
                (
                    "expiry_time".to_string(),
                    field(self.expiration, "Expiration")?,
                ),
            ]))
        }
    }

    fn build_client(timeout: Duration) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::transport("failed to build HTTP client", Some(Box::new(e))))
    }

    async fn read_body(resp: reqwest::Response) -> Result<(StatusCode, String)> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::transport("failed to read response body", Some(Box::new(e))))?;
        Ok((status, body))
    }

    fn status_error(url: &str, status: StatusCode, body: &str) -> Error {
        Error::transport(
            format!(
                "metadata request to {url} returned {status}: {}",
                truncate_snippet(body, 256)
            ),
            None,
        )
    }

    /// IMDS client: session token (v2, falling back to v1), role listing,
    /// then the role's credentials.
    #[derive(Clone, Debug)]
    pub struct InstanceMetadataFetcher {
        client: reqwest::Client,
        base_url: String,
    }

    impl InstanceMetadataFetcher {
        pub fn new() -> Result<Self> {
            Self::with_timeout(DEFAULT_TIMEOUT)
        }

        pub fn with_timeout(timeout: Duration) -> Result<Self> {
            Ok(Self {
                client: build_client(timeout)?,
                base_url: INSTANCE_METADATA_URL.to_string(),
            })
        }

        /// Points the fetcher at another endpoint, e.g. a local mock.
        pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
            self.base_url = base_url.into().trim_end_matches('/').to_string();
            self
        }

        async fn fetch_token(&self) -> Result<String> {
            let url = format!("{}{TOKEN_PATH}", self.base_url);
            let resp = self
                .client
                .put(&url)
                .header("X-aws-ec2-metadata-token-ttl-seconds", TOKEN_TTL_SECONDS)
                .send()
                .await
                .map_err(|e| Error::transport("request failed", Some(Box::new(e))))?;
            let (status, body) = read_body(resp).await?;
            if status.is_success() {
                return Ok(body.trim().to_string());
            }
            Err(status_error(&url, status, &body))
        }

        async fn get(&self, path: &str, headers: &HeaderMap) -> Result<Option<String>> {
            let url = format!("{}{path}", self.base_url);
            let resp = self
                .client
                .get(&url)
                .headers(headers.clone())
                .send()
                .await
                .map_err(|e| Error::transport("request failed", Some(Box::new(e))))?;
            let (status, body) = read_body(resp).await?;
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if status.is_success() {
                return Ok(Some(body));
            }
            Err(status_error(&url, status, &body))
        }
    }

    #[async_trait]
    impl IamRoleFetcher for InstanceMetadataFetcher {
        async fn retrieve_iam_role_credentials(&self) -> Result<Option<Metadata>> {
            let mut headers = HeaderMap::new();
            match self.fetch_token().await {
                Ok(token) if !token.is_empty() => {
                    let value = HeaderValue::from_str(&token)
                        .map_err(|_| Error::decode("invalid IMDS token", None))?;
                    headers.insert("X-aws-ec2-metadata-token", value);
                }
                Ok(_) => {}
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(error = %_err, "IMDSv2 token unavailable, falling back to v1");
                }
            }

            let Some(roles) = self.get(ROLE_PATH, &headers).await? else {
                return Ok(None);
            };
            let role_name = roles.lines().next().unwrap_or("").trim();
            if role_name.is_empty() {
                return Ok(None);
            }

            let Some(body) = self.get(&format!("{ROLE_PATH}{role_name}"), &headers).await? else {
                return Ok(None);
            };
            let parsed: RoleCredentials = serde_json::from_str(&body).map_err(|e| {
                Error::decode("failed to parse IMDS credentials JSON", Some(Box::new(e)))
            })?;
            parsed.into_metadata(role_name).map(Some)
        }
    }

    /// Plain GET client for container credential endpoints.
    #[derive(Clone, Debug)]
    pub struct ContainerMetadataFetcher {
        client: reqwest::Client,
    }

    impl ContainerMetadataFetcher {
        pub fn new() -> Result<Self> {
            Self::with_timeout(DEFAULT_CONTAINER_TIMEOUT)
        }

        pub fn with_timeout(timeout: Duration) -> Result<Self> {
            Ok(Self {
                client: build_client(timeout)?,
            })
        }
    }

    #[async_trait]
    impl ContainerFetcher for ContainerMetadataFetcher {
        async fn retrieve_full_uri(
            &self,
            url: &str,
            headers: Option<HeaderMap>,
        ) -> Result<JsonObject> {
            let resp = self
                .client
                .get(url)
                .header(http::header::ACCEPT, "application/json")
                .headers(headers.unwrap_or_default())
                .send()
                .await
                .map_err(|e| Error::transport("request failed", Some(Box::new(e))))?;
            let (status, body) = read_body(resp).await?;
            if !status.is_success() {
                return Err(status_error(url, status, &body));
            }
            serde_json::from_str(&body).map_err(|e| {
                Error::decode(
                    "failed to parse container credentials JSON",
                    Some(Box::new(e)),
                )
            })
        }
    }

}
