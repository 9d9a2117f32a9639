mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use credchain::{
    CanonicalNameCredentialSourcer, Config, Credentials, CredentialProvider, CredentialResolver,
    Env, Error, InMemoryCache, Metadata, Profile, ProvidedCredentials, Result, SharedConfigLoader,
    metadata::{ContainerFetcher, IamRoleFetcher, JsonObject},
    providers::{AssumeRoleProvider, ContainerProvider, EnvProvider, InstanceMetadataProvider},
};
use http::HeaderMap;
use serde_json::json;

use common::{CountingProvider, FakeSts, some_future_time};

fn counting(method: &str, canonical_name: &str, creds: Option<Credentials>) -> CountingProvider {
    CountingProvider::new(method, canonical_name, creds)
}

#[tokio::test]
async fn resolver_returns_the_first_hit_and_stops() {
    let empty = counting("provider1", "CustomProvider1", None);
    let hit = counting("provider2", "CustomProvider2", Some(Credentials::new("a", "b").with_token("c")));
    let resolver = CredentialResolver::new(vec![
        CredentialProvider::custom(empty.clone()),
        CredentialProvider::custom(hit.clone()),
    ]);
    let creds = resolver.load_credentials().await.unwrap().unwrap();
    let frozen = creds.get_frozen_credentials().await.unwrap();
    assert_eq!(frozen.access_key, "a");
    assert_eq!(frozen.secret_key, "b");
    assert_eq!(frozen.token.as_deref(), Some("c"));
    assert_eq!((empty.calls(), hit.calls()), (1, 1));

    let first = counting("provider1", "CustomProvider1", Some(Credentials::new("y", "y")));
    let second = counting("provider2", "CustomProvider2", Some(Credentials::new("x", "x")));
    let resolver = CredentialResolver::new(vec![
        CredentialProvider::custom(first.clone()),
        CredentialProvider::custom(second.clone()),
    ]);
    let creds = resolver.load_credentials().await.unwrap().unwrap();
    assert_eq!(creds.as_static().unwrap().access_key(), "y");
    assert_eq!(second.calls(), 0);
}

#[tokio::test]
async fn resolver_with_nothing_to_offer_returns_none() {
    let resolver = CredentialResolver::new(vec![
        CredentialProvider::custom(counting("provider1", "CustomProvider1", None)),
        EnvProvider::new(Env::from_map::<&str, &str>([])).into(),
    ]);
    assert!(resolver.load_credentials().await.unwrap().is_none());
    assert!(CredentialResolver::default().load_credentials().await.unwrap().is_none());
}

#[tokio::test]
async fn provider_errors_stop_the_chain() {
    let after = counting("after", "After", Some(Credentials::new("a", "b")));
    let resolver = CredentialResolver::new(vec![
        EnvProvider::new(Env::from_map([("AWS_ACCESS_KEY_ID", "only-half")])).into(),
        CredentialProvider::custom(after.clone()),
    ]);
    assert!(matches!(
        resolver.load_credentials().await,
        Err(Error::PartialCredentials { .. })
    ));
    assert_eq!(after.calls(), 0);
}

#[tokio::test]
async fn sourcer_matches_canonical_names_case_insensitively() {
    let creds = Credentials::new("a", "b").with_token("c");
    let provider1 = counting("provider1", "CustomProvider1", Some(creds.clone()));
    let provider2 = counting("provider2", "CustomProvider2", None);
    let sourcer = CanonicalNameCredentialSourcer::new(vec![
        CredentialProvider::custom(provider1),
        CredentialProvider::custom(provider2.clone()),
    ]);

    let expected: ProvidedCredentials = creds.into();
    for name in ["CustomProvider1", "cUsToMpRoViDeR1"] {
        let result = sourcer.source_credentials(name).await.unwrap().unwrap();
        assert!(result.same_source(&expected));
    }
    assert_eq!(provider2.calls(), 0);
}

#[tokio::test]
async fn shared_config_sourcing_tries_assume_role_first() {
    let role_profiles = Config::new().with_profile(
        "default",
        Profile::new()
            .with("role_arn", "myrole")
            .with("credential_source", "Environment"),
    );
    let sts = FakeSts::default();
    let env_provider: CredentialProvider =
        EnvProvider::new(Env::from_map([("AWS_ACCESS_KEY_ID", "env-a"), ("AWS_SECRET_ACCESS_KEY", "env-b")]))
            .into();
    let assume_role = AssumeRoleProvider::new(
        SharedConfigLoader::new(role_profiles),
        Arc::new(sts.clone()),
        Arc::new(InMemoryCache::new()),
        "default",
    )
    .with_credential_sourcer(CanonicalNameCredentialSourcer::new(vec![env_provider.clone()]));
    let shared = counting("config-file", "SharedConfig", Some(Credentials::new("s", "s")));

    let sourcer = CanonicalNameCredentialSourcer::new(vec![
        env_provider,
        assume_role.into(),
        CredentialProvider::custom(shared.clone()),
    ]);
    let creds = sourcer.source_credentials("sharedconfig").await.unwrap().unwrap();
    assert_eq!(creds.method(), "assume-role");
    assert_eq!(shared.calls(), 0);

    let frozen = creds.get_frozen_credentials().await.unwrap();
    assert_eq!(frozen.access_key, "foo");
    assert_eq!(sts.created_with(), [Some("env-a".to_string())]);
}

fn role_config() -> Config {
    Config::new()
        .with_profile(
            "development",
            Profile::new()
                .with("role_arn", "myrole")
                .with("source_profile", "longterm"),
        )
        .with_profile(
            "longterm",
            Profile::new()
                .with("aws_access_key_id", "akid")
                .with("aws_secret_access_key", "skid"),
        )
        .with_profile(
            "non-static",
            Profile::new()
                .with("role_arn", "myrole")
                .with("credential_source", "Environment"),
        )
        .with_profile(
            "chained",
            Profile::new()
                .with("role_arn", "chained-role")
                .with("source_profile", "development"),
        )
        .with_profile(
            "loop-a",
            Profile::new().with("role_arn", "a").with("source_profile", "loop-b"),
        )
        .with_profile(
            "loop-b",
            Profile::new().with("role_arn", "b").with("source_profile", "loop-a"),
        )
}

fn assume_role_provider(sts: &FakeSts, profile: &str) -> AssumeRoleProvider {
    let config = role_config();
    AssumeRoleProvider::new(
        SharedConfigLoader::new(move || config.clone()),
        Arc::new(sts.clone()),
        Arc::new(InMemoryCache::new()),
        profile,
    )
}

#[tokio::test]
async fn assume_role_provider_defers_the_exchange_until_first_use() {
    let sts = FakeSts::default();
    let provider = assume_role_provider(&sts, "development");

    let creds = provider.load().await.unwrap().unwrap();
    assert_eq!(creds.method(), "assume-role");
    assert!(sts.created_with().is_empty());

    let frozen = creds.get_frozen_credentials().await.unwrap();
    assert_eq!(frozen.access_key, "foo");
    assert_eq!(frozen.secret_key, "bar");
    assert_eq!(frozen.token.as_deref(), Some("baz"));
    assert_eq!(sts.created_with(), [Some("akid".to_string())]);
    assert_eq!(sts.role_arns(), ["myrole"]);
    assert_eq!(sts.closed(), 1);

    creds.get_frozen_credentials().await.unwrap();
    assert_eq!(sts.role_arns().len(), 1);
}

#[tokio::test]
async fn chained_roles_are_assumed_source_first() {
    let sts = FakeSts::default();
    let creds = assume_role_provider(&sts, "chained")
        .load()
        .await
        .unwrap()
        .unwrap();
    creds.get_frozen_credentials().await.unwrap();

    assert_eq!(sts.role_arns(), ["myrole", "chained-role"]);
    assert_eq!(
        sts.created_with(),
        [Some("akid".to_string()), Some("foo".to_string())]
    );
}

#[tokio::test]
async fn credential_source_uses_the_sourcer() {
    let sts = FakeSts::default();
    let env = Env::from_map([("AWS_ACCESS_KEY_ID", "env-akid"), ("AWS_SECRET_ACCESS_KEY", "env-skid")]);
    let provider = assume_role_provider(&sts, "non-static").with_credential_sourcer(
        CanonicalNameCredentialSourcer::new(vec![EnvProvider::new(env).into()]),
    );
    let creds = provider.load().await.unwrap().unwrap();
    creds.get_frozen_credentials().await.unwrap();
    assert_eq!(sts.created_with(), [Some("env-akid".to_string())]);

    let unsupported = assume_role_provider(&sts, "non-static")
        .with_credential_sourcer(CanonicalNameCredentialSourcer::default());
    assert!(matches!(
        unsupported.load().await,
        Err(Error::InvalidConfig { .. })
    ));
}

#[tokio::test]
async fn source_profile_cycles_fail_instead_of_looping() {
    let sts = FakeSts::default();
    let resolver = CredentialResolver::new(vec![assume_role_provider(&sts, "loop-a").into()]);
    match resolver.load_credentials().await {
        Err(Error::ConfigCycle { profile, .. }) => assert_eq!(profile, "loop-a"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn profiles_without_a_role_are_skipped() {
    let sts = FakeSts::default();
    assert!(assume_role_provider(&sts, "longterm").load().await.unwrap().is_none());
    assert!(assume_role_provider(&sts, "missing").load().await.unwrap().is_none());
}

#[derive(Default)]
struct RecordingContainer {
    calls: Mutex<Vec<(String, Option<HeaderMap>)>>,
}

#[async_trait]
impl ContainerFetcher for RecordingContainer {
    async fn retrieve_full_uri(&self, url: &str, headers: Option<HeaderMap>) -> Result<JsonObject> {
        self.calls.lock().unwrap().push((url.to_string(), headers));
        let body = json!({
            "AccessKeyId": "access_key",
            "SecretAccessKey": "secret_key",
            "Token": "token",
            "Expiration": some_future_time()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap(),
        });
        Ok(body.as_object().cloned().unwrap())
    }
}

#[tokio::test]
async fn container_provider_needs_its_trigger_variable() {
    let fetcher = Arc::new(RecordingContainer::default());
    let provider = ContainerProvider::with_shared_fetcher(Env::from_map::<&str, &str>([]), fetcher.clone());
    assert!(provider.load().await.unwrap().is_none());
    assert!(fetcher.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn container_provider_fetches_the_relative_uri() {
    let fetcher = Arc::new(RecordingContainer::default());
    let env = Env::from_map([(
        "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI",
        "/latest/credentials?id=foo",
    )]);
    let provider = ContainerProvider::with_shared_fetcher(env, fetcher.clone());
    let creds = provider.load().await.unwrap().unwrap();

    {
        let calls = fetcher.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "http://169.254.170.2/latest/credentials?id=foo");
        assert!(calls[0].1.is_none());
    }

    assert_eq!(creds.method(), "container-role");
    assert!(creds.as_refreshable().is_some());
    let frozen = creds.get_frozen_credentials().await.unwrap();
    assert_eq!(frozen.access_key, "access_key");
    assert_eq!(frozen.secret_key, "secret_key");
    assert_eq!(frozen.token.as_deref(), Some("token"));
}

struct FixedRole;

#[async_trait]
impl IamRoleFetcher for FixedRole {
    async fn retrieve_iam_role_credentials(&self) -> Result<Option<Metadata>> {
        let expiry = some_future_time()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap();
        Ok(Some(Metadata::from([
            ("access_key".to_string(), "a".to_string()),
            ("secret_key".to_string(), "b".to_string()),
            ("token".to_string(), "c".to_string()),
            ("expiry_time".to_string(), expiry),
            ("role_name".to_string(), "myrole".to_string()),
        ])))
    }
}

#[tokio::test]
async fn instance_metadata_provider_wraps_role_credentials() {
    let creds = InstanceMetadataProvider::new(FixedRole)
        .load()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(creds.method(), "iam-role");
    let frozen = creds.get_frozen_credentials().await.unwrap();
    assert_eq!(frozen.access_key, "a");
    assert_eq!(frozen.secret_key, "b");
    assert_eq!(frozen.token.as_deref(), Some("c"));
}
