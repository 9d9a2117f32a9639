mod common;

use std::sync::Arc;

use credchain::{
    ChainConfig, Config, Credentials, Env, JsonFileCache, Profile, SharedConfigLoader,
    create_credential_resolver,
    metadata::{ContainerFetcher, IamRoleFetcher},
};

use common::FakeSts;

struct Unreachable;

#[async_trait::async_trait]
impl IamRoleFetcher for Unreachable {
    async fn retrieve_iam_role_credentials(
        &self,
    ) -> credchain::Result<Option<credchain::Metadata>> {
        panic!("instance metadata must not be consulted");
    }
}

#[async_trait::async_trait]
impl ContainerFetcher for Unreachable {
    async fn retrieve_full_uri(
        &self,
        _url: &str,
        _headers: Option<http::HeaderMap>,
    ) -> credchain::Result<credchain::metadata::JsonObject> {
        panic!("container metadata must not be consulted");
    }
}

fn chain_config(env: Env, profile: Option<&str>, sts: &FakeSts, cache_dir: &std::path::Path) -> ChainConfig {
    let config = Config::new()
        .with_profile(
            "development",
            Profile::new()
                .with("role_arn", "arn:aws:iam::123456789012:role/dev")
                .with("source_profile", "longterm")
                .with("role_session_name", "dev-session"),
        )
        .with_profile(
            "longterm",
            Profile::new()
                .with("aws_access_key_id", "akid")
                .with("aws_secret_access_key", "skid"),
        );
    ChainConfig {
        env,
        config_loader: SharedConfigLoader::new(config),
        profile_name: profile.map(str::to_string),
        client_creator: Some(Arc::new(sts.clone())),
        cache: Arc::new(JsonFileCache::new(cache_dir)),
        iam_role_fetcher: Some(Arc::new(Unreachable)),
        container_fetcher: Some(Arc::new(Unreachable)),
        ..ChainConfig::default()
    }
}

#[tokio::test]
async fn default_chain_order_with_a_client() {
    let dir = tempfile::tempdir().unwrap();
    let sts = FakeSts::default();
    let resolver = create_credential_resolver(&chain_config(
        Env::from_map::<&str, &str>([]),
        None,
        &sts,
        dir.path(),
    ))
    .unwrap();
    let methods = resolver
        .providers()
        .iter()
        .map(|p| p.method())
        .collect::<Vec<_>>();
    assert_eq!(
        methods,
        [
            "env",
            "assume-role",
            "assume-role-with-web-identity",
            "config-file",
            "container-role",
            "iam-role",
        ]
    );
}

#[tokio::test]
async fn environment_keys_win_without_an_explicit_profile() {
    let dir = tempfile::tempdir().unwrap();
    let sts = FakeSts::default();
    let env = Env::from_map([
        ("AWS_ACCESS_KEY_ID", "env-akid"),
        ("AWS_SECRET_ACCESS_KEY", "env-skid"),
        ("AWS_PROFILE", "development"),
    ]);
    let resolver = create_credential_resolver(&chain_config(env, None, &sts, dir.path())).unwrap();
    let creds = resolver.load_credentials().await.unwrap().unwrap();
    assert_eq!(creds.method(), "env");
}

#[tokio::test]
async fn role_sessions_are_shared_through_the_file_cache() {
    let dir = tempfile::tempdir().unwrap();
    let sts = FakeSts::default();
    let env = Env::from_map([("AWS_ACCESS_KEY_ID", "ignored"), ("AWS_SECRET_ACCESS_KEY", "ignored")]);

    let resolver =
        create_credential_resolver(&chain_config(env.clone(), Some("development"), &sts, dir.path()))
            .unwrap();
    let creds = resolver.load_credentials().await.unwrap().unwrap();
    assert_eq!(creds.method(), "assume-role");
    assert_eq!(creds.get_frozen_credentials().await.unwrap().access_key, "foo");
    assert_eq!(sts.role_arns().len(), 1);
    assert_eq!(sts.closed(), 1);

    let entries = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(entries, 1);

    let second = create_credential_resolver(&chain_config(env, Some("development"), &sts, dir.path()))
        .unwrap();
    let creds = second.load_credentials().await.unwrap().unwrap();
    assert_eq!(creds.get_frozen_credentials().await.unwrap().secret_key, "bar");
    assert_eq!(sts.role_arns().len(), 1);
    assert_eq!(sts.closed(), 1);
}

#[tokio::test]
async fn web_identity_from_the_environment() {
    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("token");
    std::fs::write(&token_file, "header.payload.signature\n").unwrap();

    let sts = FakeSts::default();
    let env = Env::from_map([
        (
            "AWS_WEB_IDENTITY_TOKEN_FILE",
            token_file.to_string_lossy().to_string(),
        ),
        (
            "AWS_ROLE_ARN",
            "arn:aws:iam::123456789012:role/federated".to_string(),
        ),
    ]);
    let resolver = create_credential_resolver(&chain_config(
        env,
        None,
        &sts,
        &dir.path().join("cache"),
    ))
    .unwrap();

    let creds = resolver.load_credentials().await.unwrap().unwrap();
    assert_eq!(creds.method(), "assume-role-with-web-identity");
    creds.get_frozen_credentials().await.unwrap();
    assert_eq!(sts.created_with(), [None::<String>]);
    assert_eq!(sts.role_arns(), ["arn:aws:iam::123456789012:role/federated"]);
}

#[tokio::test]
async fn explicit_keys_come_first() {
    let dir = tempfile::tempdir().unwrap();
    let sts = FakeSts::default();
    let config = ChainConfig {
        explicit: Some(Credentials::new("explicit-a", "explicit-b")),
        ..chain_config(Env::from_map::<&str, &str>([]), Some("development"), &sts, dir.path())
    };
    let creds = create_credential_resolver(&config)
        .unwrap()
        .load_credentials()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(creds.method(), "explicit");
    assert!(sts.created_with().is_empty());
}
