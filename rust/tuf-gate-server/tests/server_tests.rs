//! Route behaviour of a running server.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use testresult::TestResult;
use tokio::net::TcpListener;
use tuf_gate::{AuthorizationService, MetadataBundle, ServiceConfig};
use tuf_gate_metadata::helpers::{KeyPair, RootBuilder, TargetsBuilder, expires_in, sign};
use tuf_gate_server::{
    Server,
    generate::{LIBRARY_TARGETS, REGISTRY_LIBRARY, SampleRepository},
    reload, repository,
};

async fn start(service: Arc<AuthorizationService>) -> TestResult<Server> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    Ok(Server::serve(listener, service)?)
}

async fn sample_server() -> TestResult<(tempfile::TempDir, Arc<AuthorizationService>, Server)> {
    let directory = tempfile::tempdir()?;
    SampleRepository::generate()?.store(directory.path())?;
    let bundle = repository::load(directory.path())?;
    let service = Arc::new(AuthorizationService::new(&bundle, ServiceConfig::default())?);
    let server = start(service.clone()).await?;
    Ok((directory, service, server))
}

async fn auth(server: &Server, path: &str) -> TestResult<(StatusCode, String, String)> {
    let response = reqwest::Client::new()
        .get(format!("{}/auth", server.endpoint()))
        .header("X-Original-URI", path)
        .send()
        .await?;
    let status = response.status();
    let decision = response
        .headers()
        .get("x-tuf-gate-decision")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    Ok((status, decision, response.text().await?))
}

#[tokio::test]
async fn it_allows_paths_listed_by_the_delegated_role() -> TestResult {
    let (_directory, _service, server) = sample_server().await?;

    for path in LIBRARY_TARGETS {
        let (status, decision, body) = auth(&server, path).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(decision, format!("allow:{REGISTRY_LIBRARY}"));
        assert_eq!(body, "OK");
    }

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn it_forbids_paths_the_terminating_role_does_not_list() -> TestResult {
    let (_directory, _service, server) = sample_server().await?;

    let (status, decision, body) = auth(&server, "/v2/library/redis/manifests/latest").await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(decision, format!("deny:terminated:{REGISTRY_LIBRARY}"));
    assert_eq!(body, "Forbidden");

    let (status, decision, _) = auth(&server, "/v1/library/alpine/manifests/latest").await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(decision, "deny:not-delegated");

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn it_falls_back_to_the_request_path() -> TestResult {
    let (_directory, _service, server) = sample_server().await?;

    let response = reqwest::get(format!("{}/auth", server.endpoint())).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn it_fails_closed_on_an_undecodable_original_uri() -> TestResult {
    let (_directory, _service, server) = sample_server().await?;

    let response = reqwest::Client::new()
        .get(format!("{}/auth", server.endpoint()))
        .header(
            "X-Original-URI",
            reqwest::header::HeaderValue::from_bytes(b"/v2/library/\xffalpine")?,
        )
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response
            .headers()
            .get("x-tuf-gate-decision")
            .map(|value| value.as_bytes()),
        Some(&b"error"[..])
    );

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn it_serves_health_banner_and_not_found() -> TestResult {
    let (_directory, _service, server) = sample_server().await?;
    let endpoint = server.endpoint();

    let health = reqwest::get(format!("{endpoint}/health")).await?;
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(health.text().await?, "healthy");

    let banner = reqwest::get(format!("{endpoint}/")).await?;
    assert_eq!(banner.status(), StatusCode::OK);
    assert!(banner.text().await?.starts_with("TUF Gate"));

    let missing = reqwest::get(format!("{endpoint}/elsewhere")).await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn it_dumps_diagnostics_as_json() -> TestResult {
    let (_directory, _service, server) = sample_server().await?;

    let response = reqwest::get(format!("{}/debug", server.endpoint())).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = response.json().await?;

    let mut expected: Vec<&str> = LIBRARY_TARGETS.to_vec();
    expected.sort();
    assert_eq!(json["allowed_paths"], serde_json::json!(expected));
    assert_eq!(
        json["delegations"][REGISTRY_LIBRARY],
        serde_json::json!(["/v2/library/*"])
    );

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn it_keeps_serving_when_a_reload_is_rejected() -> TestResult {
    let (directory, service, server) = sample_server().await?;

    assert!(reload::reload_from(&service, directory.path()).is_ok());

    // A freshly generated repository has a root nobody trusted before.
    SampleRepository::generate()?.store(directory.path())?;
    assert!(reload::reload_from(&service, directory.path()).is_err());

    let (status, _, _) = auth(&server, LIBRARY_TARGETS[0]).await?;
    assert_eq!(status, StatusCode::OK);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn it_answers_500_once_metadata_expires() -> TestResult {
    let key = KeyPair::from_seed([7; 32]);
    let root = RootBuilder::new(expires_in(chrono::Duration::days(1)))
        .root_keys(&[&key], 1)
        .targets_keys(&[&key], 1)
        .build();
    let targets = TargetsBuilder::new(expires_in(chrono::Duration::seconds(2)))
        .target("/short-lived", b"soon gone")
        .build()?;
    let bundle = MetadataBundle {
        root: sign(&root, &[&key])?,
        targets: sign(&targets, &[&key])?,
        ..MetadataBundle::default()
    };
    let service = Arc::new(AuthorizationService::new(&bundle, ServiceConfig::default())?);
    let server = start(service).await?;

    tokio::time::sleep(Duration::from_secs(3)).await;
    let (status, decision, body) = auth(&server, "/short-lived").await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(decision, "error");
    assert_eq!(body, "Internal Server Error");

    server.stop().await;
    Ok(())
}
