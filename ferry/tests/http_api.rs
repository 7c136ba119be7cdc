//! HTTP changeset API client against a local axum server.

mod common;

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use ferry::core::changeset::ChangesetId;
use ferry::exit_codes;
use ferry::io::api::{BundleLocation, ChangesetApi, HttpChangesetApi};
use ferry::io::config::ApiConfig;
use ferry::resolve::{parse_id, resolve_remote};

const TOKEN: &str = "secret-token";

#[derive(Deserialize)]
struct PrefixQuery {
    prefix: Option<String>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {TOKEN}"))
}

async fn list_sessions(headers: HeaderMap, Query(query): Query<PrefixQuery>) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }
    let all = [
        "3f2a9c1e-7b4d-4e8a-9c2f-1a2b3c4d5e6f",
        "3f2a0000-7b4d-4e8a-9c2f-1a2b3c4d5e6f",
        "9b1d2e3f-0000-4e8a-9c2f-1a2b3c4d5e6f",
    ];
    let prefix = query.prefix.unwrap_or_default();
    let sessions: Vec<_> = all
        .iter()
        .filter(|id| id.starts_with(&prefix))
        .map(|id| json!({ "id": id }))
        .collect();
    Json(json!({ "sessions": sessions })).into_response()
}

async fn job_bundle(headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }
    match id.as_str() {
        "run_ready" => Json(json!({
            "download_url": "http://example.invalid/b",
            "has_changes": true,
            "sha256": "ab",
        }))
        .into_response(),
        "run_empty" => Json(json!({ "has_changes": false })).into_response(),
        "run_broken" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn start(token: Option<&str>) -> HttpChangesetApi {
    let app = Router::new()
        .route("/v1/sessions", get(list_sessions))
        .route("/v1/jobs/{id}/bundle", get(job_bundle));
    let base_url = common::spawn(app).await;
    HttpChangesetApi::new(&ApiConfig {
        base_url,
        token: token.map(str::to_string),
    })
    .expect("client")
}

fn job(raw: &str) -> ChangesetId {
    ChangesetId::parse(raw).expect("job id")
}

#[tokio::test]
async fn bundle_location_parses_ready_and_empty_responses() {
    let api = start(Some(TOKEN)).await;

    let ready = api.bundle_location(&job("run_ready")).await.expect("ready");
    assert_eq!(
        ready,
        BundleLocation {
            download_url: Some("http://example.invalid/b".to_string()),
            has_changes: true,
            sha256: Some("ab".to_string()),
        }
    );

    let empty = api.bundle_location(&job("run_empty")).await.expect("empty");
    assert!(!empty.has_changes);
    assert_eq!(empty.download_url, None);
}

#[tokio::test]
async fn unknown_changeset_is_not_found() {
    let api = start(Some(TOKEN)).await;
    let err = api
        .bundle_location(&job("run_missing"))
        .await
        .expect_err("404");
    assert_eq!(err.tag(), "changeset_not_found");
    assert_eq!(err.exit_code(), exit_codes::NOT_FOUND);
}

#[tokio::test]
async fn server_errors_and_bad_tokens_are_api_errors() {
    let api = start(Some(TOKEN)).await;
    let err = api
        .bundle_location(&job("run_broken"))
        .await
        .expect_err("500");
    assert_eq!(err.tag(), "api_error");
    assert!(err.to_string().contains("boom"));

    let anonymous = start(None).await;
    let err = anonymous
        .bundle_location(&job("run_ready"))
        .await
        .expect_err("401");
    assert_eq!(err.tag(), "api_error");
    assert_eq!(err.exit_code(), exit_codes::NETWORK_ERROR);
}

#[tokio::test]
async fn abbreviated_session_resolves_through_api() {
    let api = start(Some(TOKEN)).await;

    let resolved = resolve_remote(&api, parse_id("9b1d").expect("id"))
        .await
        .expect("resolve");
    assert_eq!(
        resolved,
        ChangesetId::Session("9b1d2e3f-0000-4e8a-9c2f-1a2b3c4d5e6f".to_string())
    );

    let err = resolve_remote(&api, parse_id("3f2a").expect("id"))
        .await
        .expect_err("ambiguous");
    assert_eq!(err.tag(), "ambiguous_id");

    let err = resolve_remote(&api, parse_id("ffff").expect("id"))
        .await
        .expect_err("no match");
    assert_eq!(err.tag(), "changeset_not_found");
}

#[tokio::test]
async fn full_ids_skip_the_network() {
    let api = HttpChangesetApi::new(&ApiConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        token: None,
    })
    .expect("client");
    let full = "3f2a9c1e-7b4d-4e8a-9c2f-1a2b3c4d5e6f";
    let resolved = resolve_remote(&api, parse_id(full).expect("id"))
        .await
        .expect("resolve");
    assert_eq!(resolved.raw(), full);

    let resolved = resolve_remote(&api, parse_id("run_42").expect("id"))
        .await
        .expect("resolve");
    assert_eq!(resolved, job("run_42"));
}
