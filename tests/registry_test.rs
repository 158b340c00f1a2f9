//! Integration tests driving the built `Router` end-to-end over a temporary
//! repo root, covering the scenarios from spec.md §8 — grounded in the
//! request-builder + `tower::ServiceExt::oneshot` pattern used in
//! `container_registry-rs`'s own test suite.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::Engine;
use quayside::config::{Account, Config, ImageRule, LogConfig, ProxyConfig, RepoConfig, ServerConfig};
use quayside::http::{build_router, AppState};
use secrecy::SecretString;
use tower::util::ServiceExt;

fn basic_auth(user: &str, pass: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
    format!("Basic {encoded}")
}

fn test_config(repo_dir: std::path::PathBuf, allow_anonymous_pull: bool) -> Config {
    Config {
        repo: RepoConfig {
            dir: repo_dir,
            allow_anonymous_pull,
        },
        server: ServerConfig {
            host: "0.0.0.0".into(),
            port: 5000,
            tls_crt_file: None,
            tls_key_file: None,
        },
        proxy: ProxyConfig::default(),
        log: LogConfig::default(),
        accounts: vec![
            Account {
                usr: "admin".into(),
                pwd: SecretString::new("admin".into()),
                admin: true,
                images: vec![ImageRule {
                    name: "*".into(),
                    pull: true,
                    push: true,
                }],
            },
            Account {
                usr: "anonymous".into(),
                pwd: SecretString::new(String::new()),
                admin: false,
                images: vec![ImageRule {
                    name: "*".into(),
                    pull: true,
                    push: false,
                }],
            },
        ],
    }
}

fn build_app(allow_anonymous_pull: bool) -> (tempfile::TempDir, axum::Router) {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path().to_path_buf(), allow_anonymous_pull);
    let state = AppState::new(config);
    (dir, build_router(state))
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    use http_body_util::BodyExt;
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

// S1 — anonymous pull of a public image.
#[tokio::test]
async fn anonymous_pull_of_public_manifest() {
    let (_dir, app) = build_app(true);

    let push_manifest = Request::builder()
        .method("PUT")
        .uri("/v2/alpine/manifests/latest")
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::from(r#"{"config":{"digest":"sha256:x"},"layers":[]}"#))
        .unwrap();
    let response = app.clone().oneshot(push_manifest).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let pull = Request::builder()
        .method("GET")
        .uri("/v2/alpine/manifests/latest")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(pull).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/vnd.docker.distribution.manifest.v2+json"
    );
}

#[tokio::test]
async fn anonymous_pull_denied_when_disabled() {
    let (_dir, app) = build_app(false);

    let pull = Request::builder()
        .method("GET")
        .uri("/v2/alpine/manifests/latest")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(pull).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .unwrap()
        .to_str()
        .unwrap()
        .contains("BASIC"));
}

// S2 — push requires auth and verifies digest.
#[tokio::test]
async fn push_requires_auth_and_verifies_digest() {
    let (_dir, app) = build_app(true);

    let start = Request::builder()
        .method("POST")
        .uri("/v2/test/blobs/uploads")
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(start).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let patch = Request::builder()
        .method("PATCH")
        .uri(&location)
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::from("hello"))
        .unwrap();
    let response = app.clone().oneshot(patch).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers().get(header::RANGE).unwrap(), "0-4");

    let wrong_digest_put = Request::builder()
        .method("PUT")
        .uri(format!("{location}?digest=sha256:deadbeef"))
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(wrong_digest_put).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Restart the upload: the failed commit above already deleted the file.
    let start = Request::builder()
        .method("POST")
        .uri("/v2/test/blobs/uploads")
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(start).await.unwrap();
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let patch = Request::builder()
        .method("PATCH")
        .uri(&location)
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::from("hello"))
        .unwrap();
    app.clone().oneshot(patch).await.unwrap();

    let correct_digest = "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    let put = Request::builder()
        .method("PUT")
        .uri(format!("{location}?digest={correct_digest}"))
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(put).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response.headers().get("docker-content-digest").unwrap(),
        correct_digest
    );
}

#[tokio::test]
async fn push_without_auth_is_unauthorized() {
    let (_dir, app) = build_app(true);

    let start = Request::builder()
        .method("POST")
        .uri("/v2/test/blobs/uploads")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(start).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::WWW_AUTHENTICATE).is_some());
}

// S3 — manifest replace and orphan GC.
#[tokio::test]
async fn manifest_replace_garbage_collects_orphan_blob() {
    let (_dir, app) = build_app(true);

    async fn push_blob(app: &axum::Router, content: &[u8]) -> String {
        use quayside::fsutil::digest_from_bytes;
        let digest = digest_from_bytes(content);

        let start = Request::builder()
            .method("POST")
            .uri("/v2/img/blobs/uploads")
            .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(start).await.unwrap();
        let location = response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let patch = Request::builder()
            .method("PATCH")
            .uri(&location)
            .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
            .body(Body::from(content.to_vec()))
            .unwrap();
        app.clone().oneshot(patch).await.unwrap();

        let put = Request::builder()
            .method("PUT")
            .uri(format!("{location}?digest={digest}"))
            .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(put).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        digest
    }

    let b1 = push_blob(&app, b"layer-one").await;
    let b2 = push_blob(&app, b"layer-two").await;
    let b3 = push_blob(&app, b"layer-three").await;

    let m1 = format!(r#"{{"config":{{"digest":"{b1}"}},"layers":[{{"digest":"{b2}"}}]}}"#);
    let put_m1 = Request::builder()
        .method("PUT")
        .uri("/v2/img/manifests/v1")
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::from(m1))
        .unwrap();
    assert_eq!(app.clone().oneshot(put_m1).await.unwrap().status(), StatusCode::CREATED);

    let m2 = format!(r#"{{"config":{{"digest":"{b2}"}},"layers":[{{"digest":"{b3}"}}]}}"#);
    let put_m2 = Request::builder()
        .method("PUT")
        .uri("/v2/img/manifests/v1")
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::from(m2))
        .unwrap();
    assert_eq!(app.clone().oneshot(put_m2).await.unwrap().status(), StatusCode::CREATED);

    let get_b1 = Request::builder()
        .method("GET")
        .uri(format!("/v2/img/blobs/{b1}"))
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(get_b1).await.unwrap().status(), StatusCode::NOT_FOUND);

    let get_b3 = Request::builder()
        .method("GET")
        .uri(format!("/v2/img/blobs/{b3}"))
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.oneshot(get_b3).await.unwrap().status(), StatusCode::OK);
}

// S4 — token lifecycle (issuance + acceptance; TTL expiry is covered at the
// unit level in `auth::token`, not re-tested here against a real hour clock).
#[tokio::test]
async fn token_issued_and_accepted() {
    let (_dir, app) = build_app(true);

    let push_manifest = Request::builder()
        .method("PUT")
        .uri("/v2/alpine/manifests/latest")
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::from(r#"{"config":{"digest":"sha256:x"},"layers":[]}"#))
        .unwrap();
    app.clone().oneshot(push_manifest).await.unwrap();

    let token_req = Request::builder()
        .method("GET")
        .uri("/v2/token?scope=repository:alpine:pull")
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(token_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    assert!(token.starts_with("DockerToken."));

    let pull = Request::builder()
        .method("GET")
        .uri("/v2/alpine/manifests/latest")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(pull).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// S5 — admin delete, dry run vs real.
#[tokio::test]
async fn admin_delete_dry_run_then_real() {
    let (_dir, app) = build_app(true);

    let push_manifest = Request::builder()
        .method("PUT")
        .uri("/v2/alpine/manifests/latest")
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::from(r#"{"config":{"digest":"sha256:x"},"layers":[]}"#))
        .unwrap();
    app.clone().oneshot(push_manifest).await.unwrap();

    let dry_rm = Request::builder()
        .method("DELETE")
        .uri("/v2/cli/rm/alpine:*")
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .header("args", r#"{"dry":true}"#)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(dry_rm).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["tables"][0]["rows"][0][2], "NO");

    let still_there = Request::builder()
        .method("GET")
        .uri("/v2/alpine/manifests/latest")
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(still_there).await.unwrap().status(), StatusCode::OK);

    let real_rm = Request::builder()
        .method("DELETE")
        .uri("/v2/cli/rm/alpine:*")
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .header("args", r#"{"dry":false}"#)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(real_rm).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["tables"][0]["rows"][0][2], "YES");

    let gone = Request::builder()
        .method("GET")
        .uri("/v2/alpine/manifests/latest")
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.oneshot(gone).await.unwrap().status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_surface_requires_admin_rights() {
    let (_dir, app) = build_app(true);

    let ls = Request::builder()
        .method("GET")
        .uri("/v2/cli/ls")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(ls).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .unwrap()
        .to_str()
        .unwrap()
        .contains("Bearer"));
}

// S6 — wildcard list across multiple images and tags.
#[tokio::test]
async fn wildcard_list_groups_matching_images_and_tags() {
    let (_dir, app) = build_app(true);

    for (image, tag) in [("alpine", "1.0"), ("alpine", "1.1"), ("alpha", "1.0"), ("beta", "1.0")] {
        let manifest = r#"{"config":{"digest":"sha256:x"},"layers":[]}"#;
        let put = Request::builder()
            .method("PUT")
            .uri(format!("/v2/{image}/manifests/{tag}"))
            .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
            .body(Body::from(manifest))
            .unwrap();
        assert_eq!(app.clone().oneshot(put).await.unwrap().status(), StatusCode::CREATED);
    }

    let ls = Request::builder()
        .method("GET")
        .uri("/v2/cli/ls/al*")
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(ls).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let rows = body["tables"][0]["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);

    let ls_tags = Request::builder()
        .method("GET")
        .uri("/v2/cli/ls/alpine:1.*")
        .header(header::AUTHORIZATION, basic_auth("admin", "admin"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(ls_tags).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let tables = body["tables"].as_array().unwrap();
    assert_eq!(tables.len(), 2);
}
