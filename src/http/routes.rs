//! Router assembly (spec.md §4.E), grouped by resource the way the teacher's
//! `docker_registry_v2_router` chains `.route(...)` calls.

use axum::middleware;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;

use super::admin;
use super::headers::apply_default_headers;
use super::registry;
use super::state::AppState;
use super::token;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v2", get(registry::probe))
        .route("/v2/", get(registry::probe))
        .route("/v2/token", get(token::issue_token))
        .route("/v2/cli/ls", get(admin::ls_root))
        .route("/v2/cli/ls/*arg", get(admin::ls_arg))
        .route("/v2/cli/rm", delete(admin::rm_root))
        .route("/v2/cli/rm/*arg", delete(admin::rm_arg))
        .route("/v2/:image/blobs/uploads", post(registry::start_upload))
        .route("/v2/:image/blobs/uploads/", post(registry::start_upload))
        .route(
            "/v2/:image/blobs/uploads/:uuid",
            patch(registry::patch_upload).put(registry::put_upload),
        )
        .route(
            "/v2/:image/blobs/:digest",
            get(registry::get_blob).head(registry::head_blob),
        )
        .route(
            "/v2/:image/manifests/:reference",
            get(registry::get_manifest)
                .head(registry::head_manifest)
                .put(registry::put_manifest),
        )
        .layer(middleware::from_fn(apply_default_headers))
        .with_state(state)
}
