//! `GET /v2/cli/ls` and `DELETE /v2/cli/rm` admin surface (spec §4.F).
//!
//! Both routes are mounted twice — bare and with a trailing `/*arg` — since
//! the free-form `<img[:tag]>` argument is optional.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;

use super::auth::require_admin;
use super::state::AppState;
use crate::error::RegistryError;
use crate::store::parse_image_and_tag;

async fn ls_impl(state: AppState, headers: HeaderMap, arg: &str) -> Result<impl IntoResponse, RegistryError> {
    require_admin(&state, &headers).await?;
    let (image, tag) = parse_image_and_tag(arg, "");
    let tables = state.store.list(&image, &tag).await?;
    Ok(Json(tables))
}

pub async fn ls_root(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, RegistryError> {
    ls_impl(state, headers, "").await
}

pub async fn ls_arg(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(arg): Path<String>,
) -> Result<impl IntoResponse, RegistryError> {
    ls_impl(state, headers, &arg).await
}

#[derive(Debug, serde::Deserialize)]
struct RmArgs {
    #[serde(default = "default_dry")]
    dry: bool,
}

fn default_dry() -> bool {
    true
}

/// Missing or malformed `args` header defaults `dry` to true: never
/// destructive by accident.
fn parse_dry(headers: &HeaderMap) -> bool {
    headers
        .get("args")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| serde_json::from_str::<RmArgs>(s).ok())
        .map(|a| a.dry)
        .unwrap_or(true)
}

async fn rm_impl(state: AppState, headers: HeaderMap, arg: &str) -> Result<impl IntoResponse, RegistryError> {
    require_admin(&state, &headers).await?;
    let dry = parse_dry(&headers);
    let (image, tag) = parse_image_and_tag(arg, "*");
    let tables = state.store.delete(&image, &tag, dry).await?;
    Ok(Json(tables))
}

pub async fn rm_root(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, RegistryError> {
    rm_impl(state, headers, "").await
}

pub async fn rm_arg(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(arg): Path<String>,
) -> Result<impl IntoResponse, RegistryError> {
    rm_impl(state, headers, &arg).await
}
