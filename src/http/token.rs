//! `GET /v2/token` — basic-auth-gated bearer token issuance (spec §4.D/§6).

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::auth::authenticate_basic_for_token;
use super::state::AppState;
use crate::auth::AccessPolicy;
use crate::error::RegistryError;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    token: String,
}

pub async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, RegistryError> {
    let image_scope = query
        .scope
        .as_deref()
        .and_then(AccessPolicy::image_from_scope)
        .map(str::to_string);

    let (admin, pull, push) =
        authenticate_basic_for_token(&state, &headers, image_scope.as_deref()).await?;

    let token = state.tokens.issue(admin, pull, push).await;
    Ok(Json(json!(TokenResponse { token })))
}
