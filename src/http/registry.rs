//! Core registry handlers: probe, blobs, manifests, uploads (spec.md §4.E).

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::auth;
use super::headers::external_origin;
use super::state::AppState;
use crate::error::RegistryError;
use crate::store::{GZIP_LAYER_MIME, MANIFEST_MIME};

fn request_host(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

pub async fn probe(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, RegistryError> {
    auth::require_any_authenticated(&state, &headers).await?;
    Ok(StatusCode::OK)
}

// ---- Blobs ---------------------------------------------------------------

pub async fn get_blob(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((image, digest)): Path<(String, String)>,
) -> Result<Response, RegistryError> {
    auth::require_pull(&state, &headers, &image).await?;

    let info = state
        .store
        .exists_blob(&image, &digest)
        .await
        .ok_or(RegistryError::NotFound)?;
    let bytes = state.store.read_blob(&image, &digest).await?;
    let is_gzip = state.store.blob_is_gzip(&image, &digest).await.unwrap_or(false);
    let content_type = if is_gzip { GZIP_LAYER_MIME } else { MANIFEST_MIME };

    let mut response = bytes.into_response();
    response.headers_mut().insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_static(content_type),
    );
    response.headers_mut().insert(
        axum::http::header::CONTENT_LENGTH,
        HeaderValue::from_str(&info.length.to_string()).unwrap(),
    );
    Ok(response)
}

pub async fn head_blob(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((image, digest)): Path<(String, String)>,
) -> Result<Response, RegistryError> {
    auth::require_pull(&state, &headers, &image).await?;

    let info = state
        .store
        .exists_blob(&image, &digest)
        .await
        .ok_or(RegistryError::NotFound)?;
    let is_gzip = state.store.blob_is_gzip(&image, &digest).await.unwrap_or(false);
    let content_type = if is_gzip { GZIP_LAYER_MIME } else { MANIFEST_MIME };

    let mut response = StatusCode::OK.into_response();
    let h = response.headers_mut();
    h.insert(
        HeaderName::from_static("docker-content-digest"),
        HeaderValue::from_str(&digest).unwrap_or(HeaderValue::from_static("")),
    );
    h.insert(
        HeaderName::from_static("accept-ranges"),
        HeaderValue::from_static("bytes"),
    );
    h.insert(
        axum::http::header::LAST_MODIFIED,
        HeaderValue::from_str(&info.http_date).unwrap_or(HeaderValue::from_static("")),
    );
    h.insert(
        axum::http::header::CONTENT_LENGTH,
        HeaderValue::from_str(&info.length.to_string()).unwrap(),
    );
    h.insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    Ok(response)
}

pub async fn start_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(image): Path<String>,
) -> Result<Response, RegistryError> {
    auth::require_push(&state, &headers, &image).await?;

    let uuid = state.store.begin_upload();
    let location = format!("/v2/{image}/blobs/uploads/{uuid}");

    let mut response = StatusCode::ACCEPTED.into_response();
    let h = response.headers_mut();
    h.insert(axum::http::header::RANGE, HeaderValue::from_static("0-0"));
    h.insert(
        HeaderName::from_static("docker-upload-uuid"),
        HeaderValue::from_str(&uuid).unwrap(),
    );
    h.insert(axum::http::header::LOCATION, HeaderValue::from_str(&location).unwrap());
    Ok(response)
}

pub async fn patch_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((image, uuid)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, RegistryError> {
    auth::require_push(&state, &headers, &image).await?;

    let new_len = state.store.append_upload(&image, &uuid, &body).await?;
    let location = format!("/v2/{image}/blobs/uploads/{uuid}");

    let mut response = StatusCode::ACCEPTED.into_response();
    let h = response.headers_mut();
    h.insert(
        axum::http::header::RANGE,
        HeaderValue::from_str(&format!("0-{}", new_len.saturating_sub(1))).unwrap(),
    );
    h.insert(
        HeaderName::from_static("docker-upload-uuid"),
        HeaderValue::from_str(&uuid).unwrap(),
    );
    h.insert(axum::http::header::LOCATION, HeaderValue::from_str(&location).unwrap());
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct PutUploadQuery {
    pub digest: String,
}

pub async fn put_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((image, uuid)): Path<(String, String)>,
    Query(query): Query<PutUploadQuery>,
    body: Bytes,
) -> Result<Response, RegistryError> {
    auth::require_push(&state, &headers, &image).await?;

    if !body.is_empty() {
        state.store.append_upload(&image, &uuid, &body).await?;
    }
    let length = match state.store.commit_blob(&image, &uuid, &query.digest).await {
        Ok(length) => length,
        Err(RegistryError::DigestMismatch { expected, got }) => {
            tracing::error!(image, %expected, %got, "digest mismatch, expected {expected} got {got}");
            return Err(RegistryError::DigestMismatch { expected, got });
        }
        Err(e) => return Err(e),
    };

    let host = request_host(&headers);
    let origin = external_origin(&state.config, &headers, &host);
    let location = format!("{origin}/v2/{image}/blobs/{}", query.digest);

    let mut response = StatusCode::CREATED.into_response();
    let h = response.headers_mut();
    h.insert(
        HeaderName::from_static("content-range"),
        HeaderValue::from_str(&format!("0-{}", length.saturating_sub(1))).unwrap(),
    );
    h.insert(
        HeaderName::from_static("docker-content-digest"),
        HeaderValue::from_str(&query.digest).unwrap(),
    );
    h.insert(axum::http::header::LOCATION, HeaderValue::from_str(&location).unwrap());
    Ok(response)
}

// ---- Manifests -------------------------------------------------------------

pub async fn get_manifest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((image, reference)): Path<(String, String)>,
) -> Result<Response, RegistryError> {
    auth::require_pull(&state, &headers, &image).await?;

    let info = state
        .store
        .exists_manifest(&image, &reference)
        .await
        .ok_or(RegistryError::NotFound)?;
    let bytes = state.store.read_manifest(&image, &reference).await?;

    let mut response = bytes.into_response();
    let h = response.headers_mut();
    h.insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static(MANIFEST_MIME));
    h.insert(
        HeaderName::from_static("docker-content-digest"),
        HeaderValue::from_str(&info.digest).unwrap(),
    );
    h.insert(
        axum::http::header::CONTENT_LENGTH,
        HeaderValue::from_str(&info.length.to_string()).unwrap(),
    );
    Ok(response)
}

pub async fn head_manifest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((image, reference)): Path<(String, String)>,
) -> Result<Response, RegistryError> {
    auth::require_pull(&state, &headers, &image).await?;

    let info = state
        .store
        .exists_manifest(&image, &reference)
        .await
        .ok_or(RegistryError::NotFound)?;

    let mut response = StatusCode::OK.into_response();
    let h = response.headers_mut();
    h.insert(
        HeaderName::from_static("docker-content-digest"),
        HeaderValue::from_str(&info.digest).unwrap(),
    );
    h.insert(
        axum::http::header::CONTENT_LENGTH,
        HeaderValue::from_str(&info.length.to_string()).unwrap(),
    );
    h.insert(
        axum::http::header::LAST_MODIFIED,
        HeaderValue::from_str(&info.http_date).unwrap(),
    );
    h.insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static(MANIFEST_MIME));
    Ok(response)
}

pub async fn put_manifest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((image, tag)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, RegistryError> {
    auth::require_push(&state, &headers, &image).await?;

    tracing::debug!(image, tag, "put manifest");
    let (digest, http_date) = state.store.put_manifest(&image, &tag, &body).await?;

    let mut response = body.into_response();
    *response.status_mut() = StatusCode::CREATED;
    let h = response.headers_mut();
    h.insert(axum::http::header::LAST_MODIFIED, HeaderValue::from_str(&http_date).unwrap());
    h.insert(
        HeaderName::from_static("docker-content-digest"),
        HeaderValue::from_str(&digest).unwrap(),
    );
    h.insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static(MANIFEST_MIME));
    Ok(response)
}
