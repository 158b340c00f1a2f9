//! Request-level auth extraction: bridges the `Authorization` header (Bearer
//! token or Basic credentials, or its absence) to an access decision via
//! [`crate::auth::AccessPolicy`] and [`crate::auth::token::TokenCache`].
//!
//! Shaped after the teacher's `extract_user_from_auth` (Bearer/Basic
//! branching), generalized to this spec's opaque-token + config-file-account
//! model instead of JWT + database lookups.

use axum::http::HeaderMap;
use base64::Engine;

use super::headers::external_origin;
use super::state::AppState;
use crate::auth::AccessPolicy;
use crate::error::RegistryError;

struct Resolved {
    admin: bool,
    pull: bool,
    push: bool,
    anonymous_attempt: bool,
    realm: String,
}

/// A caller resolved but lacking the right being checked: an un-credentialed
/// (anonymous) caller gets `UNAUTHORIZED` so it knows to retry with
/// credentials (spec.md §7 — "no valid credential or token"); a caller that
/// presented valid credentials but lacks the specific right gets `DENIED`.
fn access_denied(resolved: &Resolved) -> RegistryError {
    if resolved.anonymous_attempt {
        RegistryError::Unauthorized {
            anonymous_pull_attempt: true,
            realm: resolved.realm.clone(),
        }
    } else {
        RegistryError::Denied
    }
}

fn request_host(headers: &HeaderMap) -> &str {
    headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Decodes a base64 `user:pass` pair from a `Basic` credential. Returns
/// `None` on malformed base64/UTF-8 so each caller can pick the
/// `RegistryError` variant appropriate to its endpoint (`Unauthorized` for
/// the registry surface, `Denied` for the token endpoint).
fn decode_basic(value: &str) -> Option<(String, String)> {
    let decoded = base64::engine::general_purpose::STANDARD.decode(value).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    match text.split_once(':') {
        Some((user, pass)) => Some((user.to_string(), pass.to_string())),
        None => Some((text, String::new())),
    }
}

async fn resolve(state: &AppState, headers: &HeaderMap, image: Option<&str>) -> Result<Resolved, RegistryError> {
    let realm = external_origin(&state.config, headers, request_host(headers));
    let unauthorized = |anonymous_pull_attempt: bool| RegistryError::Unauthorized {
        anonymous_pull_attempt,
        realm: realm.clone(),
    };

    if let Some(header_value) = headers.get(axum::http::header::AUTHORIZATION) {
        let value = header_value.to_str().map_err(|_| unauthorized(false))?;

        if let Some(token) = value.strip_prefix("Bearer ") {
            let record = state.tokens.touch(token).await.ok_or_else(|| unauthorized(false))?;
            let (pull, push) = match image {
                Some(img) => (record.allows_pull(img), record.allows_push(img)),
                None => (!record.images_pull.is_empty(), !record.images_push.is_empty()),
            };
            return Ok(Resolved {
                admin: record.admin,
                pull,
                push,
                anonymous_attempt: false,
                realm: realm.clone(),
            });
        }

        if let Some(basic) = value.strip_prefix("Basic ") {
            let (user, pass) = decode_basic(basic).ok_or_else(|| unauthorized(false))?;
            let policy = AccessPolicy::new(&state.config);
            if !policy.authenticate(&user, &pass, false) {
                return Err(unauthorized(false));
            }
            let admin = policy.has_admin(&user);
            let rights = match image {
                Some(img) => policy.image_rights(&user, img),
                None => policy.account_rights(&user),
            };
            return Ok(Resolved {
                admin,
                pull: rights.pull,
                push: rights.push,
                anonymous_attempt: false,
                realm: realm.clone(),
            });
        }

        return Err(unauthorized(false));
    }

    let policy = AccessPolicy::new(&state.config);
    if !policy.authenticate("", "", true) {
        return Err(unauthorized(true));
    }
    let rights = match image {
        Some(img) => policy.image_rights("anonymous", img),
        None => policy.account_rights("anonymous"),
    };
    Ok(Resolved {
        admin: false,
        pull: rights.pull,
        push: rights.push,
        anonymous_attempt: true,
        realm: realm.clone(),
    })
}

pub async fn require_pull(state: &AppState, headers: &HeaderMap, image: &str) -> Result<(), RegistryError> {
    let resolved = resolve(state, headers, Some(image)).await?;
    if resolved.admin || resolved.pull {
        Ok(())
    } else {
        Err(access_denied(&resolved))
    }
}

pub async fn require_push(state: &AppState, headers: &HeaderMap, image: &str) -> Result<(), RegistryError> {
    let resolved = resolve(state, headers, Some(image)).await?;
    if resolved.admin || resolved.push {
        Ok(())
    } else {
        Err(access_denied(&resolved))
    }
}

/// The `GET /v2` probe accepts any authenticated caller, including anonymous.
pub async fn require_any_authenticated(state: &AppState, headers: &HeaderMap) -> Result<(), RegistryError> {
    resolve(state, headers, None).await?;
    Ok(())
}

pub async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), RegistryError> {
    let resolved = resolve(state, headers, None).await?;
    if resolved.admin {
        Ok(())
    } else {
        Err(access_denied(&resolved))
    }
}

/// Authenticates basic credentials for the token endpoint, returning whether
/// the account is admin plus its image-scoped or account-wide rights.
pub async fn authenticate_basic_for_token(
    state: &AppState,
    headers: &HeaderMap,
    image_scope: Option<&str>,
) -> Result<(bool, Vec<String>, Vec<String>), RegistryError> {
    let header_value = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(RegistryError::Denied)?;
    let value = header_value.to_str().map_err(|_| RegistryError::Denied)?;
    let basic = value.strip_prefix("Basic ").ok_or(RegistryError::Denied)?;
    let (user, pass) = decode_basic(basic).ok_or(RegistryError::Denied)?;

    let policy = AccessPolicy::new(&state.config);
    if !policy.authenticate(&user, &pass, false) {
        return Err(RegistryError::Denied);
    }

    let admin = policy.has_admin(&user);
    match image_scope {
        Some(image) => {
            let rights = policy.image_rights(&user, image);
            let (pull, push) = crate::auth::token::rights_to_lists(image, rights);
            Ok((admin, pull, push))
        }
        None => {
            let (pull, push) = policy.account_image_lists(&user);
            Ok((admin, pull, push))
        }
    }
}
