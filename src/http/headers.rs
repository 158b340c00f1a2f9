//! Default response headers, external URL computation, and the
//! `WWW-Authenticate` challenge (spec.md §4.E).

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

const PRODUCT: &str = "quayside/0.1.0";

/// Headers present on every response, per spec.md §4.E. Both
/// `Docker-Distribution-Api-Tag` (the source's, possibly-typo'd name) and
/// `Docker-Distribution-Api-Version` (what Docker clients actually check)
/// are sent, per §9's Open Question resolution.
pub async fn apply_default_headers(request: axum::extract::Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("server"),
        HeaderValue::from_static(PRODUCT),
    );
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static(
            "sandbox allow-forms allow-modals allow-popups allow-presentation allow-scripts allow-top-navigation",
        ),
    );
    headers.insert(
        HeaderName::from_static("x-xss-protection"),
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(
        HeaderName::from_static("docker-distribution-api-tag"),
        HeaderValue::from_static("registry/2.0"),
    );
    headers.insert(
        HeaderName::from_static("docker-distribution-api-version"),
        HeaderValue::from_static("registry/2.0"),
    );
    response
}

/// Sets `WWW-Authenticate` on a 401 response. Always includes the bearer
/// challenge with an absolute `<realm>/v2/token` realm and service (spec.md
/// §4.E); additionally includes a basic challenge when the request was an
/// anonymous pull attempt (so the client knows it can retry with credentials
/// rather than a token). `realm_base` is the external origin computed by the
/// caller (empty string falls back to a relative realm, e.g. when no `Host`
/// header was present on the request).
pub fn apply_unauthorized_challenge(headers: &mut HeaderMap, anonymous_pull_attempt: bool, realm_base: &str) {
    let realm = format!("{realm_base}/v2/token");
    let mut challenge = format!(r#"Bearer realm="{realm}", service="{realm}""#);
    if anonymous_pull_attempt {
        challenge.push_str(&format!(r#", BASIC realm="{PRODUCT}""#));
    }
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        headers.insert(HeaderName::from_static("www-authenticate"), value);
    }
}

/// External origin computation per spec.md §6: request `Host` (port
/// stripped) and configured server port, overridden by `X-Forwarded-Port`
/// then by the static proxy host/port override; scheme is `https` when
/// TLS is configured.
pub fn external_origin(config: &crate::config::Config, headers: &HeaderMap, host: &str) -> String {
    let forwarded_port = headers
        .get("x-forwarded-port")
        .and_then(|v| v.to_str().ok());
    config.external_origin(host, forwarded_port)
}
