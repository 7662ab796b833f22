//! # Authentication Middleware
//!
//! Bearer token middleware that establishes who is calling.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{actor_id}:{secret}
//! ```
//!
//! `role` is one of `buyer`, `seller`, `admin`; `actor_id` is a UUID.
//! The `system` role is reserved for the deadline scheduler and is never
//! accepted from a token.
//!
//! The asserted role only says which *kind* of caller this is. Whether a
//! buyer or seller may act on a given order is decided by the engine from
//! the order record.
//!
//! When no `AUTH_TOKEN` is configured (development) the secret segment is
//! not checked, but the role and actor id are still required.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use gafx_core::{Actor, ActorId, Role};

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller, available to handlers via
/// Axum's `FromRequestParts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    pub actor_id: ActorId,
}

impl CallerIdentity {
    /// The engine-facing view of this caller.
    pub fn actor(&self) -> Actor {
        Actor::new(self.actor_id, self.role)
    }
}

impl From<CallerIdentity> for Actor {
    fn from(caller: CallerIdentity) -> Self {
        caller.actor()
    }
}

/// Extracts the identity that the auth middleware injected into extensions.
/// Returns 401 if no identity is present.
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .copied()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets.
///
/// When lengths differ, performs a dummy comparison so that timing does
/// not reveal the expected length.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a bearer token of the form `{role}:{actor_id}:{secret}`.
///
/// With `expected_secret == None` the secret segment is accepted as is.
pub fn parse_bearer_token(
    provided: &str,
    expected_secret: Option<&str>,
) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();
    let [role_str, actor_str, secret] = parts.as_slice() else {
        return Err("invalid token format, expected {role}:{actor_id}:{secret}".into());
    };

    if let Some(expected) = expected_secret {
        if !constant_time_token_eq(secret, expected) {
            return Err("invalid bearer token".into());
        }
    }

    let role: Role = role_str
        .parse()
        .map_err(|_| format!("unknown role: {role_str}"))?;
    if role == Role::System {
        return Err("the system role cannot be asserted by a client".into());
    }

    let actor_uuid = actor_str
        .parse::<Uuid>()
        .map_err(|e| format!("invalid actor_id: {e}"))?;
    if actor_uuid.is_nil() {
        return Err("invalid actor_id: nil UUID is reserved".into());
    }

    Ok(CallerIdentity {
        role,
        actor_id: ActorId::from_uuid(actor_uuid),
    })
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the Bearer token and inject the [`CallerIdentity`] into
/// request extensions for downstream handlers.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let provided = match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) => token,
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                return unauthorized_response("authorization header must use Bearer scheme");
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            return unauthorized_response("missing authorization header");
        }
    };

    match parse_bearer_token(provided, expected.as_deref()) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(msg) => {
            tracing::warn!(reason = %msg, "authentication failed");
            unauthorized_response(&msg)
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn whoami(caller: CallerIdentity) -> String {
        format!("{}:{}", caller.role, caller.actor_id)
    }

    fn test_app(token: Option<String>) -> Router {
        Router::new()
            .route("/test", get(whoami))
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(AuthConfig { token }))
    }

    async fn call(app: Router, header: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/test");
        if let Some(h) = header {
            builder = builder.header("Authorization", h);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn valid_token_injects_identity() {
        let id = Uuid::new_v4();
        let (status, body) = call(
            test_app(Some("s3cret".into())),
            Some(&format!("Bearer buyer:{id}:s3cret")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, format!("buyer:{id}"));
    }

    #[tokio::test]
    async fn wrong_secret_rejected() {
        let id = Uuid::new_v4();
        let (status, body) = call(
            test_app(Some("s3cret".into())),
            Some(&format!("Bearer seller:{id}:nope")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let err: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(err["error"]["code"], "UNAUTHORIZED");
        assert!(err["error"]["message"].as_str().unwrap().contains("invalid"));
    }

    #[tokio::test]
    async fn missing_header_rejected() {
        let (status, body) = call(test_app(Some("s3cret".into())), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("missing"));
    }

    #[tokio::test]
    async fn non_bearer_scheme_rejected() {
        let (status, body) = call(test_app(None), Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Bearer scheme"));
    }

    #[tokio::test]
    async fn dev_mode_skips_secret_but_requires_identity() {
        let id = Uuid::new_v4();
        let (status, _) = call(test_app(None), Some(&format!("Bearer admin:{id}:anything"))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(test_app(None), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(test_app(None), Some("Bearer just-a-secret")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn system_role_cannot_be_asserted() {
        let id = Uuid::new_v4();
        let err = parse_bearer_token(&format!("system:{id}:x"), None).unwrap_err();
        assert!(err.contains("system"));
    }

    #[test]
    fn nil_actor_rejected() {
        let err = parse_bearer_token(&format!("admin:{}:x", Uuid::nil()), None).unwrap_err();
        assert!(err.contains("nil"));
    }

    #[test]
    fn unknown_role_rejected() {
        let id = Uuid::new_v4();
        assert!(parse_bearer_token(&format!("merchant:{id}:x"), None)
            .unwrap_err()
            .contains("unknown role"));
    }

    #[test]
    fn secret_may_contain_colons() {
        let id = Uuid::new_v4();
        let caller = parse_bearer_token(&format!("seller:{id}:a:b:c"), Some("a:b:c")).unwrap();
        assert_eq!(caller.role, Role::Seller);
        assert_eq!(caller.actor().id, ActorId::from_uuid(id));
    }

    #[test]
    fn constant_time_eq_behaviour() {
        assert!(constant_time_token_eq("abc", "abc"));
        assert!(!constant_time_token_eq("abc", "abd"));
        assert!(!constant_time_token_eq("abc", "abcd"));
    }

    #[test]
    fn auth_config_debug_redacts() {
        let dbg = format!(
            "{:?}",
            AuthConfig {
                token: Some("hunter2".into())
            }
        );
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("REDACTED"));
    }
}
