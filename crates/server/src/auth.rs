//! Authentication and authorization.
//!
//! Bearer tokens are verified against an external OAuth 2.0 token
//! introspection endpoint (RFC 7662); granted roles come from the `scope`
//! field of the introspection response.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use depot_core::config::AuthConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

/// Capability role required by an API route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Create, edit, upload, and process versions.
    UpdateEdit,
    /// Inspect versions, uploads, and jobs.
    UpdateView,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "update:edit" => Some(Self::UpdateEdit),
            "update:view" => Some(Self::UpdateView),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpdateEdit => "update:edit",
            Self::UpdateView => "update:view",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated request extension.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    /// Token subject, when the introspection endpoint reports one.
    pub subject: Option<String>,
    /// Roles granted by the token's scope.
    pub roles: HashSet<Role>,
}

impl AuthenticatedUser {
    pub fn has_role(&self, role: Role) -> bool {
        // Edit implies view.
        self.roles.contains(&role)
            || (role == Role::UpdateView && self.roles.contains(&Role::UpdateEdit))
    }

    /// Require a role, returning 403 when missing.
    pub fn require_role(&self, role: Role) -> ApiResult<()> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("missing required role: {role}")))
        }
    }
}

/// Wire shape of an RFC 7662 introspection response.
#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    sub: Option<String>,
}

/// Client for the external token introspection endpoint.
pub struct TokenIntrospector {
    http: reqwest::Client,
    config: AuthConfig,
}

impl TokenIntrospector {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Verify a bearer token and resolve its roles.
    pub async fn introspect(&self, token: &str) -> ApiResult<AuthenticatedUser> {
        let mut request = self
            .http
            .post(&self.config.introspection_url)
            .form(&[("token", token)]);
        if let Some(client_id) = &self.config.client_id {
            request = request.basic_auth(client_id, self.config.client_secret.as_deref());
        }

        let response = request.send().await.map_err(|e| {
            ApiError::DependencyUnavailable(format!("token introspection failed: {e}"))
        })?;
        if !response.status().is_success() {
            return Err(ApiError::DependencyUnavailable(format!(
                "token introspection returned {}",
                response.status()
            )));
        }

        let body: IntrospectionResponse = response.json().await.map_err(|e| {
            ApiError::DependencyUnavailable(format!("invalid introspection response: {e}"))
        })?;

        if !body.active {
            return Err(ApiError::Unauthorized(
                "token expired or revoked".to_string(),
            ));
        }

        let roles = body
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .filter_map(Role::parse)
            .collect();

        Ok(AuthenticatedUser {
            subject: body.sub,
            roles,
        })
    }
}

/// Extract the bearer token from the Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(&v[7..])
            } else {
                None
            }
        })
}

/// Authentication middleware.
///
/// A valid token attaches an [`AuthenticatedUser`] extension; an invalid
/// token fails the request outright. Requests without a token pass through
/// so public routes keep working, and protected handlers refuse later.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(token) = extract_bearer_token(&req) {
        let Some(introspector) = &state.introspector else {
            return Err(ApiError::Unauthorized(
                "token introspection is not configured".to_string(),
            ));
        };
        let user = introspector.introspect(token).await?;
        req.extensions_mut().insert(user);
    }

    Ok(next.run(req).await)
}

/// Require authentication (a token must have been presented).
pub fn require_auth(req: &Request) -> ApiResult<&AuthenticatedUser> {
    req.extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("update:edit"), Some(Role::UpdateEdit));
        assert_eq!(Role::parse("update:view"), Some(Role::UpdateView));
        assert_eq!(Role::parse("other:scope"), None);
    }

    #[test]
    fn test_edit_implies_view() {
        let user = AuthenticatedUser {
            subject: None,
            roles: [Role::UpdateEdit].into_iter().collect(),
        };
        assert!(user.require_role(Role::UpdateView).is_ok());
        assert!(user.require_role(Role::UpdateEdit).is_ok());

        let viewer = AuthenticatedUser {
            subject: None,
            roles: [Role::UpdateView].into_iter().collect(),
        };
        assert!(viewer.require_role(Role::UpdateEdit).is_err());
    }
}
