//! Identity provider seam and request authentication.
//!
//! Identity issuance lives outside this service. The server only maps an
//! opaque bearer token to a [`Principal`].

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use sewa_shared::Principal;
use subtle::ConstantTimeEq;

use crate::api::AppState;
use crate::error::ServiceError;

pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token, or `None` for an unknown token.
    fn authenticate(&self, token: &str) -> Option<Principal>;
}

/// Static token table, loaded from the seed file.
#[derive(Debug, Default, Clone)]
pub struct TokenDirectory {
    entries: Vec<(String, Principal)>,
}

impl TokenDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, principal: Principal) {
        self.entries.push((token.into(), principal));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IdentityProvider for TokenDirectory {
    fn authenticate(&self, token: &str) -> Option<Principal> {
        if token.is_empty() {
            return None;
        }
        let presented = token.as_bytes();

        // Scan every entry so the lookup time does not depend on the match.
        let mut found = None;
        for (known, principal) in &self.entries {
            let known = known.as_bytes();
            if known.len() == presented.len() && known.ct_eq(presented).unwrap_u8() == 1 {
                found = Some(principal.clone());
            }
        }
        found
    }
}

/// Bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ").map(str::trim)
}

/// Resolve the caller of a request, if any.
pub fn principal_from(
    identity: &Arc<dyn IdentityProvider>,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Option<Principal> {
    let token = bearer_token(headers).or(query_token)?;
    identity.authenticate(token)
}

/// Extractor for handlers that require an authenticated caller.
pub struct Authenticated(pub Principal);

#[axum::async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        principal_from(&state.identity, &parts.headers, None)
            .map(Authenticated)
            .ok_or(ServiceError::Unauthenticated)
    }
}

/// Guard for freelancer-only operations.
pub fn require_seller(principal: &Principal) -> Result<(), ServiceError> {
    if principal.role.can_sell() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "Only freelancers can view received bookings".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use sewa_shared::{Role, UserId};

    fn directory() -> (TokenDirectory, Principal) {
        let principal = Principal {
            id: UserId::new(),
            username: "sita".into(),
            role: Role::Customer,
        };
        let mut dir = TokenDirectory::new();
        dir.insert("tok-sita", principal.clone());
        (dir, principal)
    }

    #[test]
    fn test_token_lookup() {
        let (dir, principal) = directory();
        assert_eq!(dir.authenticate("tok-sita"), Some(principal));
        assert_eq!(dir.authenticate("tok-sit"), None);
        assert_eq!(dir.authenticate(""), None);
    }

    #[test]
    fn test_header_wins_over_query() {
        let (dir, principal) = directory();
        let identity: Arc<dyn IdentityProvider> = Arc::new(dir);

        let mut headers = HeaderMap::new();
        assert_eq!(principal_from(&identity, &headers, Some("tok-sita")), Some(principal.clone()));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        assert_eq!(principal_from(&identity, &headers, Some("tok-sita")), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok-sita"));
        assert_eq!(principal_from(&identity, &headers, None), Some(principal));
    }

    #[test]
    fn test_require_seller() {
        let mut principal = directory().1;
        assert!(matches!(require_seller(&principal), Err(ServiceError::Forbidden(_))));
        principal.role = Role::Both;
        assert!(require_seller(&principal).is_ok());
    }
}
