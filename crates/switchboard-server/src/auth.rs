//! Handshake authentication.
//!
//! The credential is an opaque bearer token carried either in the
//! `Authorization` header or, for browsers that cannot set headers on a
//! WebSocket upgrade, in the `token` query parameter. It is checked before
//! the upgrade completes; a failure is an HTTP 401, never an envelope.

use std::collections::HashMap;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use switchboard_core::types::Principal;
use switchboard_settings::AuthSettings;

/// Subject given to connections admitted without a credential.
pub const ANONYMOUS_SUBJECT: &str = "anonymous";

/// Maps a presented credential to a principal.
pub trait Authenticator: Send + Sync {
    /// `None` rejects the handshake.
    fn authenticate(&self, credential: Option<&str>) -> Option<Principal>;
}

/// Token table loaded from settings.
#[derive(Clone, Debug, Default)]
pub struct StaticTokenAuthenticator {
    grants: HashMap<String, Principal>,
    allow_anonymous: bool,
}

impl StaticTokenAuthenticator {
    /// Build from the `server.auth` settings section.
    pub fn from_settings(settings: &AuthSettings) -> Self {
        let grants = settings
            .tokens
            .iter()
            .map(|grant| {
                (
                    grant.token.clone(),
                    Principal {
                        subject: grant.subject.clone(),
                        tenant: grant.tenant.clone(),
                    },
                )
            })
            .collect();
        Self {
            grants,
            allow_anonymous: settings.allow_anonymous,
        }
    }

    /// Admit everyone; for tests and local tooling.
    pub fn open() -> Self {
        Self {
            grants: HashMap::new(),
            allow_anonymous: true,
        }
    }

    /// Add one token.
    #[must_use]
    pub fn with_token(mut self, token: &str, principal: Principal) -> Self {
        let _ = self.grants.insert(token.to_owned(), principal);
        self
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate(&self, credential: Option<&str>) -> Option<Principal> {
        match credential {
            Some(token) => self.grants.get(token).cloned(),
            None if self.allow_anonymous => Some(Principal::unscoped(ANONYMOUS_SUBJECT)),
            None => None,
        }
    }
}

/// Pull the credential from `Authorization: Bearer <token>`, falling back
/// to the `token` query parameter.
pub fn extract_credential(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    from_header
        .or_else(|| query_token.filter(|t| !t.is_empty()))
        .map(str::to_owned)
}
