/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! # Boundary Authenticator
//!
//! Token validation at the service boundary. Incoming calls carry an
//! `authorization` metadata field of the form `bearer <token>`
//! (case-insensitive prefix); the token is forwarded to the central user
//! service's `validate_token` operation and the resulting claims are
//! attached to the request. Any failure maps to `unauthenticated`. A
//! per-method allowlist bypasses validation entirely.

mod http;

pub use http::HttpTokenValidator;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::user::Role;

/// Metadata key carrying the bearer credential.
const AUTHORIZATION_KEY: &str = "authorization";
/// Required credential scheme prefix, compared case-insensitively.
const BEARER_PREFIX: &str = "bearer ";

/// Authenticated principal attributes attached to a request context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Authenticated user id
    pub user_id: String,
    /// Authenticated email
    pub email: String,
    /// Normalized role
    pub role: Role,
}

/// Result of a `validate_token` call against the user service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenValidation {
    /// Whether the token is valid
    pub valid: bool,
    /// User id for a valid token
    pub user_id: String,
    /// Email for a valid token
    pub email: String,
    /// Raw role string as the user service reports it
    pub role: String,
}

/// Seam for the central user service's token validation RPC.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validates an access token, returning the principal attributes.
    async fn validate_token(&self, token: &str) -> Result<TokenValidation, AuthError>;
}

/// Authentication and authorization failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No usable credentials on the call
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Valid credentials but insufficient role
    #[error("permission denied: role '{actual}' not in required set")]
    PermissionDenied {
        /// The caller's role
        actual: Role,
    },

    /// The validator could not be reached within its deadline
    #[error("token validation failed: {0}")]
    ValidatorUnavailable(String),
}

impl AuthError {
    /// Collapses validator failures into the `unauthenticated` surface the
    /// boundary reports, per the failure policy.
    pub fn as_unauthenticated(self) -> AuthError {
        match self {
            AuthError::PermissionDenied { .. } => self,
            AuthError::Unauthenticated(_) => self,
            AuthError::ValidatorUnavailable(msg) => AuthError::Unauthenticated(msg),
        }
    }
}

/// Unary interceptor applied at the service boundary.
pub struct Authenticator {
    validator: Arc<dyn TokenValidator>,
    allowlist: HashSet<String>,
    validation_timeout: Duration,
}

impl Authenticator {
    /// Default deadline for validate_token calls.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates an authenticator over the given validator with a per-method
    /// allowlist of fully-qualified names that bypass validation.
    pub fn new(validator: Arc<dyn TokenValidator>, allowlist: HashSet<String>) -> Self {
        Self {
            validator,
            allowlist,
            validation_timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the validation deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }

    /// True when the method bypasses validation.
    pub fn is_allowlisted(&self, method: &str) -> bool {
        self.allowlist.contains(method)
    }

    /// Authenticates a call to `method` carrying `metadata`.
    ///
    /// Returns `Ok(None)` for allowlisted methods, `Ok(Some(claims))` on
    /// success, and `Err(Unauthenticated)` for every failure mode: missing
    /// field, malformed scheme, invalid token, or validator outage.
    pub async fn authenticate(
        &self,
        method: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<Option<Claims>, AuthError> {
        if self.is_allowlisted(method) {
            debug!(method, "allowlisted method, skipping token validation");
            return Ok(None);
        }

        let header = metadata
            .get(AUTHORIZATION_KEY)
            .ok_or_else(|| AuthError::Unauthenticated("missing authorization".to_string()))?;

        let token = extract_bearer_token(header)
            .ok_or_else(|| AuthError::Unauthenticated("malformed authorization".to_string()))?;

        let validation =
            tokio::time::timeout(self.validation_timeout, self.validator.validate_token(token))
                .await
                .map_err(|_| AuthError::Unauthenticated("token validation timed out".to_string()))?
                .map_err(AuthError::as_unauthenticated)?;

        if !validation.valid {
            warn!(method, "rejected invalid token");
            return Err(AuthError::Unauthenticated("invalid token".to_string()));
        }

        Ok(Some(Claims {
            user_id: validation.user_id,
            email: validation.email,
            role: Role::normalize(&validation.role),
        }))
    }
}

/// Strips the `bearer ` prefix (case-insensitive) and returns the token.
fn extract_bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    if header.len() <= BEARER_PREFIX.len() {
        return None;
    }
    let (prefix, token) = header.split_at(BEARER_PREFIX.len());
    if prefix.eq_ignore_ascii_case(BEARER_PREFIX) {
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    } else {
        None
    }
}

/// Rejects callers whose role is not in `allowed`.
pub fn require_role(claims: &Claims, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.contains(&claims.role) {
        Ok(())
    } else {
        Err(AuthError::PermissionDenied {
            actual: claims.role,
        })
    }
}
