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

//! # Error Taxonomy
//!
//! Central error types shared across the taskmesh subsystems. Every error a
//! service boundary can surface maps onto one of the [`ServiceError`]
//! variants; subsystem-local errors (bus, relay, triggers, policies) convert
//! into this taxonomy at the boundary.
//!
//! Internal errors carry a correlation id so a failure reported to a user can
//! be traced back through the logs.

use uuid::Uuid;

/// Machine-readable reason attached to a `Conflict` error.
///
/// Conflicts are policy or uniqueness violations; the reason distinguishes
/// which rule fired so callers can react programmatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// A unique constraint (e.g. user email) was violated
    DuplicateKey,
    /// The conflict policy rejected new work because in-flight work exists
    Blocked,
    /// The conflict policy rejected work that would surpass in-flight steps
    BlockedByPolicy,
    /// A required selection could not be satisfied from an empty pool
    Unassignable,
    /// A state-machine invariant would be violated by the requested change
    InvalidTransition,
}

impl ConflictReason {
    /// Returns the wire representation of the reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictReason::DuplicateKey => "duplicate_key",
            ConflictReason::Blocked => "blocked",
            ConflictReason::BlockedByPolicy => "blocked_by_policy",
            ConflictReason::Unassignable => "unassignable",
            ConflictReason::InvalidTransition => "invalid_transition",
        }
    }
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The service-boundary error taxonomy.
///
/// Handlers running inside the event bus never propagate these to the
/// publisher; RPC-facing code surfaces them verbatim. `Transient` failures
/// are eligible for retry with backoff, `Degraded` signals a collaborator
/// outage the caller should tolerate.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Malformed input; surfaced to the caller
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity class (e.g. "task", "user", "item", "unit")
        entity: &'static str,
        /// The identifier that failed to resolve
        id: String,
    },

    /// Uniqueness or policy violation with a structured reason
    #[error("conflict ({reason}): {detail}")]
    Conflict {
        /// Which rule fired
        reason: ConflictReason,
        /// Human-oriented description
        detail: String,
    },

    /// The call carried no usable credentials
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Credentials were valid but insufficient for the operation
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Network or storage hiccup; eligible for retry with backoff
    #[error("transient failure: {0}")]
    Transient(String),

    /// A collaborator is unavailable; the caller continues in reduced mode
    #[error("degraded: {0}")]
    Degraded(String),

    /// Bug-class failure; logged with context, surfaced opaquely
    #[error("internal error [{correlation_id}]")]
    Internal {
        /// Correlation id included in the user-visible message and the logs
        correlation_id: Uuid,
    },
}

impl ServiceError {
    /// Creates an `Internal` error with a fresh correlation id, logging the
    /// underlying cause alongside it.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        let correlation_id = Uuid::new_v4();
        tracing::error!(%correlation_id, %cause, "internal error");
        ServiceError::Internal { correlation_id }
    }

    /// Returns true if the error is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }
}
