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

//! Bearer-token middleware: collects the call metadata, delegates to the
//! core authenticator, and attaches the claims to the request.

use std::collections::HashMap;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use taskmesh::auth::AuthError;

use crate::api::AppState;

/// Rejects unauthenticated requests to non-allowlisted routes; on success
/// the request carries a `Claims` extension.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let method = request.uri().path().to_string();
    let mut metadata = HashMap::new();
    if let Some(value) = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
    {
        metadata.insert("authorization".to_string(), value.to_string());
    }

    match state.authenticator.authenticate(&method, &metadata).await {
        Ok(Some(claims)) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Ok(None) => next.run(request).await,
        Err(AuthError::PermissionDenied { .. }) => {
            (StatusCode::FORBIDDEN, "permission denied").into_response()
        }
        Err(e) => (StatusCode::UNAUTHORIZED, e.to_string()).into_response(),
    }
}
