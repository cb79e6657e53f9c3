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

//! HTTP token validator: forwards tokens to the central user service's
//! `validate_token` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{AuthError, TokenValidation, TokenValidator};

#[derive(Serialize)]
struct ValidateTokenRequest<'a> {
    access_token: &'a str,
}

/// Validates tokens against the user service over HTTP.
pub struct HttpTokenValidator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTokenValidator {
    /// Creates a validator POSTing to `endpoint` with a bounded timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl TokenValidator for HttpTokenValidator {
    async fn validate_token(&self, token: &str) -> Result<TokenValidation, AuthError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ValidateTokenRequest {
                access_token: token,
            })
            .send()
            .await
            .map_err(|e| AuthError::ValidatorUnavailable(e.to_string()))?;

        let response = response
            .error_for_status()
            .map_err(|e| AuthError::ValidatorUnavailable(e.to_string()))?;

        response
            .json::<TokenValidation>()
            .await
            .map_err(|e| AuthError::ValidatorUnavailable(e.to_string()))
    }
}
