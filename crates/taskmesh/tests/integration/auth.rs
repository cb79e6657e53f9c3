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

//! Authentication rejection matrix at the service boundary.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use taskmesh::auth::{
    require_role, AuthError, Authenticator, TokenValidation, TokenValidator,
};
use taskmesh::models::user::Role;

struct TableValidator;

#[async_trait]
impl TokenValidator for TableValidator {
    async fn validate_token(&self, token: &str) -> Result<TokenValidation, AuthError> {
        match token {
            "admin-token" => Ok(TokenValidation {
                valid: true,
                user_id: "admin-1".into(),
                email: "admin@example.com".into(),
                role: "admin".into(),
            }),
            "user-token" => Ok(TokenValidation {
                valid: true,
                user_id: "user-1".into(),
                email: "user@example.com".into(),
                role: "user".into(),
            }),
            _ => Ok(TokenValidation {
                valid: false,
                user_id: String::new(),
                email: String::new(),
                role: String::new(),
            }),
        }
    }
}

fn authenticator() -> Authenticator {
    Authenticator::new(
        Arc::new(TableValidator),
        HashSet::from(["EventService.health".to_string()]),
    )
}

fn bearer(token: &str) -> HashMap<String, String> {
    HashMap::from([("authorization".to_string(), format!("bearer {token}"))])
}

/// A call without an authorization field to a non-allowlisted method is
/// unauthenticated.
#[tokio::test]
async fn missing_token_is_unauthenticated() {
    let result = authenticator()
        .authenticate("InventoryService.get_inventory_item", &HashMap::new())
        .await;
    assert!(matches!(result, Err(AuthError::Unauthenticated(_))));
}

/// An invalid token is unauthenticated.
#[tokio::test]
async fn invalid_token_is_unauthenticated() {
    let result = authenticator()
        .authenticate(
            "InventoryService.get_inventory_item",
            &bearer("forged-token"),
        )
        .await;
    assert!(matches!(result, Err(AuthError::Unauthenticated(_))));
}

/// A valid but under-privileged token fails the role gate with
/// permission_denied, while an admin passes.
#[tokio::test]
async fn under_privileged_token_is_permission_denied() {
    let auth = authenticator();

    let user_claims = auth
        .authenticate("InventoryService.delete_unit", &bearer("user-token"))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        require_role(&user_claims, &[Role::Admin]),
        Err(AuthError::PermissionDenied { actual: Role::User })
    ));

    let admin_claims = auth
        .authenticate("InventoryService.delete_unit", &bearer("admin-token"))
        .await
        .unwrap()
        .unwrap();
    assert!(require_role(&admin_claims, &[Role::Admin]).is_ok());
}

/// Allowlisted methods pass without any credentials.
#[tokio::test]
async fn allowlisted_method_needs_no_token() {
    let result = authenticator()
        .authenticate("EventService.health", &HashMap::new())
        .await
        .unwrap();
    assert!(result.is_none());
}
