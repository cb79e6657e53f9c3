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

//! Client seams for the orchestrator's collaborators. The transports behind
//! them (connection handling, wire glue) are supplied by the wiring layer;
//! the orchestrator only sees these traits and their error taxonomy.

use async_trait::async_trait;

use crate::models::inventory::InventoryItem;
use crate::models::task::Task;
use crate::retry::Retryable;

/// Errors surfaced by collaborator clients.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Network or service hiccup; eligible for retry
    #[error("transient failure: {0}")]
    Transient(String),

    /// The collaborator cannot be reached at all
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// The referenced entity does not exist on the collaborator
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity class
        entity: &'static str,
        /// The missing identifier
        id: String,
    },

    /// The call failed permanently
    #[error("call failed: {0}")]
    Failed(String),
}

impl Retryable for ClientError {
    fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transient(_) | ClientError::Unavailable(_))
    }
}

/// Request to create a task on the task service.
#[derive(Debug, Clone)]
pub struct NewTaskRequest {
    /// Task name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Owner user id
    pub owner_id: String,
    /// Tag values to attach (name to text value)
    pub tags: Vec<(String, String)>,
}

/// Client for the task service.
#[async_trait]
pub trait TaskClient: Send + Sync {
    /// Fetches a task by id.
    async fn get_task(&self, task_id: &str) -> Result<Task, ClientError>;

    /// Creates a task.
    async fn add_task(&self, request: NewTaskRequest) -> Result<Task, ClientError>;
}

/// Client for the inventory service.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Fetches an item by id.
    async fn get_item(&self, item_id: &str) -> Result<InventoryItem, ClientError>;

    /// Sets an item's level with a reason tag; returns the updated item.
    async fn update_level(
        &self,
        item_id: &str,
        new_level: f64,
        reason: &str,
    ) -> Result<InventoryItem, ClientError>;

    /// Writes one metadata key on an item.
    async fn set_item_metadata(
        &self,
        item_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ClientError>;

    /// Every item with its current level (the inventory status sweep).
    async fn inventory_status(&self) -> Result<Vec<InventoryItem>, ClientError>;
}
