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

//! # Repository Contracts
//!
//! Abstract persistence contracts for tasks, users, and inventory. The core
//! reads and writes through these traits; storage engines live behind them
//! and are responsible for their own internal concurrency. Errors surface as
//! `not_found`, `conflict`, or `storage_failure`.
//!
//! The in-memory backend in [`memory`] backs tests and default wiring.

pub mod memory;

use async_trait::async_trait;

use crate::models::inventory::{InventoryItem, Unit};
use crate::models::task::{Task, TaskStage};
use crate::models::user::User;

/// Errors surfaced by repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity class
        entity: &'static str,
        /// The missing identifier
        id: String,
    },

    /// A uniqueness constraint was violated
    #[error("conflict on {entity}: {detail}")]
    Conflict {
        /// Entity class
        entity: &'static str,
        /// What collided
        detail: String,
    },

    /// The storage engine failed
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Persistence contract for tasks.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Stores a new task; fails with `conflict` on a duplicate id.
    async fn create(&self, task: Task) -> Result<Task, RepositoryError>;

    /// Fetches a task by id.
    async fn get(&self, id: &str) -> Result<Task, RepositoryError>;

    /// Replaces an existing task.
    async fn update(&self, task: Task) -> Result<Task, RepositoryError>;

    /// Deletes a task by id.
    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;

    /// Tasks currently in `stage`.
    async fn list_by_stage(&self, stage: TaskStage) -> Result<Vec<Task>, RepositoryError>;

    /// Tasks in `stage` owned by `user_id`.
    async fn list_by_stage_and_user(
        &self,
        stage: TaskStage,
        user_id: &str,
    ) -> Result<Vec<Task>, RepositoryError>;

    /// Tasks owned by `user_id`, any stage.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Task>, RepositoryError>;

    /// Number of tasks in `stage`.
    async fn count_by_stage(&self, stage: TaskStage) -> Result<usize, RepositoryError>;

    /// Fetches the tasks for the given ids; missing ids are skipped.
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Task>, RepositoryError>;
}

/// Persistence contract for users; email uniqueness is enforced here.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Stores a new user; fails with `conflict` on a duplicate id or email.
    async fn create(&self, user: User) -> Result<User, RepositoryError>;

    /// Fetches a user by id.
    async fn get_by_id(&self, id: &str) -> Result<User, RepositoryError>;

    /// Fetches a user by email.
    async fn get_by_email(&self, email: &str) -> Result<User, RepositoryError>;

    /// Replaces an existing user, keeping the email index coherent.
    async fn update(&self, user: User) -> Result<User, RepositoryError>;

    /// Deletes a user by id.
    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;

    /// Every stored user.
    async fn list_all(&self) -> Result<Vec<User>, RepositoryError>;
}

/// Persistence contract for inventory items and their units.
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// Stores a new item; fails with `conflict` on a duplicate id.
    async fn create_item(&self, item: InventoryItem) -> Result<InventoryItem, RepositoryError>;

    /// Fetches an item by id.
    async fn get_item(&self, id: &str) -> Result<InventoryItem, RepositoryError>;

    /// Replaces an existing item.
    async fn update_item(&self, item: InventoryItem) -> Result<InventoryItem, RepositoryError>;

    /// Deletes an item by id.
    async fn delete_item(&self, id: &str) -> Result<(), RepositoryError>;

    /// Every stored item.
    async fn list_items(&self) -> Result<Vec<InventoryItem>, RepositoryError>;

    /// Stores a new unit; fails with `conflict` on a duplicate id.
    async fn create_unit(&self, unit: Unit) -> Result<Unit, RepositoryError>;

    /// Fetches a unit by id.
    async fn get_unit(&self, id: &str) -> Result<Unit, RepositoryError>;

    /// Replaces an existing unit.
    async fn update_unit(&self, unit: Unit) -> Result<Unit, RepositoryError>;

    /// Deletes a unit by id.
    async fn delete_unit(&self, id: &str) -> Result<(), RepositoryError>;

    /// Every stored unit.
    async fn list_units(&self) -> Result<Vec<Unit>, RepositoryError>;
}
