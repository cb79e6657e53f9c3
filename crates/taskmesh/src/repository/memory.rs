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

//! # In-Memory Repositories
//!
//! Map-backed implementations of the repository contracts, safe for
//! concurrent use. Keys follow the persisted layout's prefix discipline
//! (`task:<id>`, `user:<id>`, `email:<addr>`, `item:<id>`, `unit:<id>`) so a
//! durable engine can swap in behind the same shape.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{InventoryRepository, RepositoryError, TaskRepository, UserRepository};
use crate::models::inventory::{InventoryItem, Unit};
use crate::models::task::{Task, TaskStage};
use crate::models::user::User;

fn task_key(id: &str) -> String {
    format!("task:{id}")
}

fn user_key(id: &str) -> String {
    format!("user:{id}")
}

fn email_key(email: &str) -> String {
    format!("email:{}", email.to_ascii_lowercase())
}

fn item_key(id: &str) -> String {
    format!("item:{id}")
}

fn unit_key(id: &str) -> String {
    format!("unit:{id}")
}

/// In-memory task repository.
#[derive(Default)]
pub struct MemoryTaskRepository {
    tasks: RwLock<HashMap<String, Task>>,
}

impl MemoryTaskRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskRepository {
    async fn create(&self, task: Task) -> Result<Task, RepositoryError> {
        let mut tasks = self.tasks.write();
        let key = task_key(&task.id);
        if tasks.contains_key(&key) {
            return Err(RepositoryError::Conflict {
                entity: "task",
                detail: format!("duplicate id {}", task.id),
            });
        }
        tasks.insert(key, task.clone());
        Ok(task)
    }

    async fn get(&self, id: &str) -> Result<Task, RepositoryError> {
        self.tasks
            .read()
            .get(&task_key(id))
            .cloned()
            .ok_or(RepositoryError::NotFound {
                entity: "task",
                id: id.to_string(),
            })
    }

    async fn update(&self, task: Task) -> Result<Task, RepositoryError> {
        let mut tasks = self.tasks.write();
        let key = task_key(&task.id);
        if !tasks.contains_key(&key) {
            return Err(RepositoryError::NotFound {
                entity: "task",
                id: task.id.clone(),
            });
        }
        tasks.insert(key, task.clone());
        Ok(task)
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.tasks
            .write()
            .remove(&task_key(id))
            .map(|_| ())
            .ok_or(RepositoryError::NotFound {
                entity: "task",
                id: id.to_string(),
            })
    }

    async fn list_by_stage(&self, stage: TaskStage) -> Result<Vec<Task>, RepositoryError> {
        Ok(self
            .tasks
            .read()
            .values()
            .filter(|t| t.stage == stage)
            .cloned()
            .collect())
    }

    async fn list_by_stage_and_user(
        &self,
        stage: TaskStage,
        user_id: &str,
    ) -> Result<Vec<Task>, RepositoryError> {
        Ok(self
            .tasks
            .read()
            .values()
            .filter(|t| t.stage == stage && t.owner_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Task>, RepositoryError> {
        Ok(self
            .tasks
            .read()
            .values()
            .filter(|t| t.owner_id == user_id)
            .cloned()
            .collect())
    }

    async fn count_by_stage(&self, stage: TaskStage) -> Result<usize, RepositoryError> {
        Ok(self
            .tasks
            .read()
            .values()
            .filter(|t| t.stage == stage)
            .count())
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Task>, RepositoryError> {
        let tasks = self.tasks.read();
        Ok(ids
            .iter()
            .filter_map(|id| tasks.get(&task_key(id)).cloned())
            .collect())
    }
}

/// In-memory user repository with an email uniqueness index.
#[derive(Default)]
pub struct MemoryUserRepository {
    // `user:<id>` entries plus `email:<addr>` -> user id index entries,
    // mirroring the prefixed key space of a durable engine.
    users: RwLock<HashMap<String, User>>,
    email_index: RwLock<HashMap<String, String>>,
}

impl MemoryUserRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write();
        let mut emails = self.email_index.write();
        let key = user_key(&user.id);
        if users.contains_key(&key) {
            return Err(RepositoryError::Conflict {
                entity: "user",
                detail: format!("duplicate id {}", user.id),
            });
        }
        let email = email_key(&user.email);
        if emails.contains_key(&email) {
            return Err(RepositoryError::Conflict {
                entity: "user",
                detail: format!("duplicate email {}", user.email),
            });
        }
        emails.insert(email, user.id.clone());
        users.insert(key, user.clone());
        Ok(user)
    }

    async fn get_by_id(&self, id: &str) -> Result<User, RepositoryError> {
        self.users
            .read()
            .get(&user_key(id))
            .cloned()
            .ok_or(RepositoryError::NotFound {
                entity: "user",
                id: id.to_string(),
            })
    }

    async fn get_by_email(&self, email: &str) -> Result<User, RepositoryError> {
        let id = self
            .email_index
            .read()
            .get(&email_key(email))
            .cloned()
            .ok_or(RepositoryError::NotFound {
                entity: "user",
                id: email.to_string(),
            })?;
        self.get_by_id(&id).await
    }

    async fn update(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write();
        let mut emails = self.email_index.write();
        let key = user_key(&user.id);
        let existing = users.get(&key).ok_or(RepositoryError::NotFound {
            entity: "user",
            id: user.id.clone(),
        })?;

        let new_email = email_key(&user.email);
        if let Some(holder) = emails.get(&new_email) {
            if holder != &user.id {
                return Err(RepositoryError::Conflict {
                    entity: "user",
                    detail: format!("duplicate email {}", user.email),
                });
            }
        }
        let old_email = email_key(&existing.email);
        if old_email != new_email {
            emails.remove(&old_email);
            emails.insert(new_email, user.id.clone());
        }
        users.insert(key, user.clone());
        Ok(user)
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let mut users = self.users.write();
        let removed = users
            .remove(&user_key(id))
            .ok_or(RepositoryError::NotFound {
                entity: "user",
                id: id.to_string(),
            })?;
        self.email_index.write().remove(&email_key(&removed.email));
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.users.read().values().cloned().collect())
    }
}

/// In-memory inventory repository holding items and units.
#[derive(Default)]
pub struct MemoryInventoryRepository {
    items: RwLock<HashMap<String, InventoryItem>>,
    units: RwLock<HashMap<String, Unit>>,
}

impl MemoryInventoryRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryRepository for MemoryInventoryRepository {
    async fn create_item(&self, item: InventoryItem) -> Result<InventoryItem, RepositoryError> {
        let mut items = self.items.write();
        let key = item_key(&item.id);
        if items.contains_key(&key) {
            return Err(RepositoryError::Conflict {
                entity: "item",
                detail: format!("duplicate id {}", item.id),
            });
        }
        items.insert(key, item.clone());
        Ok(item)
    }

    async fn get_item(&self, id: &str) -> Result<InventoryItem, RepositoryError> {
        self.items
            .read()
            .get(&item_key(id))
            .cloned()
            .ok_or(RepositoryError::NotFound {
                entity: "item",
                id: id.to_string(),
            })
    }

    async fn update_item(&self, item: InventoryItem) -> Result<InventoryItem, RepositoryError> {
        let mut items = self.items.write();
        let key = item_key(&item.id);
        if !items.contains_key(&key) {
            return Err(RepositoryError::NotFound {
                entity: "item",
                id: item.id.clone(),
            });
        }
        items.insert(key, item.clone());
        Ok(item)
    }

    async fn delete_item(&self, id: &str) -> Result<(), RepositoryError> {
        self.items
            .write()
            .remove(&item_key(id))
            .map(|_| ())
            .ok_or(RepositoryError::NotFound {
                entity: "item",
                id: id.to_string(),
            })
    }

    async fn list_items(&self) -> Result<Vec<InventoryItem>, RepositoryError> {
        Ok(self.items.read().values().cloned().collect())
    }

    async fn create_unit(&self, unit: Unit) -> Result<Unit, RepositoryError> {
        let mut units = self.units.write();
        let key = unit_key(&unit.id);
        if units.contains_key(&key) {
            return Err(RepositoryError::Conflict {
                entity: "unit",
                detail: format!("duplicate id {}", unit.id),
            });
        }
        units.insert(key, unit.clone());
        Ok(unit)
    }

    async fn get_unit(&self, id: &str) -> Result<Unit, RepositoryError> {
        self.units
            .read()
            .get(&unit_key(id))
            .cloned()
            .ok_or(RepositoryError::NotFound {
                entity: "unit",
                id: id.to_string(),
            })
    }

    async fn update_unit(&self, unit: Unit) -> Result<Unit, RepositoryError> {
        let mut units = self.units.write();
        let key = unit_key(&unit.id);
        if !units.contains_key(&key) {
            return Err(RepositoryError::NotFound {
                entity: "unit",
                id: unit.id.clone(),
            });
        }
        units.insert(key, unit.clone());
        Ok(unit)
    }

    async fn delete_unit(&self, id: &str) -> Result<(), RepositoryError> {
        self.units
            .write()
            .remove(&unit_key(id))
            .map(|_| ())
            .ok_or(RepositoryError::NotFound {
                entity: "unit",
                id: id.to_string(),
            })
    }

    async fn list_units(&self) -> Result<Vec<Unit>, RepositoryError> {
        Ok(self.units.read().values().cloned().collect())
    }
}
