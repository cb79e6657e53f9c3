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

//! Threshold crossing through the bus: an `inventory.level_changed` event
//! that crosses the low-stock threshold downward makes the orchestrator
//! create a restocking task for the configured assignee.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use taskmesh::bus::{EventBus, EventBusConfig, EventHandler, KindSelector};
use taskmesh::models::event::{Event, EventKind, EventPayload};
use taskmesh::models::inventory::InventoryItem;
use taskmesh::models::task::Task;
use taskmesh::orchestrator::clients::{
    ClientError, InventoryClient, NewTaskRequest, TaskClient,
};
use taskmesh::orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorHandler};
use taskmesh::retry::RetryPolicy;

#[derive(Default)]
struct SharedInventory {
    items: Mutex<HashMap<String, InventoryItem>>,
}

#[async_trait]
impl InventoryClient for SharedInventory {
    async fn get_item(&self, item_id: &str) -> Result<InventoryItem, ClientError> {
        self.items
            .lock()
            .get(item_id)
            .cloned()
            .ok_or(ClientError::NotFound {
                entity: "item",
                id: item_id.to_string(),
            })
    }

    async fn update_level(
        &self,
        item_id: &str,
        new_level: f64,
        _reason: &str,
    ) -> Result<InventoryItem, ClientError> {
        let mut items = self.items.lock();
        let item = items.get_mut(item_id).ok_or(ClientError::NotFound {
            entity: "item",
            id: item_id.to_string(),
        })?;
        item.level = new_level;
        Ok(item.clone())
    }

    async fn set_item_metadata(
        &self,
        item_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ClientError> {
        let mut items = self.items.lock();
        let item = items.get_mut(item_id).ok_or(ClientError::NotFound {
            entity: "item",
            id: item_id.to_string(),
        })?;
        item.metadata.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn inventory_status(&self) -> Result<Vec<InventoryItem>, ClientError> {
        Ok(self.items.lock().values().cloned().collect())
    }
}

#[derive(Default)]
struct SharedTasks {
    created: Mutex<Vec<Task>>,
}

#[async_trait]
impl TaskClient for SharedTasks {
    async fn get_task(&self, task_id: &str) -> Result<Task, ClientError> {
        self.created
            .lock()
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
            .ok_or(ClientError::NotFound {
                entity: "task",
                id: task_id.to_string(),
            })
    }

    async fn add_task(&self, request: NewTaskRequest) -> Result<Task, ClientError> {
        let task = Task::new(request.name, request.owner_id);
        self.created.lock().push(task.clone());
        Ok(task)
    }
}

/// Scenario: an item with threshold 20 drops to 15; the orchestrator reacts
/// to the published event and creates a restocking task for the configured
/// assignee well within the 10-second budget.
#[tokio::test]
async fn threshold_crossing_creates_restock_task() {
    let inventory = Arc::new(SharedInventory::default());
    let tasks = Arc::new(SharedTasks::default());
    let bus = Arc::new(EventBus::new(EventBusConfig::default()));

    let mut item = InventoryItem::new("item-1", "coffee beans", 100.0, 500.0, 20.0, "ikg").unwrap();
    let change = item.apply_level(15.0).unwrap();
    assert!(change.below_threshold);
    inventory.items.lock().insert("item-1".to_string(), item);

    let orchestrator = Arc::new(Orchestrator::new(
        inventory.clone(),
        tasks.clone(),
        bus.clone(),
        OrchestratorConfig {
            restock_assignee: "quartermaster".to_string(),
            retry: RetryPolicy::with_max_attempts(2),
            ..Default::default()
        },
    ));
    let handler: Arc<dyn EventHandler> = Arc::new(OrchestratorHandler::new(orchestrator));
    bus.subscribe(KindSelector::Kind(EventKind::InventoryLevelChanged), handler);

    let event = Event::build(
        EventPayload::InventoryLevelChanged {
            item_id: "item-1".into(),
            item_name: "coffee beans".into(),
            prev_level: change.prev_level,
            new_level: change.new_level,
            unit: "ikg".into(),
            threshold: 20.0,
            below_threshold: change.below_threshold,
        },
        "inventory-core",
        HashMap::new(),
    )
    .unwrap();
    bus.publish(&event).unwrap();

    // The reaction budget is 10 seconds; poll well under it.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if !tasks.created.lock().is_empty() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "restock task not created within 10s"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    {
        let created = tasks.created.lock();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].owner_id, "quartermaster");
        assert!(created[0].name.contains("coffee beans"));
    }

    // The generated task id lands in the item metadata for dedup.
    let item = inventory.items.lock().get("item-1").cloned().unwrap();
    assert!(item.metadata.contains_key("restock_task_id"));

    bus.shutdown(Duration::from_secs(1)).await;
}
