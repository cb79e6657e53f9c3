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

//! # Orchestrator
//!
//! Cross-service reactions between the task and inventory services:
//!
//! - a completed task that consumed inventory lowers the item's level
//! - an inventory level crossing its threshold downward creates a restocking
//!   task for the configured assignee (deduplicated through item metadata)
//! - `schedule.triggered` firings with the `inventory_check` action sweep
//!   the inventory status and surface items at or below threshold
//!
//! Transient collaborator failures are retried with exponential backoff;
//! permanent failures put the orchestrator into degraded mode, emit an
//! `orchestration.degraded` event, and never crash it. A background probe
//! periodically retries the collaborators and clears the flag.
//!
//! The orchestrator references the clients; the clients never reference the
//! orchestrator. Reactions that would complete the cycle (an inventory
//! update echoing back) arrive through the event bus instead.

pub mod clients;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, EventHandler, HandlerError};
use crate::models::event::{Event, EventPayload};
use crate::models::task::TagValue;
use crate::retry::RetryPolicy;
use clients::{ClientError, InventoryClient, NewTaskRequest, TaskClient};

/// Task tag naming the inventory item a task consumes.
const ITEM_TAG: &str = "inventory_item_id";
/// Task tag carrying the consumed amount (in the item's unit).
const CONSUMED_TAG: &str = "inventory_consumed";
/// Item metadata key recording the generated restock task for dedup.
const RESTOCK_TASK_KEY: &str = "restock_task_id";
/// Item metadata prefix marking a task's consumption as already applied.
const CONSUMED_BY_PREFIX: &str = "consumed_by:";
/// Schedule context action that runs the inventory sweep.
const INVENTORY_CHECK_ACTION: &str = "inventory_check";
/// Reason tag on task-completion level updates.
const TASK_COMPLETION_REASON: &str = "task_completion";

/// Errors surfaced by orchestrator reactions.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A collaborator call failed after retries
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Source-service name stamped on published events
    pub source: String,
    /// User who receives generated restocking tasks
    pub restock_assignee: String,
    /// Retry policy for collaborator calls
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            source: "orchestrator".to_string(),
            restock_assignee: "restock-bot".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// The cross-service orchestrator.
pub struct Orchestrator {
    inventory: Arc<dyn InventoryClient>,
    tasks: Arc<dyn TaskClient>,
    bus: Arc<EventBus>,
    config: OrchestratorConfig,
    degraded: AtomicBool,
}

impl Orchestrator {
    /// Creates the orchestrator over its collaborator clients.
    pub fn new(
        inventory: Arc<dyn InventoryClient>,
        tasks: Arc<dyn TaskClient>,
        bus: Arc<EventBus>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            inventory,
            tasks,
            bus,
            config,
            degraded: AtomicBool::new(false),
        }
    }

    /// True while a collaborator outage has the orchestrator in reduced
    /// mode.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Reaction: a task completed.
    ///
    /// If the task's tags mark inventory consumption, the item's level is
    /// lowered with the `task_completion` reason (once per task, guarded by
    /// item metadata), then `task.completed` is published. Idempotent.
    pub async fn on_task_completed(
        &self,
        task_id: &str,
        user_id: &str,
    ) -> Result<(), OrchestratorError> {
        let task = self
            .call("get_task", || self.tasks.get_task(task_id))
            .await?;

        if let Some(TagValue::Text { value: item_id }) = task.tags.get(ITEM_TAG) {
            let consumed = match task.tags.get(CONSUMED_TAG) {
                Some(TagValue::Text { value }) => value.parse::<f64>().unwrap_or(0.0),
                _ => 0.0,
            };
            if consumed > 0.0 {
                self.apply_consumption(item_id, task_id, consumed).await?;
            }
        }

        let event = Event::build(
            EventPayload::TaskCompleted {
                task_id: task.id.clone(),
                name: task.name.clone(),
                completer_id: user_id.to_string(),
                location_path: task.location.clone(),
                completed_points: task
                    .intervals
                    .iter()
                    .flat_map(|i| i.completed_points.iter().cloned())
                    .collect(),
                completion_time: chrono::Utc::now(),
            },
            self.config.source.clone(),
            HashMap::new(),
        )
        .map_err(|e| ClientError::Failed(e.to_string()))?;
        if let Err(e) = self.bus.publish(&event) {
            warn!(task_id, error = %e, "failed to publish task.completed");
        }
        Ok(())
    }

    async fn apply_consumption(
        &self,
        item_id: &str,
        task_id: &str,
        consumed: f64,
    ) -> Result<(), OrchestratorError> {
        let item = self
            .call("get_item", || self.inventory.get_item(item_id))
            .await?;

        let guard_key = format!("{CONSUMED_BY_PREFIX}{task_id}");
        if item.metadata.contains_key(&guard_key) {
            debug!(item_id, task_id, "consumption already applied");
            return Ok(());
        }

        let new_level = (item.level - consumed).max(0.0);
        self.call("update_level", || {
            self.inventory
                .update_level(item_id, new_level, TASK_COMPLETION_REASON)
        })
        .await?;
        self.call("set_item_metadata", || {
            self.inventory.set_item_metadata(item_id, &guard_key, "1")
        })
        .await?;
        info!(item_id, task_id, consumed, new_level, "inventory consumed by task");
        Ok(())
    }

    /// Reaction: an inventory level changed.
    ///
    /// Crossing the low-stock threshold downward creates a restocking task
    /// for the configured assignee; the generated task id is recorded on the
    /// item's metadata so repeated events do not spawn duplicates.
    pub async fn on_inventory_level_changed(
        &self,
        item_id: &str,
        prev_level: f64,
        new_level: f64,
    ) -> Result<(), OrchestratorError> {
        let item = self
            .call("get_item", || self.inventory.get_item(item_id))
            .await?;

        let crossed_down = prev_level > item.low_threshold && new_level <= item.low_threshold;
        if !crossed_down {
            return Ok(());
        }
        if item.metadata.contains_key(RESTOCK_TASK_KEY) {
            debug!(item_id, "restock task already pending");
            return Ok(());
        }

        let request = NewTaskRequest {
            name: format!("Restock {}", item.name),
            description: format!(
                "{} fell to {} {} (threshold {})",
                item.name, new_level, item.unit_id, item.low_threshold
            ),
            owner_id: self.config.restock_assignee.clone(),
            tags: vec![(ITEM_TAG.to_string(), item_id.to_string())],
        };
        let task = self
            .call("add_task", || self.tasks.add_task(request.clone()))
            .await?;
        self.call("set_item_metadata", || {
            self.inventory
                .set_item_metadata(item_id, RESTOCK_TASK_KEY, &task.id)
        })
        .await?;
        info!(item_id, task_id = %task.id, "restocking task created");
        Ok(())
    }

    /// Reaction: a schedule fired with the `inventory_check` action.
    ///
    /// Sweeps the inventory status and surfaces every item at or below its
    /// threshold as an `inventory.level_changed` event (no level movement,
    /// `below_threshold` set) plus a log record.
    pub async fn on_schedule_triggered(
        &self,
        context: &HashMap<String, String>,
    ) -> Result<(), OrchestratorError> {
        if context.get("action").map(String::as_str) != Some(INVENTORY_CHECK_ACTION) {
            return Ok(());
        }

        let items = self
            .call("inventory_status", || self.inventory.inventory_status())
            .await?;
        for item in items.iter().filter(|i| i.level <= i.low_threshold) {
            warn!(
                item_id = %item.id,
                level = item.level,
                threshold = item.low_threshold,
                "inventory at or below threshold"
            );
            let event = Event::build(
                EventPayload::InventoryLevelChanged {
                    item_id: item.id.clone(),
                    item_name: item.name.clone(),
                    prev_level: item.level,
                    new_level: item.level,
                    unit: item.unit_id.clone(),
                    threshold: item.low_threshold,
                    below_threshold: true,
                },
                self.config.source.clone(),
                HashMap::from([("origin".to_string(), "inventory_check".to_string())]),
            );
            match event {
                Ok(event) => {
                    if let Err(e) = self.bus.publish(&event) {
                        warn!(item_id = %item.id, error = %e, "failed to publish check result");
                    }
                }
                Err(e) => warn!(item_id = %item.id, error = %e, "failed to build check event"),
            }
        }
        Ok(())
    }

    /// Spawns the degraded-mode recovery probe: while degraded, retries a
    /// cheap collaborator call every `interval` and clears the flag on
    /// success.
    pub fn spawn_recovery_probe(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if !orchestrator.is_degraded() {
                            continue;
                        }
                        match orchestrator.inventory.inventory_status().await {
                            Ok(_) => {
                                orchestrator.degraded.store(false, Ordering::SeqCst);
                                info!("collaborators reachable again, leaving degraded mode");
                            }
                            Err(e) => {
                                debug!(error = %e, "still degraded");
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Runs a collaborator call under the retry policy; exhausted or
    /// permanent failures flip the orchestrator into degraded mode and emit
    /// the degraded event.
    async fn call<T, F, Fut>(&self, name: &str, operation: F) -> Result<T, OrchestratorError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ClientError>>,
    {
        match self.config.retry.run(name, operation).await {
            Ok(value) => Ok(value),
            Err(e) => {
                error!(operation = name, error = %e, "collaborator call failed");
                self.enter_degraded(name, &e);
                Err(e.into())
            }
        }
    }

    fn enter_degraded(&self, operation: &str, error: &ClientError) {
        if self.degraded.swap(true, Ordering::SeqCst) {
            return;
        }
        metrics::counter!("taskmesh_orchestrator_degraded_total").increment(1);
        let event = Event::build(
            EventPayload::Extension {
                kind: "orchestration.degraded".to_string(),
                data: serde_json::json!({
                    "operation": operation,
                    "error": error.to_string(),
                }),
            },
            self.config.source.clone(),
            HashMap::new(),
        );
        match event {
            Ok(event) => {
                if let Err(e) = self.bus.publish(&event) {
                    warn!(error = %e, "failed to publish orchestration.degraded");
                }
            }
            Err(e) => warn!(error = %e, "failed to build orchestration.degraded"),
        }
    }
}

/// Bus handler adapter: routes the orchestrator's subscribed kinds to its
/// reactions.
pub struct OrchestratorHandler {
    orchestrator: Arc<Orchestrator>,
}

impl OrchestratorHandler {
    /// Wraps the orchestrator for bus registration.
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl EventHandler for OrchestratorHandler {
    fn name(&self) -> &str {
        "orchestrator"
    }

    async fn handle(&self, event: Event) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::InventoryLevelChanged {
                item_id,
                prev_level,
                new_level,
                ..
            } => {
                self.orchestrator
                    .on_inventory_level_changed(item_id, *prev_level, *new_level)
                    .await?;
            }
            EventPayload::ScheduleTriggered { context, .. } => {
                self.orchestrator.on_schedule_triggered(context).await?;
            }
            _ => {}
        }
        Ok(())
    }
}
