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

//! # Workflow Engine
//!
//! Drives pipeline work through its lifecycle: a trigger firing (or direct
//! submission) selects assignees for the step, runs the pipeline's conflict
//! policy against the activity's in-flight work, applies the accepted diff,
//! publishes lifecycle events, and emits the policy's notifications.
//!
//! Conflict resolution runs on a cloned snapshot of the work list so the
//! activity lock is never held across policy evaluation or I/O; the diff is
//! applied back atomically afterwards.

use std::collections::HashMap;

use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, warn};

use super::assignment::{AssignmentEngine, AssignmentError, SelectionPools};
use super::conflict::{self, ConflictDecision, PendingNotification};
use super::state::{progress_on_completion, ActivityRegistry, PipelineStateError, Progression};
use crate::bus::{BusError, EventBus};
use crate::error::ConflictReason;
use crate::models::event::{Event, EventPayload};
use crate::models::pipeline::{Pipeline, PipelineWork};
use crate::models::task::short_task_id;
use crate::notifier::{Notification, NotificationSink};
use crate::trigger::{TriggerBinding, TriggerContext, TriggerSink};

/// Errors surfaced by work submission and completion.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// No pipeline registered under the id
    #[error("unknown pipeline '{pipeline_id}' in task system '{task_system_id}'")]
    UnknownPipeline {
        task_system_id: String,
        pipeline_id: String,
    },

    /// The step index is outside the pipeline
    #[error("pipeline '{pipeline_id}' has no step {step_index}")]
    StepOutOfRange {
        pipeline_id: String,
        step_index: usize,
    },

    /// Assignment could not be satisfied
    #[error(transparent)]
    Unassignable(#[from] AssignmentError),

    /// The conflict policy rejected the arrival
    #[error("work rejected by conflict policy: {reason}")]
    Rejected { reason: ConflictReason },

    /// Activity state transition failed
    #[error(transparent)]
    State(#[from] PipelineStateError),

    /// The lifecycle event could not be published
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Outcome of an accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedWork {
    /// Id of the task backing the new work item
    pub task_id: String,
    /// Whether the arrival was aggregated into existing work
    pub aggregated: bool,
}

/// The pipeline execution engine.
pub struct WorkflowEngine {
    source: String,
    pipelines: parking_lot::RwLock<HashMap<(String, String), Pipeline>>,
    pools: parking_lot::RwLock<HashMap<String, SelectionPools>>,
    activities: ActivityRegistry,
    assignment: AssignmentEngine,
    bus: Arc<EventBus>,
    notifications: Arc<dyn NotificationSink>,
}

impl WorkflowEngine {
    /// Creates an engine publishing events as `source`.
    pub fn new(
        source: impl Into<String>,
        assignment: AssignmentEngine,
        bus: Arc<EventBus>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            source: source.into(),
            pipelines: parking_lot::RwLock::new(HashMap::new()),
            pools: parking_lot::RwLock::new(HashMap::new()),
            activities: ActivityRegistry::new(),
            assignment,
            bus,
            notifications,
        }
    }

    /// Registers a pipeline under its (task system, pipeline id) pair.
    pub fn register_pipeline(&self, pipeline: Pipeline) {
        let key = (pipeline.task_system_id.clone(), pipeline.id.clone());
        self.pipelines.write().insert(key, pipeline);
    }

    /// Sets the assignee/reviewer pools for a task system.
    pub fn set_pools(&self, task_system_id: impl Into<String>, pools: SelectionPools) {
        self.pools.write().insert(task_system_id.into(), pools);
    }

    /// The live activity registry.
    pub fn activities(&self) -> &ActivityRegistry {
        &self.activities
    }

    /// Submits new work for `step_index` of a pipeline.
    ///
    /// Selects assignees per the step's policy, resolves the arrival against
    /// in-flight work, applies the accepted diff atomically, publishes
    /// `pipeline.work_started`, and emits the policy's notifications. On a
    /// rejection the activity is untouched and the rejection notifications
    /// still go out.
    pub async fn submit_work(
        &self,
        task_system_id: &str,
        pipeline_id: &str,
        step_index: usize,
        points: u32,
    ) -> Result<SubmittedWork, WorkflowError> {
        let pipeline = self.lookup_pipeline(task_system_id, pipeline_id)?;
        let step = pipeline
            .step(step_index)
            .ok_or_else(|| WorkflowError::StepOutOfRange {
                pipeline_id: pipeline_id.to_string(),
                step_index,
            })?;

        let pools = self
            .pools
            .read()
            .get(task_system_id)
            .cloned()
            .unwrap_or_default();

        let activity = self.activities.get_or_create(task_system_id, pipeline_id);
        let snapshot = activity.lock().work_items.clone();

        let previous_assignee = snapshot
            .last()
            .and_then(|w| w.assignees.iter().next().cloned());
        let mut rng = StdRng::from_entropy();
        let selected = self.assignment.assign(
            step,
            &pools,
            previous_assignee.as_deref(),
            &mut rng,
        )?;

        let task_id = short_task_id();
        let assignee_ids: Vec<String> = selected.assignees.iter().cloned().collect();
        let incoming = PipelineWork::new(
            step_index,
            points,
            task_id.clone(),
            selected.assignees,
            selected.reviewers,
        );

        // Policy evaluation runs on the snapshot, off the lock.
        let outcome = conflict::resolve(&snapshot, incoming, &pipeline.conflict_policy);

        match outcome.decision {
            ConflictDecision::Accepted { aggregated } => {
                {
                    let mut activity = activity.lock();
                    activity.work_items = outcome.work_items;
                }
                self.publish_lifecycle(EventPayload::PipelineWorkStarted {
                    pipeline_id: pipeline_id.to_string(),
                    task_system_id: task_system_id.to_string(),
                    step_index,
                    points,
                    assignee_ids,
                })?;
                self.emit_notifications(outcome.notifications).await;
                info!(
                    pipeline_id,
                    task_system_id, step_index, points, aggregated, "work accepted"
                );
                Ok(SubmittedWork {
                    task_id,
                    aggregated,
                })
            }
            ConflictDecision::Rejected { reason } => {
                self.emit_notifications(outcome.notifications).await;
                warn!(pipeline_id, task_system_id, step_index, %reason, "work rejected");
                Err(WorkflowError::Rejected { reason })
            }
        }
    }

    /// Completes the step of the work item backing `task_id`.
    ///
    /// Review-requiring steps pass through `review_assigned` first; a
    /// completed step publishes `pipeline.work_completed` and advances the
    /// item to the next step when one exists.
    pub async fn complete_work(
        &self,
        task_system_id: &str,
        pipeline_id: &str,
        task_id: &str,
    ) -> Result<Progression, WorkflowError> {
        let pipeline = self.lookup_pipeline(task_system_id, pipeline_id)?;
        let activity = self.activities.get_or_create(task_system_id, pipeline_id);

        let (progression, completed_points, assignee_ids, step_index) = {
            let mut activity = activity.lock();
            let item_before = activity
                .find_by_task(task_id)
                .ok_or_else(|| PipelineStateError::WorkNotFound {
                    task_id: task_id.to_string(),
                })?;
            let points = item_before.points;
            let step_index = item_before.step_index;
            let assignees: Vec<String> = item_before.assignees.iter().cloned().collect();
            let progression = progress_on_completion(&mut activity, &pipeline, task_id)?;
            (progression, points, assignees, step_index)
        };

        if progression != Progression::ReviewAssigned {
            self.publish_lifecycle(EventPayload::PipelineWorkCompleted {
                pipeline_id: pipeline_id.to_string(),
                task_system_id: task_system_id.to_string(),
                step_index,
                points: completed_points,
                assignee_ids,
            })?;
        }
        debug!(pipeline_id, task_id, ?progression, "work progressed");
        Ok(progression)
    }

    fn lookup_pipeline(
        &self,
        task_system_id: &str,
        pipeline_id: &str,
    ) -> Result<Pipeline, WorkflowError> {
        self.pipelines
            .read()
            .get(&(task_system_id.to_string(), pipeline_id.to_string()))
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownPipeline {
                task_system_id: task_system_id.to_string(),
                pipeline_id: pipeline_id.to_string(),
            })
    }

    fn publish_lifecycle(&self, payload: EventPayload) -> Result<(), BusError> {
        let event = Event::build(payload, self.source.clone(), HashMap::new())
            .map_err(BusError::Invalid)?;
        self.bus.publish(&event)
    }

    async fn emit_notifications(&self, notifications: Vec<PendingNotification>) {
        for pending in notifications {
            self.notifications
                .dispatch(
                    &pending.user_id,
                    Notification::new(pending.kind, "pipeline update", pending.message),
                )
                .await;
        }
    }
}

#[async_trait]
impl TriggerSink for WorkflowEngine {
    /// A trigger firing submits work for the first step of the bound
    /// pipeline with the pipeline's projected value. Schedule firings also
    /// publish `schedule.triggered` for downstream consumers.
    async fn trigger_fired(&self, binding: TriggerBinding, context: TriggerContext) {
        if let Some(cron_expression) = context.get("cron_expression") {
            let payload = EventPayload::ScheduleTriggered {
                trigger_id: context.get("trigger_id").cloned().unwrap_or_default(),
                trigger_name: context.get("trigger").cloned().unwrap_or_default(),
                cron_expression: cron_expression.clone(),
                context: context.clone(),
            };
            if let Err(e) = self.publish_lifecycle(payload) {
                error!(error = %e, "failed to publish schedule.triggered");
            }
        }

        match self
            .submit_work(
                &binding.task_system_id,
                &binding.pipeline_id,
                0,
                binding.projected_points,
            )
            .await
        {
            Ok(submitted) => {
                debug!(
                    pipeline_id = %binding.pipeline_id,
                    task_id = %submitted.task_id,
                    "trigger firing produced work"
                );
            }
            Err(WorkflowError::Rejected { reason }) => {
                debug!(
                    pipeline_id = %binding.pipeline_id,
                    %reason,
                    "trigger firing rejected by conflict policy"
                );
            }
            Err(e) => {
                error!(
                    pipeline_id = %binding.pipeline_id,
                    error = %e,
                    "trigger firing failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    use crate::bus::EventBusConfig;
    use crate::models::pipeline::{
        AggregatePolicy, AssignmentPolicy, ConflictPolicy, PipelineStep,
    };
    use crate::pipeline::assignment::PoolMember;

    struct NullSink {
        dispatched: Mutex<Vec<(String, Notification)>>,
    }

    #[async_trait]
    impl NotificationSink for NullSink {
        async fn dispatch(&self, user_id: &str, notification: Notification) {
            self.dispatched
                .lock()
                .push((user_id.to_string(), notification));
        }
    }

    fn engine_with(policy: ConflictPolicy) -> (Arc<WorkflowEngine>, Arc<NullSink>) {
        let bus = Arc::new(EventBus::new(EventBusConfig::default()));
        let sink = Arc::new(NullSink {
            dispatched: Mutex::new(Vec::new()),
        });
        let engine = Arc::new(WorkflowEngine::new(
            "workflow-core",
            AssignmentEngine::default(),
            bus,
            sink.clone(),
        ));
        engine.register_pipeline(Pipeline {
            id: "pl-1".into(),
            name: "restock".into(),
            task_system_id: "ts-1".into(),
            steps: vec![
                PipelineStep {
                    name: "gather".into(),
                    assignment: AssignmentPolicy::NewAssignee,
                    requires_review: false,
                    points_budget: 10,
                },
                PipelineStep {
                    name: "verify".into(),
                    assignment: AssignmentPolicy::NewAssignee,
                    requires_review: true,
                    points_budget: 5,
                },
            ],
            conflict_policy: policy,
        });
        engine.set_pools(
            "ts-1",
            SelectionPools {
                assignees: vec![PoolMember::new("alice"), PoolMember::new("bob")],
                reviewers: vec![PoolMember::new("rev")],
            },
        );
        (engine, sink)
    }

    #[tokio::test]
    async fn submit_creates_activity_and_work() {
        let (engine, sink) = engine_with(ConflictPolicy::default());
        let submitted = engine.submit_work("ts-1", "pl-1", 0, 5).await.unwrap();
        assert!(!submitted.aggregated);

        let activity = engine.activities().find("ts-1", "pl-1").unwrap();
        assert_eq!(activity.lock().work_items.len(), 1);
        assert!(!sink.dispatched.lock().is_empty(), "assignees notified");
    }

    #[tokio::test]
    async fn aggregate_policy_merges_submissions() {
        let (engine, _sink) = engine_with(ConflictPolicy {
            aggregate: Some(AggregatePolicy { mtu: 10 }),
            ..Default::default()
        });

        engine.submit_work("ts-1", "pl-1", 0, 3).await.unwrap();
        let second = engine.submit_work("ts-1", "pl-1", 0, 4).await.unwrap();
        assert!(second.aggregated);

        let activity = engine.activities().find("ts-1", "pl-1").unwrap();
        let items = activity.lock().work_items.clone();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].points, 7);
    }

    #[tokio::test]
    async fn block_policy_rejects_second_submission() {
        let (engine, sink) = engine_with(ConflictPolicy {
            block: true,
            ..Default::default()
        });

        engine.submit_work("ts-1", "pl-1", 0, 3).await.unwrap();
        let result = engine.submit_work("ts-1", "pl-1", 0, 4).await;
        assert!(matches!(
            result,
            Err(WorkflowError::Rejected {
                reason: ConflictReason::Blocked
            })
        ));

        let activity = engine.activities().find("ts-1", "pl-1").unwrap();
        assert_eq!(activity.lock().work_items.len(), 1, "activity untouched");
        assert!(sink
            .dispatched
            .lock()
            .iter()
            .any(|(_, n)| matches!(n.kind, crate::models::user::NotificationKind::Blocked)));
    }

    #[tokio::test]
    async fn completion_advances_and_respects_review() {
        let (engine, _sink) = engine_with(ConflictPolicy::default());
        let submitted = engine.submit_work("ts-1", "pl-1", 0, 5).await.unwrap();

        // Step 0 needs no review: completing advances to step 1.
        let progression = engine
            .complete_work("ts-1", "pl-1", &submitted.task_id)
            .await
            .unwrap();
        assert_eq!(progression, Progression::AdvancedTo(1));

        // Step 1 requires review: first completion parks the item.
        let progression = engine
            .complete_work("ts-1", "pl-1", &submitted.task_id)
            .await
            .unwrap();
        assert_eq!(progression, Progression::ReviewAssigned);

        let progression = engine
            .complete_work("ts-1", "pl-1", &submitted.task_id)
            .await
            .unwrap();
        assert_eq!(progression, Progression::PipelineComplete);
    }

    #[tokio::test]
    async fn unknown_pipeline_is_an_error() {
        let (engine, _sink) = engine_with(ConflictPolicy::default());
        assert!(matches!(
            engine.submit_work("ts-1", "nope", 0, 5).await,
            Err(WorkflowError::UnknownPipeline { .. })
        ));
    }

    #[tokio::test]
    async fn trigger_firing_submits_first_step_work() {
        let (engine, _sink) = engine_with(ConflictPolicy::default());
        engine
            .trigger_fired(
                TriggerBinding {
                    pipeline_id: "pl-1".into(),
                    task_system_id: "ts-1".into(),
                    projected_points: 4,
                },
                TriggerContext::new(),
            )
            .await;

        let activity = engine.activities().find("ts-1", "pl-1").unwrap();
        let items = activity.lock().work_items.clone();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].points, 4);
    }
}
