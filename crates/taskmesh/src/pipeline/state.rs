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

//! # Pipeline State
//!
//! Per-task-system collection of pipeline activities. Activities are created
//! on demand when their first work item arrives and are looked up by
//! pipeline id or by the task backing a work item. Each activity sits behind
//! its own lock; callers must never hold two activity locks at once.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::models::pipeline::{Pipeline, PipelineActivity, PipelineWork, WorkStatus};

/// Errors raised by activity state transitions.
#[derive(Debug, thiserror::Error)]
pub enum PipelineStateError {
    /// No work item backs the given task
    #[error("no work item for task '{task_id}'")]
    WorkNotFound {
        /// The task id that matched nothing
        task_id: String,
    },

    /// A work item referenced a step index outside its pipeline
    #[error("step index {step_index} out of range for pipeline '{pipeline_id}'")]
    StepOutOfRange {
        /// The offending pipeline
        pipeline_id: String,
        /// The invalid index
        step_index: usize,
    },
}

/// What happened when a work item's step completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progression {
    /// The step requires review; the item now waits on its reviewer
    ReviewAssigned,
    /// The item completed its step and moved to the next one
    AdvancedTo(usize),
    /// The item completed the pipeline's last step
    PipelineComplete,
}

/// Registry of live activities, keyed by (task-system id, pipeline id).
///
/// At most one activity exists per key; `get_or_create` is the only way an
/// activity comes into existence.
#[derive(Default)]
pub struct ActivityRegistry {
    activities: RwLock<HashMap<(String, String), Arc<Mutex<PipelineActivity>>>>,
}

impl ActivityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the activity for the pair, creating it on first use.
    pub fn get_or_create(
        &self,
        task_system_id: &str,
        pipeline_id: &str,
    ) -> Arc<Mutex<PipelineActivity>> {
        let key = (task_system_id.to_string(), pipeline_id.to_string());
        if let Some(existing) = self.activities.read().get(&key) {
            return existing.clone();
        }
        let mut activities = self.activities.write();
        activities
            .entry(key)
            .or_insert_with(|| {
                debug!(task_system_id, pipeline_id, "creating pipeline activity");
                Arc::new(Mutex::new(PipelineActivity::new(
                    pipeline_id,
                    task_system_id,
                )))
            })
            .clone()
    }

    /// Looks up the activity for a pipeline within a task system.
    pub fn find(
        &self,
        task_system_id: &str,
        pipeline_id: &str,
    ) -> Option<Arc<Mutex<PipelineActivity>>> {
        self.activities
            .read()
            .get(&(task_system_id.to_string(), pipeline_id.to_string()))
            .cloned()
    }

    /// Finds the activity holding a work item backed by `task_id`.
    pub fn find_by_task(&self, task_id: &str) -> Option<Arc<Mutex<PipelineActivity>>> {
        let activities = self.activities.read();
        for activity in activities.values() {
            if activity.lock().find_by_task(task_id).is_some() {
                return Some(activity.clone());
            }
        }
        None
    }

    /// Number of live activities.
    pub fn len(&self) -> usize {
        self.activities.read().len()
    }

    /// True when no activities exist.
    pub fn is_empty(&self) -> bool {
        self.activities.read().is_empty()
    }
}

/// Applies step-completion progression to the work item backing `task_id`.
///
/// If the step requires review and the item was merely assigned, it moves to
/// `review_assigned`. Otherwise it completes: the item advances to the next
/// step (re-entering `assigned`), or finishes the pipeline on the last step.
/// Completed activities are retained for history.
pub fn progress_on_completion(
    activity: &mut PipelineActivity,
    pipeline: &Pipeline,
    task_id: &str,
) -> Result<Progression, PipelineStateError> {
    let index = activity
        .work_items
        .iter()
        .position(|w| w.task_id == task_id)
        .ok_or_else(|| PipelineStateError::WorkNotFound {
            task_id: task_id.to_string(),
        })?;

    let step_index = activity.work_items[index].step_index;
    let status = activity.work_items[index].status;
    let step = pipeline
        .step(step_index)
        .ok_or(PipelineStateError::StepOutOfRange {
            pipeline_id: pipeline.id.clone(),
            step_index,
        })?;

    if step.requires_review && status == WorkStatus::Assigned {
        activity.work_items[index].status = WorkStatus::ReviewAssigned;
        return Ok(Progression::ReviewAssigned);
    }

    let next_index = step_index + 1;
    if next_index < pipeline.steps.len() {
        let seqno = next_seqno_excluding(activity, next_index, task_id);
        let item = &mut activity.work_items[index];
        item.step_index = next_index;
        item.status = WorkStatus::Assigned;
        item.arrival_on_step_seqno = seqno;
        Ok(Progression::AdvancedTo(next_index))
    } else {
        activity.work_items[index].status = WorkStatus::Complete;
        Ok(Progression::PipelineComplete)
    }
}

fn next_seqno_excluding(activity: &PipelineActivity, step_index: usize, task_id: &str) -> u32 {
    activity
        .work_items
        .iter()
        .filter(|w| w.step_index == step_index && w.task_id != task_id)
        .map(|w| w.arrival_on_step_seqno)
        .max()
        .unwrap_or(0)
        + 1
}

/// Snapshot helper: clones the work list so conflict resolution can run
/// without holding the activity lock.
pub fn snapshot_work(activity: &PipelineActivity) -> Vec<PipelineWork> {
    activity.work_items.clone()
}
