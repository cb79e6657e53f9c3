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

//! # Pipeline Model
//!
//! A pipeline is an ordered list of task-steps belonging to a task-system.
//! Each step declares an assignment policy, a review requirement, a points
//! budget, and a conflict policy for colliding arrivals. A
//! [`PipelineActivity`] is the runtime record of one pipeline instantiation;
//! a [`PipelineWork`] item is a single in-flight step.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How assignees are selected for a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum AssignmentPolicy {
    /// One user picked from the assignee pool
    NewAssignee,
    /// One user, reusing the previous step's assignee when present
    NewAssigneeOrSameAsPrevious,
    /// Multiple users accumulated by weight up to a capacity
    GroupAssignees {
        /// Ceiling on the summed weights of the selected users
        total_capacity: f64,
    },
}

/// Aggregation settings for the `aggregate` conflict policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatePolicy {
    /// Ceiling on a merged work item's points (max transmission unit)
    pub mtu: u32,
}

/// Conflict resolution rules for a pipeline.
///
/// Multiple rules may be set simultaneously; they are evaluated with fixed
/// precedence `surpass -> block -> aggregate -> stack -> replace`, where
/// `replace` is the default when none of the others applies.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConflictPolicy {
    /// Whether new work may land on a step beyond every in-flight step
    #[serde(default)]
    pub allow_surpass: bool,
    /// Reject all new work while any work is in flight
    #[serde(default)]
    pub block: bool,
    /// Merge same-step arrivals up to an MTU
    #[serde(default)]
    pub aggregate: Option<AggregatePolicy>,
    /// Accept new work alongside existing work without merging
    #[serde(default)]
    pub stack: bool,
}

/// One step of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    /// Step name, used in notifications and logs
    pub name: String,
    /// How assignees are chosen
    pub assignment: AssignmentPolicy,
    /// Whether a distinct reviewer must sign off before completion
    #[serde(default)]
    pub requires_review: bool,
    /// Points budget for work on this step
    pub points_budget: u32,
}

/// An ordered list of task-steps belonging to a task-system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline identifier, unique within its task-system
    pub id: String,
    /// Human name
    pub name: String,
    /// Owning task-system id
    pub task_system_id: String,
    /// Ordered steps
    pub steps: Vec<PipelineStep>,
    /// Conflict policy applied to colliding arrivals
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

impl Pipeline {
    /// Returns the step at `index`, if valid.
    pub fn step(&self, index: usize) -> Option<&PipelineStep> {
        self.steps.get(index)
    }
}

/// Status of a work item within its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    /// Assigned and in flight
    Assigned,
    /// Waiting on a reviewer
    ReviewAssigned,
    /// Step finished
    Complete,
}

/// A single in-flight step of a pipeline activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineWork {
    /// Work item id
    pub id: String,
    /// Index into the pipeline's steps; always valid for its pipeline
    pub step_index: usize,
    /// Points carried by this item
    pub points: u32,
    /// Task backing this work item
    pub task_id: String,
    /// Assigned user ids
    pub assignees: HashSet<String>,
    /// Reviewer user ids (empty when the step needs no review)
    #[serde(default)]
    pub reviewers: HashSet<String>,
    /// Ordinal among work items on the same step in the same activity
    pub arrival_on_step_seqno: u32,
    /// Item status
    pub status: WorkStatus,
    /// When the work item arrived
    pub arrived_at: DateTime<Utc>,
}

impl PipelineWork {
    /// Creates a freshly assigned work item on `step_index`.
    pub fn new(
        step_index: usize,
        points: u32,
        task_id: impl Into<String>,
        assignees: HashSet<String>,
        reviewers: HashSet<String>,
    ) -> Self {
        Self {
            id: crate::models::task::short_task_id(),
            step_index,
            points,
            task_id: task_id.into(),
            assignees,
            reviewers,
            arrival_on_step_seqno: 1,
            status: WorkStatus::Assigned,
            arrived_at: Utc::now(),
        }
    }
}

/// Runtime record for one instantiation of a pipeline inside a task-system.
///
/// At most one activity exists per (pipeline id, task-system id) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineActivity {
    /// The pipeline this activity instantiates
    pub pipeline_id: String,
    /// The task-system the activity belongs to
    pub task_system_id: String,
    /// Live work items, in arrival order
    pub work_items: Vec<PipelineWork>,
    /// When the activity was created (first work arrival)
    pub created_at: DateTime<Utc>,
}

impl PipelineActivity {
    /// Creates an empty activity for the pair.
    pub fn new(pipeline_id: impl Into<String>, task_system_id: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            task_system_id: task_system_id.into(),
            work_items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Work items on a given step, in arrival order.
    pub fn items_on_step(&self, step_index: usize) -> impl Iterator<Item = &PipelineWork> {
        self.work_items
            .iter()
            .filter(move |w| w.step_index == step_index)
    }

    /// Highest step index among in-flight items, if any.
    pub fn max_step_index(&self) -> Option<usize> {
        self.work_items.iter().map(|w| w.step_index).max()
    }

    /// Finds the work item backing `task_id`.
    pub fn find_by_task(&self, task_id: &str) -> Option<&PipelineWork> {
        self.work_items.iter().find(|w| w.task_id == task_id)
    }

    /// Checks that every work item's step index is valid for `pipeline`.
    pub fn validate_against(&self, pipeline: &Pipeline) -> bool {
        self.work_items
            .iter()
            .all(|w| w.step_index < pipeline.steps.len())
    }
}
