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

//! # Task Domain Model
//!
//! Tasks move through stages (`pending -> inbox -> staging -> active ->
//! archived`) and statuses, accumulate work intervals with completed points,
//! and link into an acyclic dependency graph through inflow/outflow edges.
//!
//! Stage invariants enforced here:
//! - `inbox` tasks carry no location
//! - `staging` requires a non-empty location path
//! - `active` requires an open work interval
//! - total completed points never exceed declared points

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConflictReason;

/// Errors raised by task domain operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskModelError {
    /// A stage/status invariant would be violated
    #[error("invalid transition for task '{task_id}': {reason}")]
    InvalidTransition { task_id: String, reason: String },

    /// Completed points would exceed the declared points
    #[error("task '{task_id}' completed points {completed} exceed declared {declared}")]
    PointsExceeded {
        task_id: String,
        completed: u32,
        declared: u32,
    },

    /// The dependency graph would contain a cycle
    #[error("dependency cycle involving task '{task_id}'")]
    DependencyCycle { task_id: String },

    /// A referenced point title does not exist on the task
    #[error("task '{task_id}' has no point titled '{title}'")]
    UnknownPoint { task_id: String, title: String },
}

impl TaskModelError {
    /// Maps the model error onto the boundary conflict reason.
    pub fn conflict_reason(&self) -> ConflictReason {
        ConflictReason::InvalidTransition
    }
}

/// Lifecycle stage of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStage {
    Pending,
    Inbox,
    Staging,
    Active,
    Archived,
}

impl TaskStage {
    /// Returns the wire representation of the stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStage::Pending => "pending",
            TaskStage::Inbox => "inbox",
            TaskStage::Staging => "staging",
            TaskStage::Active => "active",
            TaskStage::Archived => "archived",
        }
    }

    /// Parses a stage from its wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStage::Pending),
            "inbox" => Some(TaskStage::Inbox),
            "staging" => Some(TaskStage::Staging),
            "active" => Some(TaskStage::Active),
            "archived" => Some(TaskStage::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Work status of a task, orthogonal to its stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Paused,
    Blocked,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// Returns the wire representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Paused => "paused",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named unit of value on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    /// Point title, unique within the task
    pub title: String,
    /// Point value
    pub value: u32,
}

/// A span of work on a task; open intervals have no stop time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkInterval {
    /// When work started
    pub start: DateTime<Utc>,
    /// When work stopped; `None` while the interval is open
    pub stop: Option<DateTime<Utc>>,
    /// Titles of points completed during this interval
    #[serde(default)]
    pub completed_points: Vec<String>,
}

/// A timestamped note in a task's status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusNote {
    /// When the note was recorded
    pub at: DateTime<Utc>,
    /// Free-form note
    pub note: String,
}

/// A tagged value attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TagValue {
    /// Plain text
    Text { value: String },
    /// Geographic location
    Geo { lat: f64, lon: f64 },
    /// Point in time
    Time { value: DateTime<Utc> },
}

/// Generates a short collision-resistant task id (12 hex chars of a v4 uuid).
pub fn short_task_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// A task tracked by the federation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Short collision-resistant id
    pub id: String,
    /// Task name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Owning user id
    pub owner_id: String,
    /// Lifecycle stage
    pub stage: TaskStage,
    /// Work status
    pub status: TaskStatus,
    /// Ordered location path; empty in `inbox`
    #[serde(default)]
    pub location: Vec<String>,
    /// Declared points
    #[serde(default)]
    pub points: Vec<Point>,
    /// Work intervals, oldest first
    #[serde(default)]
    pub intervals: Vec<WorkInterval>,
    /// Optional due time
    pub due: Option<DateTime<Utc>>,
    /// Status history, oldest first
    #[serde(default)]
    pub history: Vec<StatusNote>,
    /// Tagged values by tag name
    #[serde(default)]
    pub tags: HashMap<String, TagValue>,
    /// Predecessor task ids
    #[serde(default)]
    pub inflows: Vec<String>,
    /// Successor task ids
    #[serde(default)]
    pub outflows: Vec<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a new task in the `pending` stage.
    pub fn new(name: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: short_task_id(),
            name: name.into(),
            description: String::new(),
            owner_id: owner_id.into(),
            stage: TaskStage::Pending,
            status: TaskStatus::Todo,
            location: Vec::new(),
            points: Vec::new(),
            intervals: Vec::new(),
            due: None,
            history: Vec::new(),
            tags: HashMap::new(),
            inflows: Vec::new(),
            outflows: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sum of declared point values.
    pub fn declared_points(&self) -> u32 {
        self.points.iter().map(|p| p.value).sum()
    }

    /// Sum of completed point values across all intervals.
    pub fn completed_points(&self) -> u32 {
        let by_title: HashMap<&str, u32> = self
            .points
            .iter()
            .map(|p| (p.title.as_str(), p.value))
            .collect();
        self.intervals
            .iter()
            .flat_map(|i| i.completed_points.iter())
            .filter_map(|title| by_title.get(title.as_str()).copied())
            .sum()
    }

    /// The currently open work interval, if any.
    pub fn open_interval(&self) -> Option<&WorkInterval> {
        self.intervals.iter().find(|i| i.stop.is_none())
    }

    /// Checks the stage and point-accounting invariants.
    pub fn validate(&self) -> Result<(), TaskModelError> {
        match self.stage {
            TaskStage::Inbox if !self.location.is_empty() => {
                return Err(self.transition_error("inbox tasks carry no location"));
            }
            TaskStage::Staging if self.location.is_empty() => {
                return Err(self.transition_error("staging requires a non-empty location"));
            }
            TaskStage::Active if self.open_interval().is_none() => {
                return Err(self.transition_error("active requires an open work interval"));
            }
            _ => {}
        }

        let completed = self.completed_points();
        let declared = self.declared_points();
        if completed > declared {
            return Err(TaskModelError::PointsExceeded {
                task_id: self.id.clone(),
                completed,
                declared,
            });
        }
        Ok(())
    }

    fn transition_error(&self, reason: &str) -> TaskModelError {
        TaskModelError::InvalidTransition {
            task_id: self.id.clone(),
            reason: reason.to_string(),
        }
    }

    /// Records a note in the status history and bumps the update time.
    pub fn note(&mut self, note: impl Into<String>) {
        let now = Utc::now();
        self.history.push(StatusNote {
            at: now,
            note: note.into(),
        });
        self.updated_at = now;
    }

    /// Moves the task into `staging` at the given location with the given
    /// declared points.
    pub fn move_to_staging(
        &mut self,
        location: Vec<String>,
        points: Vec<Point>,
    ) -> Result<(), TaskModelError> {
        if location.is_empty() {
            return Err(self.transition_error("staging requires a non-empty location"));
        }
        self.location = location;
        self.points = points;
        self.stage = TaskStage::Staging;
        self.note("moved to staging");
        Ok(())
    }

    /// Opens a work interval and activates the task.
    pub fn start(&mut self) -> Result<(), TaskModelError> {
        if self.open_interval().is_some() {
            return Err(self.transition_error("task already has an open interval"));
        }
        if matches!(self.status, TaskStatus::Completed | TaskStatus::Cancelled) {
            return Err(self.transition_error("cannot start a finished task"));
        }
        self.intervals.push(WorkInterval {
            start: Utc::now(),
            stop: None,
            completed_points: Vec::new(),
        });
        self.stage = TaskStage::Active;
        self.status = TaskStatus::InProgress;
        self.note("work started");
        Ok(())
    }

    /// Closes the open interval, recording the points completed during it.
    pub fn stop(&mut self, completed_points: Vec<String>) -> Result<(), TaskModelError> {
        for title in &completed_points {
            if !self.points.iter().any(|p| &p.title == title) {
                return Err(TaskModelError::UnknownPoint {
                    task_id: self.id.clone(),
                    title: title.clone(),
                });
            }
        }
        let task_id = self.id.clone();
        let interval = self
            .intervals
            .iter_mut()
            .find(|i| i.stop.is_none())
            .ok_or_else(|| TaskModelError::InvalidTransition {
                task_id,
                reason: "no open interval to stop".to_string(),
            })?;
        interval.stop = Some(Utc::now());
        interval.completed_points = completed_points;
        self.status = TaskStatus::Paused;
        self.stage = if self.location.is_empty() {
            TaskStage::Pending
        } else {
            TaskStage::Staging
        };
        self.validate()?;
        self.note("work stopped");
        Ok(())
    }

    /// Completes the task, closing any open interval.
    ///
    /// Returns the titles of all completed points for the completion event.
    pub fn complete(&mut self) -> Result<Vec<String>, TaskModelError> {
        if matches!(self.status, TaskStatus::Completed | TaskStatus::Cancelled) {
            return Err(self.transition_error("task already finished"));
        }
        if let Some(interval) = self.intervals.iter_mut().find(|i| i.stop.is_none()) {
            interval.stop = Some(Utc::now());
        }
        self.status = TaskStatus::Completed;
        self.stage = TaskStage::Archived;
        self.note("completed");
        Ok(self
            .intervals
            .iter()
            .flat_map(|i| i.completed_points.iter().cloned())
            .collect())
    }

    /// Merges `other` into this task: union of points, intervals, tags, and
    /// dependency edges. `other` should be discarded by the caller.
    pub fn merge(&mut self, other: Task) -> Result<(), TaskModelError> {
        for point in other.points {
            if !self.points.iter().any(|p| p.title == point.title) {
                self.points.push(point);
            }
        }
        self.intervals.extend(other.intervals);
        for (name, value) in other.tags {
            self.tags.entry(name).or_insert(value);
        }
        for id in other.inflows {
            if id != self.id && !self.inflows.contains(&id) {
                self.inflows.push(id);
            }
        }
        for id in other.outflows {
            if id != self.id && !self.outflows.contains(&id) {
                self.outflows.push(id);
            }
        }
        self.validate()?;
        self.note(format!("merged task {}", other.id));
        Ok(())
    }

    /// Splits the points named in `point_titles` off into a new task.
    ///
    /// The new task inherits the stage, location, and owner; intervals stay
    /// with the original.
    pub fn split(&mut self, point_titles: &[String]) -> Result<Task, TaskModelError> {
        for title in point_titles {
            if !self.points.iter().any(|p| &p.title == title) {
                return Err(TaskModelError::UnknownPoint {
                    task_id: self.id.clone(),
                    title: title.clone(),
                });
            }
        }
        let (split_points, kept_points): (Vec<Point>, Vec<Point>) = self
            .points
            .drain(..)
            .partition(|p| point_titles.contains(&p.title));
        self.points = kept_points;

        let mut split_task = Task::new(format!("{} (split)", self.name), self.owner_id.clone());
        split_task.stage = if self.stage == TaskStage::Active {
            TaskStage::Staging
        } else {
            self.stage
        };
        split_task.location = self.location.clone();
        split_task.points = split_points;
        self.note(format!("split into {}", split_task.id));
        Ok(split_task)
    }
}

/// Checks that the dependency graph over `tasks` is acyclic, following
/// outflow edges.
///
/// Returns the id of a task on a cycle when one exists.
pub fn detect_dependency_cycle(tasks: &[Task]) -> Result<(), TaskModelError> {
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut in_stack: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a Task>,
        visited: &mut HashSet<&'a str>,
        in_stack: &mut HashSet<&'a str>,
    ) -> Result<(), TaskModelError> {
        if in_stack.contains(id) {
            return Err(TaskModelError::DependencyCycle {
                task_id: id.to_string(),
            });
        }
        if !visited.insert(id) {
            return Ok(());
        }
        in_stack.insert(id);
        if let Some(task) = by_id.get(id) {
            for next in &task.outflows {
                visit(next.as_str(), by_id, visited, in_stack)?;
            }
        }
        in_stack.remove(id);
        Ok(())
    }

    for task in tasks {
        visit(task.id.as_str(), &by_id, &mut visited, &mut in_stack)?;
    }
    Ok(())
}
