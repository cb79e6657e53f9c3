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

//! # Event Envelope & Taxonomy
//!
//! The typed event record carried by the in-process bus and the relay
//! service. An [`Event`] pairs a closed set of kind tags ([`EventKind`]) with
//! a tagged payload union ([`EventPayload`]); the two must agree, and
//! [`Event::validate`] rejects envelopes where they do not.
//!
//! A reserved extension variant carries forward-compatible kinds. Extension
//! events still carry a kind tag but are excluded from payload validation and
//! are routed only to wildcard subscribers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors produced when building or validating an event envelope.
#[derive(Debug, thiserror::Error)]
pub enum EventValidationError {
    /// The payload variant does not match the envelope's kind tag
    #[error("payload variant '{payload_kind}' does not match kind tag '{kind}'")]
    KindMismatch {
        /// Kind tag on the envelope
        kind: String,
        /// Tag implied by the payload variant
        payload_kind: String,
    },

    /// The source service name is empty
    #[error("event source service must not be empty")]
    EmptySource,

    /// An extension payload declared an empty kind tag
    #[error("extension payload must carry a non-empty kind tag")]
    EmptyExtensionKind,
}

/// Closed set of event kinds carried by the federation.
///
/// Tags not in this set are reserved; they can only travel through the
/// [`EventPayload::Extension`] escape hatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// An inventory item's level changed
    InventoryLevelChanged,
    /// An inventory item was removed
    InventoryItemRemoved,
    /// A task was created
    TaskCreated,
    /// A task was assigned to a user
    TaskAssigned,
    /// A task was completed
    TaskCompleted,
    /// A task moved between stages
    TaskStageChanged,
    /// A schedule trigger fired
    ScheduleTriggered,
    /// A pipeline work item started
    PipelineWorkStarted,
    /// A pipeline work item completed
    PipelineWorkCompleted,
    /// A user account was created
    UserCreated,
    /// A user account was updated
    UserUpdated,
    /// A user account was deleted
    UserDeleted,
}

impl EventKind {
    /// Returns the canonical dotted tag for the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::InventoryLevelChanged => "inventory.level_changed",
            EventKind::InventoryItemRemoved => "inventory.item_removed",
            EventKind::TaskCreated => "task.created",
            EventKind::TaskAssigned => "task.assigned",
            EventKind::TaskCompleted => "task.completed",
            EventKind::TaskStageChanged => "task.stage_changed",
            EventKind::ScheduleTriggered => "schedule.triggered",
            EventKind::PipelineWorkStarted => "pipeline.work_started",
            EventKind::PipelineWorkCompleted => "pipeline.work_completed",
            EventKind::UserCreated => "user.created",
            EventKind::UserUpdated => "user.updated",
            EventKind::UserDeleted => "user.deleted",
        }
    }

    /// Parses a canonical tag back into a kind.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inventory.level_changed" => Some(EventKind::InventoryLevelChanged),
            "inventory.item_removed" => Some(EventKind::InventoryItemRemoved),
            "task.created" => Some(EventKind::TaskCreated),
            "task.assigned" => Some(EventKind::TaskAssigned),
            "task.completed" => Some(EventKind::TaskCompleted),
            "task.stage_changed" => Some(EventKind::TaskStageChanged),
            "schedule.triggered" => Some(EventKind::ScheduleTriggered),
            "pipeline.work_started" => Some(EventKind::PipelineWorkStarted),
            "pipeline.work_completed" => Some(EventKind::PipelineWorkCompleted),
            "user.created" => Some(EventKind::UserCreated),
            "user.updated" => Some(EventKind::UserUpdated),
            "user.deleted" => Some(EventKind::UserDeleted),
            _ => None,
        }
    }

    /// All kinds in the closed set.
    pub fn all() -> &'static [EventKind] {
        &[
            EventKind::InventoryLevelChanged,
            EventKind::InventoryItemRemoved,
            EventKind::TaskCreated,
            EventKind::TaskAssigned,
            EventKind::TaskCompleted,
            EventKind::TaskStageChanged,
            EventKind::ScheduleTriggered,
            EventKind::PipelineWorkStarted,
            EventKind::PipelineWorkCompleted,
            EventKind::UserCreated,
            EventKind::UserUpdated,
            EventKind::UserDeleted,
        ]
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed payload union over the event kinds.
///
/// Serialized form is internally tagged with the canonical kind tag, keeping
/// one tag set on the wire instead of an enum/oneof pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventPayload {
    /// Payload for `inventory.level_changed`
    #[serde(rename = "inventory.level_changed")]
    InventoryLevelChanged {
        item_id: String,
        item_name: String,
        prev_level: f64,
        new_level: f64,
        unit: String,
        threshold: f64,
        below_threshold: bool,
    },

    /// Payload for `inventory.item_removed`
    #[serde(rename = "inventory.item_removed")]
    InventoryItemRemoved {
        item_id: String,
        item_name: String,
        removed_by: String,
        removal_time: DateTime<Utc>,
    },

    /// Payload for `task.created`
    #[serde(rename = "task.created")]
    TaskCreated {
        task_id: String,
        name: String,
        created_by: String,
        created_at: DateTime<Utc>,
    },

    /// Payload for `task.assigned`
    #[serde(rename = "task.assigned")]
    TaskAssigned {
        task_id: String,
        name: String,
        assignee_id: String,
        assigned_by: String,
        assigned_at: DateTime<Utc>,
        group_id: Option<String>,
    },

    /// Payload for `task.completed`
    #[serde(rename = "task.completed")]
    TaskCompleted {
        task_id: String,
        name: String,
        completer_id: String,
        location_path: Vec<String>,
        completed_points: Vec<String>,
        completion_time: DateTime<Utc>,
    },

    /// Payload for `task.stage_changed`
    #[serde(rename = "task.stage_changed")]
    TaskStageChanged {
        task_id: String,
        from_stage: String,
        to_stage: String,
    },

    /// Payload for `schedule.triggered`
    #[serde(rename = "schedule.triggered")]
    ScheduleTriggered {
        trigger_id: String,
        trigger_name: String,
        cron_expression: String,
        context: HashMap<String, String>,
    },

    /// Payload for `pipeline.work_started`
    #[serde(rename = "pipeline.work_started")]
    PipelineWorkStarted {
        pipeline_id: String,
        task_system_id: String,
        step_index: usize,
        points: u32,
        assignee_ids: Vec<String>,
    },

    /// Payload for `pipeline.work_completed`
    #[serde(rename = "pipeline.work_completed")]
    PipelineWorkCompleted {
        pipeline_id: String,
        task_system_id: String,
        step_index: usize,
        points: u32,
        assignee_ids: Vec<String>,
    },

    /// Payload for `user.created`
    #[serde(rename = "user.created")]
    UserCreated { user_id: String, email: String },

    /// Payload for `user.updated`
    #[serde(rename = "user.updated")]
    UserUpdated { user_id: String },

    /// Payload for `user.deleted`
    #[serde(rename = "user.deleted")]
    UserDeleted { user_id: String, deleted_by: String },

    /// Reserved escape hatch for forward-compatible kinds.
    ///
    /// Extension events must still carry a kind tag; they are excluded from
    /// payload validation and routed only to wildcard subscribers.
    #[serde(rename = "_extension")]
    Extension {
        #[serde(rename = "extension_kind")]
        kind: String,
        data: serde_json::Value,
    },
}

impl EventPayload {
    /// Returns the kind tag this payload variant belongs to.
    ///
    /// For extension payloads this is the dynamic inner tag.
    pub fn kind_tag(&self) -> &str {
        match self {
            EventPayload::InventoryLevelChanged { .. } => EventKind::InventoryLevelChanged.as_str(),
            EventPayload::InventoryItemRemoved { .. } => EventKind::InventoryItemRemoved.as_str(),
            EventPayload::TaskCreated { .. } => EventKind::TaskCreated.as_str(),
            EventPayload::TaskAssigned { .. } => EventKind::TaskAssigned.as_str(),
            EventPayload::TaskCompleted { .. } => EventKind::TaskCompleted.as_str(),
            EventPayload::TaskStageChanged { .. } => EventKind::TaskStageChanged.as_str(),
            EventPayload::ScheduleTriggered { .. } => EventKind::ScheduleTriggered.as_str(),
            EventPayload::PipelineWorkStarted { .. } => EventKind::PipelineWorkStarted.as_str(),
            EventPayload::PipelineWorkCompleted { .. } => EventKind::PipelineWorkCompleted.as_str(),
            EventPayload::UserCreated { .. } => EventKind::UserCreated.as_str(),
            EventPayload::UserUpdated { .. } => EventKind::UserUpdated.as_str(),
            EventPayload::UserDeleted { .. } => EventKind::UserDeleted.as_str(),
            EventPayload::Extension { kind, .. } => kind.as_str(),
        }
    }

    /// Returns true for the extension escape hatch.
    pub fn is_extension(&self) -> bool {
        matches!(self, EventPayload::Extension { .. })
    }
}

/// The event record carried between services.
///
/// The envelope's `kind` field and the payload variant must agree; events
/// failing [`Event::validate`] are rejected at publish time. Metadata is
/// advisory routing context and never overrides typed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Opaque id, unique within a service instance's lifetime
    pub id: Uuid,
    /// Canonical kind tag (dotted form)
    pub kind: String,
    /// Name of the service that published the event
    pub source: String,
    /// Publish timestamp
    pub timestamp: DateTime<Utc>,
    /// Typed payload matching the kind tag
    pub payload: EventPayload,
    /// Advisory string metadata used by subscription filters
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Event {
    /// Builds an event envelope, deriving the kind tag from the payload so
    /// the two cannot disagree.
    pub fn build(
        payload: EventPayload,
        source: impl Into<String>,
        metadata: HashMap<String, String>,
    ) -> Result<Self, EventValidationError> {
        let source = source.into();
        if source.is_empty() {
            return Err(EventValidationError::EmptySource);
        }
        if let EventPayload::Extension { kind, .. } = &payload {
            if kind.is_empty() {
                return Err(EventValidationError::EmptyExtensionKind);
            }
        }
        Ok(Self {
            id: Uuid::new_v4(),
            kind: payload.kind_tag().to_string(),
            source,
            timestamp: Utc::now(),
            payload,
            metadata,
        })
    }

    /// Validates envelope coherence: the kind tag must match the payload
    /// variant, the source must be non-empty.
    ///
    /// Extension payloads are checked for tag agreement only; their inner
    /// shape is deliberately opaque.
    pub fn validate(&self) -> Result<(), EventValidationError> {
        if self.source.is_empty() {
            return Err(EventValidationError::EmptySource);
        }
        if let EventPayload::Extension { kind, .. } = &self.payload {
            if kind.is_empty() {
                return Err(EventValidationError::EmptyExtensionKind);
            }
        }
        if self.kind != self.payload.kind_tag() {
            return Err(EventValidationError::KindMismatch {
                kind: self.kind.clone(),
                payload_kind: self.payload.kind_tag().to_string(),
            });
        }
        Ok(())
    }

    /// Returns the parsed closed-set kind, or `None` for extension events.
    pub fn known_kind(&self) -> Option<EventKind> {
        if self.payload.is_extension() {
            None
        } else {
            EventKind::parse(&self.kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_level_changed() -> EventPayload {
        EventPayload::InventoryLevelChanged {
            item_id: "item-1".into(),
            item_name: "coffee beans".into(),
            prev_level: 100.0,
            new_level: 80.0,
            unit: "ikg".into(),
            threshold: 20.0,
            below_threshold: false,
        }
    }

    #[test]
    fn build_derives_kind_from_payload() {
        let event = Event::build(sample_level_changed(), "inventory-core", HashMap::new())
            .expect("build should succeed");
        assert_eq!(event.kind, "inventory.level_changed");
        assert!(event.validate().is_ok());
        assert_eq!(event.known_kind(), Some(EventKind::InventoryLevelChanged));
    }

    #[test]
    fn validate_rejects_kind_payload_mismatch() {
        let mut event =
            Event::build(sample_level_changed(), "inventory-core", HashMap::new()).unwrap();
        event.kind = EventKind::TaskCreated.as_str().to_string();

        match event.validate() {
            Err(EventValidationError::KindMismatch { kind, payload_kind }) => {
                assert_eq!(kind, "task.created");
                assert_eq!(payload_kind, "inventory.level_changed");
            }
            other => panic!("expected kind mismatch, got {:?}", other),
        }
    }

    #[test]
    fn build_rejects_empty_source() {
        let result = Event::build(sample_level_changed(), "", HashMap::new());
        assert!(matches!(result, Err(EventValidationError::EmptySource)));
    }

    #[test]
    fn extension_events_carry_their_own_tag() {
        let event = Event::build(
            EventPayload::Extension {
                kind: "orchestration.degraded".into(),
                data: serde_json::json!({"collaborator": "inventory"}),
            },
            "orchestrator",
            HashMap::new(),
        )
        .unwrap();

        assert_eq!(event.kind, "orchestration.degraded");
        assert!(event.validate().is_ok());
        assert_eq!(event.known_kind(), None);
    }

    #[test]
    fn extension_with_empty_kind_is_rejected() {
        let result = Event::build(
            EventPayload::Extension {
                kind: String::new(),
                data: serde_json::Value::Null,
            },
            "orchestrator",
            HashMap::new(),
        );
        assert!(matches!(
            result,
            Err(EventValidationError::EmptyExtensionKind)
        ));
    }

    #[test]
    fn event_ids_are_unique() {
        let a = Event::build(sample_level_changed(), "inventory-core", HashMap::new()).unwrap();
        let b = Event::build(sample_level_changed(), "inventory-core", HashMap::new()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn payload_serializes_with_canonical_tag() {
        let event = Event::build(sample_level_changed(), "inventory-core", HashMap::new()).unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["kind"], "inventory.level_changed");
        assert_eq!(json["kind"], "inventory.level_changed");

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn kind_tags_parse_back() {
        for kind in EventKind::all() {
            assert_eq!(EventKind::parse(kind.as_str()), Some(*kind));
        }
        assert_eq!(EventKind::parse("bogus.kind"), None);
    }
}
