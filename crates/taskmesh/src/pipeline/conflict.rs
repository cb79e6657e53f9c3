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

//! # Conflict Policy Engine
//!
//! Resolves the arrival of a new work item against an activity's in-flight
//! work. The engine operates on a snapshot of the work list and returns the
//! decision, the mutated list, and the notifications to emit; the caller
//! applies the result back under the activity lock and must not mutate the
//! activity on a rejection.
//!
//! Policies are evaluated with fixed precedence:
//! `surpass -> block -> aggregate -> stack -> replace`, `replace` being the
//! default when none of the others is set.

use tracing::debug;

use crate::error::ConflictReason;
use crate::models::pipeline::{ConflictPolicy, PipelineWork};
use crate::models::user::NotificationKind;

/// A notification the caller should emit after applying the outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingNotification {
    /// Recipient user id
    pub user_id: String,
    /// Notification class
    pub kind: NotificationKind,
    /// Rendered-ready message body
    pub message: String,
}

/// Accept/reject decision for the arrival.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictDecision {
    /// The arrival was accepted into the activity
    Accepted {
        /// True when the arrival was merged into an existing item
        aggregated: bool,
    },
    /// The arrival was rejected; the activity must stay untouched
    Rejected {
        /// Why the arrival was rejected
        reason: ConflictReason,
    },
}

/// Result of resolving one arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictOutcome {
    /// The decision
    pub decision: ConflictDecision,
    /// The work list after resolution; identical to the input snapshot on a
    /// rejection
    pub work_items: Vec<PipelineWork>,
    /// Notifications to emit
    pub notifications: Vec<PendingNotification>,
}

impl ConflictOutcome {
    /// True when the arrival was accepted.
    pub fn accepted(&self) -> bool {
        matches!(self.decision, ConflictDecision::Accepted { .. })
    }
}

/// Resolves `incoming` against the `existing` snapshot under `policy`.
pub fn resolve(
    existing: &[PipelineWork],
    mut incoming: PipelineWork,
    policy: &ConflictPolicy,
) -> ConflictOutcome {
    // Surpass gate: new work beyond every in-flight step is only admitted
    // when the policy allows surpassing.
    if let Some(max_step) = existing.iter().map(|w| w.step_index).max() {
        if incoming.step_index > max_step {
            if !policy.allow_surpass {
                debug!(
                    step = incoming.step_index,
                    max_step, "rejecting surpassing arrival"
                );
                return ConflictOutcome {
                    decision: ConflictDecision::Rejected {
                        reason: ConflictReason::BlockedByPolicy,
                    },
                    work_items: existing.to_vec(),
                    notifications: blocked_notifications(&incoming),
                };
            }
            // Allowed surpassing work is accepted alongside.
            incoming.arrival_on_step_seqno = next_seqno(existing, incoming.step_index);
            let notifications = assignment_notifications(&incoming);
            let mut work_items = existing.to_vec();
            work_items.push(incoming);
            return ConflictOutcome {
                decision: ConflictDecision::Accepted { aggregated: false },
                work_items,
                notifications,
            };
        }
    }

    // Empty activity: always accept.
    if existing.is_empty() {
        let notifications = assignment_notifications(&incoming);
        return ConflictOutcome {
            decision: ConflictDecision::Accepted { aggregated: false },
            work_items: vec![incoming],
            notifications,
        };
    }

    if policy.block {
        return ConflictOutcome {
            decision: ConflictDecision::Rejected {
                reason: ConflictReason::Blocked,
            },
            work_items: existing.to_vec(),
            notifications: blocked_notifications(&incoming),
        };
    }

    if let Some(aggregate) = policy.aggregate {
        return resolve_aggregate(existing, incoming, aggregate.mtu);
    }

    if policy.stack {
        incoming.arrival_on_step_seqno = next_seqno(existing, incoming.step_index);
        let notifications = assignment_notifications(&incoming);
        let mut work_items = existing.to_vec();
        work_items.push(incoming);
        return ConflictOutcome {
            decision: ConflictDecision::Accepted { aggregated: false },
            work_items,
            notifications,
        };
    }

    // Replace: the default. Existing work is discarded, its assignees told.
    let mut notifications: Vec<PendingNotification> = Vec::new();
    for item in existing {
        for user_id in &item.assignees {
            notifications.push(PendingNotification {
                user_id: user_id.clone(),
                kind: NotificationKind::Replacement,
                message: format!(
                    "your work on step {} of this pipeline was replaced by newer work",
                    item.step_index
                ),
            });
        }
    }
    incoming.arrival_on_step_seqno = 1;
    notifications.extend(assignment_notifications(&incoming));
    ConflictOutcome {
        decision: ConflictDecision::Accepted { aggregated: false },
        work_items: vec![incoming],
        notifications,
    }
}

/// Merges same-step arrivals in order, chunked by the MTU.
///
/// The building item absorbs each subsequent same-step arrival while the
/// combined points stay under the MTU; absorbed items disappear and the
/// merged item's assignee set is the union. When the MTU would be met or
/// exceeded, a new chunk starts with the next arrival-on-step sequence
/// number.
fn resolve_aggregate(
    existing: &[PipelineWork],
    incoming: PipelineWork,
    mtu: u32,
) -> ConflictOutcome {
    let step_index = incoming.step_index;
    let notifications = assignment_notifications(&incoming);

    let mut other_steps: Vec<PipelineWork> = Vec::new();
    let mut same_step: Vec<PipelineWork> = Vec::new();
    for item in existing {
        if item.step_index == step_index {
            same_step.push(item.clone());
        } else {
            other_steps.push(item.clone());
        }
    }
    same_step.push(incoming);

    let mut aggregated = false;
    let mut chunks: Vec<PipelineWork> = Vec::new();
    for arrival in same_step {
        match chunks.last_mut() {
            Some(building) if building.points + arrival.points < mtu => {
                building.points += arrival.points;
                building
                    .assignees
                    .extend(arrival.assignees.iter().cloned());
                building
                    .reviewers
                    .extend(arrival.reviewers.iter().cloned());
                aggregated = true;
            }
            Some(building) => {
                let seqno = building.arrival_on_step_seqno + 1;
                let mut next = arrival;
                next.arrival_on_step_seqno = seqno;
                chunks.push(next);
            }
            None => {
                let mut first = arrival;
                first.arrival_on_step_seqno = 1;
                chunks.push(first);
            }
        }
    }

    let mut work_items = other_steps;
    work_items.extend(chunks);
    ConflictOutcome {
        decision: ConflictDecision::Accepted { aggregated },
        work_items,
        notifications,
    }
}

fn next_seqno(existing: &[PipelineWork], step_index: usize) -> u32 {
    existing
        .iter()
        .filter(|w| w.step_index == step_index)
        .map(|w| w.arrival_on_step_seqno)
        .max()
        .unwrap_or(0)
        + 1
}

fn assignment_notifications(incoming: &PipelineWork) -> Vec<PendingNotification> {
    incoming
        .assignees
        .iter()
        .map(|user_id| PendingNotification {
            user_id: user_id.clone(),
            kind: NotificationKind::Assignment,
            message: format!(
                "you were assigned work on step {} ({} points)",
                incoming.step_index, incoming.points
            ),
        })
        .collect()
}

fn blocked_notifications(incoming: &PipelineWork) -> Vec<PendingNotification> {
    incoming
        .assignees
        .iter()
        .map(|user_id| PendingNotification {
            user_id: user_id.clone(),
            kind: NotificationKind::Blocked,
            message: format!(
                "proposed work on step {} was rejected by the pipeline's conflict policy",
                incoming.step_index
            ),
        })
        .collect()
}
