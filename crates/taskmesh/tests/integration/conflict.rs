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

//! Conflict policy scenarios driven through the workflow engine.

use std::sync::Arc;

use async_trait::async_trait;

use taskmesh::bus::{EventBus, EventBusConfig};
use taskmesh::error::ConflictReason;
use taskmesh::models::pipeline::{
    AggregatePolicy, AssignmentPolicy, ConflictPolicy, Pipeline, PipelineStep,
};
use taskmesh::notifier::{Notification, NotificationSink};
use taskmesh::pipeline::{
    AssignmentEngine, PoolMember, SelectionPools, WorkflowEngine, WorkflowError,
};

struct SilentSink;

#[async_trait]
impl NotificationSink for SilentSink {
    async fn dispatch(&self, _user_id: &str, _notification: Notification) {}
}

fn engine(policy: ConflictPolicy) -> Arc<WorkflowEngine> {
    let bus = Arc::new(EventBus::new(EventBusConfig::default()));
    let engine = Arc::new(WorkflowEngine::new(
        "workflow-core",
        AssignmentEngine::default(),
        bus,
        Arc::new(SilentSink),
    ));
    engine.register_pipeline(Pipeline {
        id: "pl-1".into(),
        name: "intake".into(),
        task_system_id: "ts-1".into(),
        steps: vec![PipelineStep {
            name: "step-0".into(),
            assignment: AssignmentPolicy::NewAssignee,
            requires_review: false,
            points_budget: 20,
        }],
        conflict_policy: policy,
    });
    engine.set_pools(
        "ts-1",
        SelectionPools {
            assignees: vec![
                PoolMember::new("alice"),
                PoolMember::new("bob"),
                PoolMember::new("carol"),
            ],
            reviewers: vec![],
        },
    );
    engine
}

/// Aggregate with MTU=10: step-0 arrivals of 3 and 4 points merge into a
/// single 7-point item; a further 5-point arrival starts a second chunk
/// with arrival-on-step seqno 2.
#[tokio::test]
async fn aggregate_scenario_merges_then_chunks() {
    let engine = engine(ConflictPolicy {
        aggregate: Some(AggregatePolicy { mtu: 10 }),
        ..Default::default()
    });

    engine.submit_work("ts-1", "pl-1", 0, 3).await.unwrap();
    let second = engine.submit_work("ts-1", "pl-1", 0, 4).await.unwrap();
    assert!(second.aggregated);

    {
        let activity = engine.activities().find("ts-1", "pl-1").unwrap();
        let items = activity.lock().work_items.clone();
        assert_eq!(items.len(), 1, "A and B merged");
        assert_eq!(items[0].points, 7);
    }

    engine.submit_work("ts-1", "pl-1", 0, 5).await.unwrap();
    let activity = engine.activities().find("ts-1", "pl-1").unwrap();
    let items = activity.lock().work_items.clone();
    assert_eq!(items.len(), 2, "C starts a second chunk");
    let chunk2 = items
        .iter()
        .find(|w| w.arrival_on_step_seqno == 2)
        .expect("second chunk present");
    assert_eq!(chunk2.points, 5);
}

/// Block: the first arrival is retained, the second fails with `blocked`
/// and leaves the activity untouched.
#[tokio::test]
async fn block_scenario_rejects_second_arrival() {
    let engine = engine(ConflictPolicy {
        block: true,
        ..Default::default()
    });

    let first = engine.submit_work("ts-1", "pl-1", 0, 3).await.unwrap();
    let result = engine.submit_work("ts-1", "pl-1", 0, 4).await;

    match result {
        Err(WorkflowError::Rejected { reason }) => {
            assert_eq!(reason, ConflictReason::Blocked);
        }
        other => panic!("expected blocked rejection, got {:?}", other.map(|_| ())),
    }

    let activity = engine.activities().find("ts-1", "pl-1").unwrap();
    let items = activity.lock().work_items.clone();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].task_id, first.task_id, "only A retained");
}

/// Replace (the default): after the second arrival is accepted, the activity
/// holds exactly the new item.
#[tokio::test]
async fn replace_scenario_keeps_only_newest() {
    let engine = engine(ConflictPolicy::default());

    engine.submit_work("ts-1", "pl-1", 0, 3).await.unwrap();
    let second = engine.submit_work("ts-1", "pl-1", 0, 4).await.unwrap();

    let activity = engine.activities().find("ts-1", "pl-1").unwrap();
    let items = activity.lock().work_items.clone();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].task_id, second.task_id);
    assert_eq!(items[0].points, 4);
}

/// Stack: both arrivals coexist without merging.
#[tokio::test]
async fn stack_scenario_accepts_alongside() {
    let engine = engine(ConflictPolicy {
        stack: true,
        ..Default::default()
    });

    engine.submit_work("ts-1", "pl-1", 0, 3).await.unwrap();
    engine.submit_work("ts-1", "pl-1", 0, 4).await.unwrap();

    let activity = engine.activities().find("ts-1", "pl-1").unwrap();
    let items = activity.lock().work_items.clone();
    assert_eq!(items.len(), 2);
    let seqnos: Vec<u32> = items.iter().map(|w| w.arrival_on_step_seqno).collect();
    assert!(seqnos.contains(&1) && seqnos.contains(&2));
}
