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

//! End-to-end behavior of the event relay: filtered subscriptions and the
//! TTL store under its sweeper.

use std::collections::HashMap;
use std::time::Duration;

use taskmesh::models::event::{Event, EventPayload};
use taskmesh::relay::{EventRelay, SubscriptionFilter};

fn level_changed_from(source: &str) -> Event {
    Event::build(
        EventPayload::InventoryLevelChanged {
            item_id: "item-1".into(),
            item_name: "coffee".into(),
            prev_level: 100.0,
            new_level: 80.0,
            unit: "ikg".into(),
            threshold: 20.0,
            below_threshold: false,
        },
        source,
        HashMap::new(),
    )
    .unwrap()
}

fn task_completed() -> Event {
    Event::build(
        EventPayload::TaskCompleted {
            task_id: "t-1".into(),
            name: "clean".into(),
            completer_id: "alice".into(),
            location_path: vec!["basement".into()],
            completed_points: vec!["drain".into()],
            completion_time: chrono::Utc::now(),
        },
        "task-core",
        HashMap::new(),
    )
    .unwrap()
}

/// Subscribe with kinds={inventory.level_changed} and
/// filters={source_service: inventory-core}; publish a task.completed and a
/// matching inventory.level_changed; exactly the second is delivered.
#[tokio::test]
async fn filtered_subscription_delivers_exactly_the_match() {
    let relay = EventRelay::new(Duration::from_secs(60));
    let (_id, mut rx) = relay.subscribe(SubscriptionFilter::new(
        ["inventory.level_changed".to_string()],
        HashMap::from([("source_service".to_string(), "inventory-core".to_string())]),
    ));

    relay.publish(task_completed()).unwrap();
    relay.publish(level_changed_from("inventory-core")).unwrap();

    let delivered = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("delivery within a second")
        .expect("stream open");
    assert_eq!(delivered.kind, "inventory.level_changed");
    assert_eq!(delivered.source, "inventory-core");
    assert!(rx.try_recv().is_err(), "no second delivery");

    relay.shutdown().await;
}

/// Events outlive neither the TTL nor one sweep cycle past it: after the
/// sweeper runs, an expired event is gone from the store.
#[tokio::test]
async fn ttl_store_evicts_expired_events() {
    let relay = EventRelay::new(Duration::from_millis(100));
    let event = task_completed();
    let event_id = event.id;
    relay.publish(event).unwrap();
    assert!(relay.store().get(&event_id).is_some());

    // Sweeper cadence is TTL/4 = 25ms; by 2x TTL the entry must be gone.
    tokio::time::sleep(Duration::from_millis(220)).await;
    assert!(relay.store().get(&event_id).is_none(), "expired entry visible");
    assert_eq!(relay.store().len(), 0, "expired entry still stored");

    relay.shutdown().await;
}

/// Publishing while a subscriber is live delivers every matching event in
/// publish order.
#[tokio::test]
async fn live_subscription_sees_publish_order() {
    let relay = EventRelay::new(Duration::from_secs(60));
    let (_id, mut rx) = relay.subscribe(SubscriptionFilter::default());

    for _ in 0..5 {
        relay.publish(task_completed()).unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..5 {
        seen.push(
            tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    assert_eq!(seen.len(), 5);

    relay.shutdown().await;
}
