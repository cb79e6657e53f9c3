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

//! # Event Relay Service
//!
//! The out-of-process relay: remote publish plus streaming subscriptions
//! with filters. Every accepted event is stored in the TTL store and fanned
//! out to matching subscriptions. Filter semantics: `source_service` matches
//! the envelope's source field directly; every other key matches event
//! metadata by exact equality. A failed send to a subscriber unregisters
//! that subscriber.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::store::EventStore;
use crate::models::event::{Event, EventValidationError};

/// Filter key matched against the envelope source rather than metadata.
const SOURCE_SERVICE_KEY: &str = "source_service";

/// Errors surfaced by the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The envelope failed kind/payload validation
    #[error(transparent)]
    Invalid(#[from] EventValidationError),

    /// The relay is shutting down
    #[error("event relay is shutting down")]
    ShuttingDown,
}

/// What a subscription wants delivered.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    /// Kind tags to deliver; empty means every kind
    pub kinds: HashSet<String>,
    /// Key/value filters; `source_service` matches the envelope source,
    /// all other keys match metadata exactly
    pub filters: HashMap<String, String>,
}

impl SubscriptionFilter {
    /// Creates a filter for the given kinds and key/value constraints.
    pub fn new(kinds: impl IntoIterator<Item = String>, filters: HashMap<String, String>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            filters,
        }
    }

    /// True when `event` should be delivered to this subscription.
    pub fn matches(&self, event: &Event) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        self.filters.iter().all(|(key, expected)| {
            if key == SOURCE_SERVICE_KEY {
                &event.source == expected
            } else {
                event.metadata.get(key) == Some(expected)
            }
        })
    }
}

struct Subscription {
    filter: SubscriptionFilter,
    tx: mpsc::Sender<Event>,
}

/// The relay service: publish, filtered streaming subscriptions, TTL store.
pub struct EventRelay {
    store: EventStore,
    subscriptions: RwLock<HashMap<Uuid, Subscription>>,
    stream_buffer: usize,
    shutdown_tx: watch::Sender<bool>,
    sweeper: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl EventRelay {
    /// Default per-subscription stream buffer.
    const DEFAULT_STREAM_BUFFER: usize = 128;

    /// Creates a relay with the given event TTL and starts its sweeper.
    pub fn new(ttl: Duration) -> Self {
        let store = EventStore::new(ttl);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = store.spawn_sweeper(shutdown_rx);
        Self {
            store,
            subscriptions: RwLock::new(HashMap::new()),
            stream_buffer: Self::DEFAULT_STREAM_BUFFER,
            shutdown_tx,
            sweeper: parking_lot::Mutex::new(Some(sweeper)),
        }
    }

    /// The underlying TTL store.
    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Validates, stores, and fans `event` out to matching subscriptions.
    ///
    /// Subscribers whose stream cannot accept the event (full or
    /// disconnected) are unregistered.
    pub fn publish(&self, event: Event) -> Result<(), RelayError> {
        if *self.shutdown_tx.borrow() {
            return Err(RelayError::ShuttingDown);
        }
        event.validate()?;
        self.store.insert(event.clone());

        let mut stale: Vec<Uuid> = Vec::new();
        {
            let subscriptions = self.subscriptions.read();
            for (id, sub) in subscriptions.iter() {
                if !sub.filter.matches(&event) {
                    continue;
                }
                if let Err(e) = sub.tx.try_send(event.clone()) {
                    warn!(
                        subscription_id = %id,
                        error = %e,
                        "failed to deliver to subscriber, unregistering"
                    );
                    stale.push(*id);
                }
            }
        }
        if !stale.is_empty() {
            let mut subscriptions = self.subscriptions.write();
            for id in stale {
                subscriptions.remove(&id);
            }
        }
        metrics::counter!("taskmesh_relay_published_total", "kind" => event.kind.clone())
            .increment(1);
        Ok(())
    }

    /// Registers a subscription and returns its opaque id plus the event
    /// stream. Events published after this call that match the filter are
    /// delivered until the receiver is dropped or the id is unsubscribed.
    pub fn subscribe(&self, filter: SubscriptionFilter) -> (Uuid, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(self.stream_buffer);
        let id = Uuid::new_v4();
        self.subscriptions
            .write()
            .insert(id, Subscription { filter, tx });
        debug!(subscription_id = %id, "subscription registered");
        (id, rx)
    }

    /// Removes a subscription; its stream ends.
    pub fn unsubscribe(&self, id: &Uuid) {
        if self.subscriptions.write().remove(id).is_some() {
            debug!(subscription_id = %id, "subscription removed");
        }
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Stops the sweeper and closes every subscription stream.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.subscriptions.write().clear();
        if let Some(handle) = self.sweeper.lock().take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
        info!("event relay stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::EventPayload;

    fn level_changed(source: &str, metadata: HashMap<String, String>) -> Event {
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
            metadata,
        )
        .unwrap()
    }

    fn task_completed(source: &str) -> Event {
        Event::build(
            EventPayload::TaskCompleted {
                task_id: "t-1".into(),
                name: "clean".into(),
                completer_id: "alice".into(),
                location_path: vec![],
                completed_points: vec![],
                completion_time: chrono::Utc::now(),
            },
            source,
            HashMap::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn kind_and_source_filters_select_exactly() {
        let relay = EventRelay::new(Duration::from_secs(60));
        let filter = SubscriptionFilter::new(
            ["inventory.level_changed".to_string()],
            HashMap::from([(SOURCE_SERVICE_KEY.to_string(), "inventory-core".to_string())]),
        );
        let (_id, mut rx) = relay.subscribe(filter);

        relay.publish(task_completed("task-core")).unwrap();
        relay
            .publish(level_changed("inventory-core", HashMap::new()))
            .unwrap();
        relay
            .publish(level_changed("other-service", HashMap::new()))
            .unwrap();

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.kind, "inventory.level_changed");
        assert_eq!(delivered.source, "inventory-core");
        assert!(rx.try_recv().is_err(), "exactly one event matched");
    }

    #[tokio::test]
    async fn metadata_filters_match_exactly() {
        let relay = EventRelay::new(Duration::from_secs(60));
        let filter = SubscriptionFilter::new(
            [],
            HashMap::from([("tenant".to_string(), "acme".to_string())]),
        );
        let (_id, mut rx) = relay.subscribe(filter);

        relay
            .publish(level_changed(
                "inventory-core",
                HashMap::from([("tenant".to_string(), "acme".to_string())]),
            ))
            .unwrap();
        relay
            .publish(level_changed(
                "inventory-core",
                HashMap::from([("tenant".to_string(), "globex".to_string())]),
            ))
            .unwrap();
        relay
            .publish(level_changed("inventory-core", HashMap::new()))
            .unwrap();

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.metadata.get("tenant").unwrap(), "acme");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_kind_set_matches_all_kinds() {
        let relay = EventRelay::new(Duration::from_secs(60));
        let (_id, mut rx) = relay.subscribe(SubscriptionFilter::default());

        relay.publish(task_completed("task-core")).unwrap();
        relay
            .publish(level_changed("inventory-core", HashMap::new()))
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().kind, "task.completed");
        assert_eq!(rx.recv().await.unwrap().kind, "inventory.level_changed");
    }

    #[tokio::test]
    async fn dropped_receiver_unregisters_on_next_send() {
        let relay = EventRelay::new(Duration::from_secs(60));
        let (_id, rx) = relay.subscribe(SubscriptionFilter::default());
        assert_eq!(relay.subscription_count(), 1);

        drop(rx);
        relay.publish(task_completed("task-core")).unwrap();
        assert_eq!(relay.subscription_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_ends_the_stream() {
        let relay = EventRelay::new(Duration::from_secs(60));
        let (id, mut rx) = relay.subscribe(SubscriptionFilter::default());
        relay.unsubscribe(&id);

        assert!(rx.recv().await.is_none(), "stream ends after unsubscribe");
    }

    #[tokio::test]
    async fn published_events_land_in_the_store() {
        let relay = EventRelay::new(Duration::from_secs(60));
        let event = task_completed("task-core");
        let event_id = event.id;
        relay.publish(event).unwrap();

        assert!(relay.store().get(&event_id).is_some());
    }

    #[tokio::test]
    async fn subscription_ids_are_unique() {
        let relay = EventRelay::new(Duration::from_secs(60));
        let (a, _rx_a) = relay.subscribe(SubscriptionFilter::default());
        let (b, _rx_b) = relay.subscribe(SubscriptionFilter::default());
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn shutdown_rejects_further_publishes() {
        let relay = EventRelay::new(Duration::from_secs(60));
        relay.shutdown().await;
        assert!(matches!(
            relay.publish(task_completed("task-core")),
            Err(RelayError::ShuttingDown)
        ));
    }
}
