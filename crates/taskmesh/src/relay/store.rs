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

//! # TTL Event Store
//!
//! The relay's in-memory store: every accepted event lives in a map keyed by
//! event id until its age exceeds the TTL. A background sweeper evicts
//! expired entries at TTL/4 cadence, so no stored event outlives 2·TTL.
//!
//! The map sits under a read/write lock; readers run in parallel, writers
//! serialize.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::event::Event;

struct StoredEvent {
    event: Event,
    stored_at: Instant,
}

/// TTL-bounded event map shared between the relay service and its sweeper.
#[derive(Clone)]
pub struct EventStore {
    inner: Arc<RwLock<HashMap<Uuid, StoredEvent>>>,
    ttl: Duration,
}

impl EventStore {
    /// Creates a store with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// The configured TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sweeper cadence: TTL/4.
    pub fn sweep_interval(&self) -> Duration {
        self.ttl / 4
    }

    /// Inserts an event keyed by its id.
    pub fn insert(&self, event: Event) {
        let mut inner = self.inner.write();
        inner.insert(
            event.id,
            StoredEvent {
                event,
                stored_at: Instant::now(),
            },
        );
        metrics::gauge!("taskmesh_relay_store_size").set(inner.len() as f64);
    }

    /// Fetches an event by id if it is present and unexpired.
    pub fn get(&self, id: &Uuid) -> Option<Event> {
        let inner = self.inner.read();
        inner.get(id).and_then(|stored| {
            if stored.stored_at.elapsed() > self.ttl {
                None
            } else {
                Some(stored.event.clone())
            }
        })
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Evicts every entry older than the TTL, returning the eviction count.
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.write();
        let before = inner.len();
        inner.retain(|_, stored| stored.stored_at.elapsed() <= self.ttl);
        let evicted = before - inner.len();
        if evicted > 0 {
            metrics::counter!("taskmesh_relay_evicted_total").increment(evicted as u64);
            metrics::gauge!("taskmesh_relay_store_size").set(inner.len() as f64);
        }
        evicted
    }

    /// Spawns the background sweeper; it runs at TTL/4 cadence until the
    /// shutdown signal flips.
    pub fn spawn_sweeper(&self, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.sweep_interval());
            // The first tick fires immediately; skip it so a fresh store is
            // not swept before anything ages.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = store.sweep();
                        if evicted > 0 {
                            debug!(evicted, "relay store sweep");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("relay store sweeper stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    use crate::models::event::EventPayload;

    fn sample_event() -> Event {
        Event::build(
            EventPayload::UserUpdated {
                user_id: "u-1".into(),
            },
            "user-core",
            StdHashMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn insert_and_get_round_trip() {
        let store = EventStore::new(Duration::from_secs(60));
        let event = sample_event();
        let id = event.id;
        store.insert(event.clone());

        assert_eq!(store.get(&id), Some(event));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_entries_are_invisible_and_swept() {
        let store = EventStore::new(Duration::from_millis(20));
        let event = sample_event();
        let id = event.id;
        store.insert(event);

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(store.get(&id), None, "expired entry is invisible");
        assert_eq!(store.sweep(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_keeps_fresh_entries() {
        let store = EventStore::new(Duration::from_secs(60));
        store.insert(sample_event());
        store.insert(sample_event());

        assert_eq!(store.sweep(), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn sweep_interval_is_quarter_ttl() {
        let store = EventStore::new(Duration::from_secs(100));
        assert_eq!(store.sweep_interval(), Duration::from_secs(25));
    }

    #[tokio::test]
    async fn sweeper_evicts_in_background() {
        let store = EventStore::new(Duration::from_millis(40));
        store.insert(sample_event());

        let (tx, rx) = watch::channel(false);
        let handle = store.spawn_sweeper(rx);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(store.is_empty(), "sweeper evicted the expired event");

        tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }
}
