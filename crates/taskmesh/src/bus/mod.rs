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

//! # In-Process Event Bus
//!
//! A topic-keyed publish/subscribe fabric. Subscribers register a handler
//! for a specific kind or a wildcard; `publish` validates the event, enqueues
//! it for every matching handler, and returns. Each handler owns a bounded
//! queue drained by its own worker task, so a slow handler back-pressures
//! only itself: when its queue is full the event is dropped for that handler
//! and counted, and other handlers are unaffected.
//!
//! Ordering: per-kind FIFO within a single publisher. Handler errors are
//! logged with the event id, kind, and handler identity, never propagated to
//! the publisher.
//!
//! The bus is constructed explicitly at startup and injected into each
//! component; one instance per process is the expected shape.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::models::event::{Event, EventKind, EventValidationError};

/// Error type handlers may return; logged by the worker, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A subscriber callback invoked for each matching event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handler identity used in logs and drop counters.
    fn name(&self) -> &str;

    /// Handles one event. Errors are logged and swallowed by the bus.
    async fn handle(&self, event: Event) -> Result<(), HandlerError>;
}

/// What a subscription matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindSelector {
    /// Exactly one kind from the closed set
    Kind(EventKind),
    /// Every event, extension kinds included
    Wildcard,
}

impl KindSelector {
    fn matches(&self, event: &Event) -> bool {
        match self {
            // Unknown (extension) kinds route only to wildcard subscribers.
            KindSelector::Kind(kind) => {
                !event.payload.is_extension() && event.kind == kind.as_str()
            }
            KindSelector::Wildcard => true,
        }
    }
}

/// Errors surfaced by `publish`.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The envelope failed kind/payload validation
    #[error(transparent)]
    Invalid(#[from] EventValidationError),

    /// The bus is shutting down and no longer accepts events
    #[error("event bus is shutting down")]
    ShuttingDown,
}

/// Configuration for the event bus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Queue capacity per handler
    pub queue_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}

struct Subscriber {
    name: String,
    selector: KindSelector,
    tx: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

/// The in-process publish/subscribe fabric.
pub struct EventBus {
    config: EventBusConfig,
    subscribers: RwLock<Vec<Subscriber>>,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    accepting: AtomicBool,
}

impl EventBus {
    /// Creates a bus with the given configuration.
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            config,
            subscribers: RwLock::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Registers `handler` for events matching `selector`.
    ///
    /// Spawns the handler's worker task immediately; the returned counter
    /// tracks events dropped for this handler due to a full queue.
    pub fn subscribe(
        &self,
        selector: KindSelector,
        handler: Arc<dyn EventHandler>,
    ) -> Arc<AtomicU64> {
        let (tx, mut rx) = mpsc::channel::<Event>(self.config.queue_capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        let name = handler.name().to_string();

        let worker_name = name.clone();
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let event_id = event.id;
                let kind = event.kind.clone();
                if let Err(e) = handler.handle(event).await {
                    error!(
                        handler = %worker_name,
                        event_id = %event_id,
                        kind = %kind,
                        error = %e,
                        "event handler failed"
                    );
                }
            }
            debug!(handler = %worker_name, "bus worker drained and exiting");
        });

        self.subscribers.write().push(Subscriber {
            name,
            selector,
            tx,
            dropped: dropped.clone(),
        });
        self.workers.lock().push(worker);
        dropped
    }

    /// Validates and enqueues `event` for every matching handler.
    ///
    /// Returns once the event is enqueued (or dropped) for each handler;
    /// handler invocation happens asynchronously on the worker tasks.
    pub fn publish(&self, event: &Event) -> Result<(), BusError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(BusError::ShuttingDown);
        }
        event.validate()?;

        let subscribers = self.subscribers.read();
        let mut delivered = 0usize;
        for sub in subscribers.iter().filter(|s| s.selector.matches(event)) {
            match sub.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    sub.dropped.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("taskmesh_bus_dropped_total", "handler" => sub.name.clone())
                        .increment(1);
                    warn!(
                        handler = %sub.name,
                        event_id = %event.id,
                        kind = %event.kind,
                        "handler queue full, dropping event for this handler"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(handler = %sub.name, "handler queue closed before shutdown");
                }
            }
        }
        metrics::counter!("taskmesh_bus_published_total", "kind" => event.kind.clone())
            .increment(1);
        debug!(event_id = %event.id, kind = %event.kind, delivered, "event published");
        Ok(())
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Stops accepting events, drains in-flight handlers up to `deadline`,
    /// then abandons the remainder.
    pub async fn shutdown(&self, deadline: Duration) {
        self.accepting.store(false, Ordering::SeqCst);
        // Dropping the senders lets each worker drain its queue and exit.
        self.subscribers.write().clear();

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        let drain = async {
            for worker in workers {
                let _ = worker.await;
            }
        };
        match tokio::time::timeout(deadline, drain).await {
            Ok(()) => info!("event bus drained"),
            Err(_) => warn!(
                deadline_ms = deadline.as_millis() as u64,
                "event bus drain deadline exceeded, abandoning handlers"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    use crate::models::event::EventPayload;

    struct RecordingHandler {
        name: String,
        seen: Arc<parking_lot::Mutex<Vec<Event>>>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, event: Event) -> Result<(), HandlerError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.seen.lock().push(event);
            Ok(())
        }
    }

    struct FailingHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler for FailingHandler {
        fn name(&self) -> &str {
            "failing"
        }

        async fn handle(&self, _event: Event) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err("handler exploded".into())
        }
    }

    fn task_created(name: &str) -> Event {
        Event::build(
            EventPayload::TaskCreated {
                task_id: "t-1".into(),
                name: name.into(),
                created_by: "alice".into(),
                created_at: chrono::Utc::now(),
            },
            "task-core",
            HashMap::new(),
        )
        .unwrap()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn kind_subscriber_receives_matching_events_only() {
        let bus = EventBus::new(EventBusConfig::default());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        bus.subscribe(
            KindSelector::Kind(EventKind::TaskCreated),
            Arc::new(RecordingHandler {
                name: "rec".into(),
                seen: seen.clone(),
                delay: None,
            }),
        );

        bus.publish(&task_created("a")).unwrap();
        let other = Event::build(
            EventPayload::UserUpdated {
                user_id: "u-1".into(),
            },
            "user-core",
            HashMap::new(),
        )
        .unwrap();
        bus.publish(&other).unwrap();

        settle().await;
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, "task.created");
    }

    #[tokio::test]
    async fn wildcard_receives_extension_events() {
        let bus = EventBus::new(EventBusConfig::default());
        let wildcard_seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let kind_seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        bus.subscribe(
            KindSelector::Wildcard,
            Arc::new(RecordingHandler {
                name: "wild".into(),
                seen: wildcard_seen.clone(),
                delay: None,
            }),
        );
        bus.subscribe(
            KindSelector::Kind(EventKind::TaskCreated),
            Arc::new(RecordingHandler {
                name: "kind".into(),
                seen: kind_seen.clone(),
                delay: None,
            }),
        );

        let ext = Event::build(
            EventPayload::Extension {
                kind: "orchestration.degraded".into(),
                data: serde_json::json!({}),
            },
            "orchestrator",
            HashMap::new(),
        )
        .unwrap();
        bus.publish(&ext).unwrap();

        settle().await;
        assert_eq!(wildcard_seen.lock().len(), 1);
        assert!(kind_seen.lock().is_empty());
    }

    #[tokio::test]
    async fn publisher_order_is_preserved_per_handler() {
        let bus = EventBus::new(EventBusConfig::default());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        bus.subscribe(
            KindSelector::Kind(EventKind::TaskCreated),
            Arc::new(RecordingHandler {
                name: "rec".into(),
                seen: seen.clone(),
                delay: None,
            }),
        );

        for i in 0..10 {
            bus.publish(&task_created(&format!("task-{i}"))).unwrap();
        }

        settle().await;
        let names: Vec<String> = seen
            .lock()
            .iter()
            .map(|e| match &e.payload {
                EventPayload::TaskCreated { name, .. } => name.clone(),
                _ => unreachable!(),
            })
            .collect();
        let expected: Vec<String> = (0..10).map(|i| format!("task-{i}")).collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn full_queue_drops_for_that_handler_only() {
        let bus = EventBus::new(EventBusConfig { queue_capacity: 1 });
        let slow_seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let fast_seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let slow_drops = bus.subscribe(
            KindSelector::Kind(EventKind::TaskCreated),
            Arc::new(RecordingHandler {
                name: "slow".into(),
                seen: slow_seen.clone(),
                delay: Some(Duration::from_millis(200)),
            }),
        );
        bus.subscribe(
            KindSelector::Kind(EventKind::TaskCreated),
            Arc::new(RecordingHandler {
                name: "fast".into(),
                seen: fast_seen.clone(),
                delay: None,
            }),
        );

        for i in 0..5 {
            bus.publish(&task_created(&format!("task-{i}"))).unwrap();
            // Let the fast worker drain between publishes; the slow worker
            // stays busy and overflows its queue.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fast_seen.lock().len(), 5, "fast handler sees everything");
        assert!(
            slow_drops.load(Ordering::Relaxed) > 0,
            "slow handler dropped some events"
        );
    }

    #[tokio::test]
    async fn handler_errors_do_not_reach_publisher() {
        let bus = EventBus::new(EventBusConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            KindSelector::Kind(EventKind::TaskCreated),
            Arc::new(FailingHandler {
                calls: calls.clone(),
            }),
        );

        assert!(bus.publish(&task_created("a")).is_ok());
        assert!(bus.publish(&task_created("b")).is_ok());

        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalid_event_is_rejected_at_publish() {
        let bus = EventBus::new(EventBusConfig::default());
        let mut event = task_created("a");
        event.kind = "inventory.level_changed".into();

        assert!(matches!(bus.publish(&event), Err(BusError::Invalid(_))));
    }

    #[tokio::test]
    async fn shutdown_drains_then_rejects_publishes() {
        let bus = EventBus::new(EventBusConfig::default());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        bus.subscribe(
            KindSelector::Kind(EventKind::TaskCreated),
            Arc::new(RecordingHandler {
                name: "rec".into(),
                seen: seen.clone(),
                delay: Some(Duration::from_millis(10)),
            }),
        );

        for i in 0..3 {
            bus.publish(&task_created(&format!("task-{i}"))).unwrap();
        }
        bus.shutdown(Duration::from_secs(1)).await;

        assert_eq!(seen.lock().len(), 3, "queued events drained on shutdown");
        assert!(matches!(
            bus.publish(&task_created("late")),
            Err(BusError::ShuttingDown)
        ));
    }
}
