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

//! # Trigger Scheduler
//!
//! Spawns one cooperative task per configured trigger. Each task sleeps the
//! trigger's poll interval, polls, and on a firing hands the binding and
//! context to the sink on a detached task so the watcher always advances
//! past the fire time. Unless the trigger allows concurrency, a firing that
//! is still running suppresses the next one instead of re-entering it.
//!
//! Watchers obey the shutdown signal and log-and-continue on errors; they
//! never die on a failed poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{Trigger, TriggerBinding, TriggerContext, TriggerResult};

/// Receives trigger firings; implemented by the workflow engine.
#[async_trait]
pub trait TriggerSink: Send + Sync {
    /// Handles one firing: the pipeline binding plus the trigger's context.
    async fn trigger_fired(&self, binding: TriggerBinding, context: TriggerContext);
}

/// A trigger paired with the pipeline it feeds.
pub struct ConfiguredTrigger {
    /// The watcher
    pub trigger: Arc<dyn Trigger>,
    /// Where firings go
    pub binding: TriggerBinding,
}

/// Runs all configured triggers as independent cooperative tasks.
pub struct TriggerScheduler {
    sink: Arc<dyn TriggerSink>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl TriggerScheduler {
    /// Creates a scheduler delivering firings to `sink`; `shutdown_rx`
    /// flipping to `true` stops every watcher.
    pub fn new(sink: Arc<dyn TriggerSink>, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            sink,
            shutdown_rx,
            handles: Vec::new(),
        }
    }

    /// Spawns a watcher task for `configured`.
    pub fn spawn(&mut self, configured: ConfiguredTrigger) {
        let trigger = configured.trigger;
        let binding = configured.binding;
        let sink = self.sink.clone();
        let mut shutdown = self.shutdown_rx.clone();
        let in_flight = Arc::new(AtomicBool::new(false));

        let handle = tokio::spawn(async move {
            info!(trigger = %trigger.name(), "trigger watcher started");
            loop {
                let interval = trigger.poll_interval();
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        match trigger.poll().await {
                            Ok(TriggerResult::Fire(context)) => {
                                dispatch(
                                    &trigger,
                                    &binding,
                                    context,
                                    &sink,
                                    &in_flight,
                                );
                            }
                            Ok(TriggerResult::Skip) => {
                                debug!(trigger = %trigger.name(), "trigger skipped");
                            }
                            Err(e) => {
                                // Watchers never die; log and wait for the
                                // next scheduled firing.
                                error!(
                                    trigger = %trigger.name(),
                                    error = %e,
                                    "trigger poll failed"
                                );
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!(trigger = %trigger.name(), "trigger watcher stopping");
                            break;
                        }
                    }
                }
            }
        });
        self.handles.push(handle);
    }

    /// Number of running watcher tasks.
    pub fn watcher_count(&self) -> usize {
        self.handles.len()
    }

    /// Waits for every watcher to observe the shutdown signal, up to
    /// `drain` per watcher; stragglers are aborted.
    pub async fn join(mut self, drain: Duration) {
        for mut handle in self.handles.drain(..) {
            if tokio::time::timeout(drain, &mut handle).await.is_err() {
                warn!("trigger watcher exceeded drain window, aborting");
                handle.abort();
            }
        }
    }
}

fn dispatch(
    trigger: &Arc<dyn Trigger>,
    binding: &TriggerBinding,
    context: TriggerContext,
    sink: &Arc<dyn TriggerSink>,
    in_flight: &Arc<AtomicBool>,
) {
    if !trigger.allow_concurrent() && in_flight.load(Ordering::SeqCst) {
        warn!(
            trigger = %trigger.name(),
            "previous firing still running, suppressing this one"
        );
        return;
    }
    in_flight.store(true, Ordering::SeqCst);
    metrics::counter!("taskmesh_trigger_fired_total", "trigger" => trigger.name().to_string())
        .increment(1);

    let sink = sink.clone();
    let binding = binding.clone();
    let in_flight = in_flight.clone();
    let trigger_name = trigger.name().to_string();
    tokio::spawn(async move {
        debug!(trigger = %trigger_name, pipeline = %binding.pipeline_id, "trigger fired");
        sink.trigger_fired(binding, context).await;
        in_flight.store(false, Ordering::SeqCst);
    });
}
