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

//! Configuration for the mesh runner.

use std::time::Duration;

use crate::pipeline::SamplingStrategy;

/// Configuration parameters controlling the runner's behavior.
///
/// Use [`MeshRunnerConfig::builder()`] to construct one, or take the
/// defaults.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct MeshRunnerConfig {
    source: String,
    bus_queue_capacity: usize,
    shutdown_drain: Duration,
    event_ttl: Duration,
    recovery_probe_interval: Duration,
    restock_assignee: String,
    max_retries: u32,
    sampling_strategy: SamplingStrategy,
}

impl Default for MeshRunnerConfig {
    fn default() -> Self {
        Self {
            source: "taskmesh".to_string(),
            bus_queue_capacity: 256,
            shutdown_drain: Duration::from_secs(10),
            event_ttl: Duration::from_secs(86_400),
            recovery_probe_interval: Duration::from_secs(30),
            restock_assignee: "restock-bot".to_string(),
            max_retries: 3,
            sampling_strategy: SamplingStrategy::Uniform,
        }
    }
}

impl MeshRunnerConfig {
    /// Creates a configuration builder with default values.
    pub fn builder() -> MeshRunnerConfigBuilder {
        MeshRunnerConfigBuilder::default()
    }

    /// Source-service name stamped on published events.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Queue capacity per bus handler.
    pub fn bus_queue_capacity(&self) -> usize {
        self.bus_queue_capacity
    }

    /// Bounded drain window applied at shutdown.
    pub fn shutdown_drain(&self) -> Duration {
        self.shutdown_drain
    }

    /// TTL for relay-stored events.
    pub fn event_ttl(&self) -> Duration {
        self.event_ttl
    }

    /// Cadence of the degraded-mode recovery probe.
    pub fn recovery_probe_interval(&self) -> Duration {
        self.recovery_probe_interval
    }

    /// User who receives generated restocking tasks.
    pub fn restock_assignee(&self) -> &str {
        &self.restock_assignee
    }

    /// Retry attempt budget for collaborator calls.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// How assignment candidates are sampled.
    pub fn sampling_strategy(&self) -> SamplingStrategy {
        self.sampling_strategy
    }
}

/// Builder for [`MeshRunnerConfig`].
#[derive(Debug, Default)]
pub struct MeshRunnerConfigBuilder {
    config: MeshRunnerConfig,
}

impl MeshRunnerConfigBuilder {
    /// Sets the source-service name.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.config.source = source.into();
        self
    }

    /// Sets the per-handler bus queue capacity.
    pub fn bus_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.bus_queue_capacity = capacity;
        self
    }

    /// Sets the shutdown drain window.
    pub fn shutdown_drain(mut self, drain: Duration) -> Self {
        self.config.shutdown_drain = drain;
        self
    }

    /// Sets the relay event TTL.
    pub fn event_ttl(mut self, ttl: Duration) -> Self {
        self.config.event_ttl = ttl;
        self
    }

    /// Sets the recovery probe cadence.
    pub fn recovery_probe_interval(mut self, interval: Duration) -> Self {
        self.config.recovery_probe_interval = interval;
        self
    }

    /// Sets the restock assignee.
    pub fn restock_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.config.restock_assignee = assignee.into();
        self
    }

    /// Sets the collaborator retry budget.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Sets the assignment sampling strategy.
    pub fn sampling_strategy(mut self, strategy: SamplingStrategy) -> Self {
        self.config.sampling_strategy = strategy;
        self
    }

    /// Finalizes the configuration.
    pub fn build(self) -> MeshRunnerConfig {
        self.config
    }
}
