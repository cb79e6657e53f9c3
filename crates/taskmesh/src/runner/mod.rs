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

//! # Runner & Lifecycle
//!
//! Startup wiring for one process of the federation: construct the
//! repositories, the event bus, the relay, and the collaborator clients;
//! install the authenticator with its per-method allowlist; register the
//! orchestrator's bus handlers; start the configured trigger watchers.
//!
//! Everything is constructed explicitly and injected; there are no
//! process-wide singletons. One bus instance serves the process and is
//! passed to each component.
//!
//! Shutdown is ordered: stop accepting stimuli, cancel the watchers, drain
//! the bus within the configured window, stop the relay, drop the clients
//! and repositories.

mod config;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::auth::{Authenticator, TokenValidator};
use crate::bus::{EventBus, EventBusConfig, EventHandler, KindSelector};
use crate::models::event::EventKind;
use crate::models::pipeline::Pipeline;
use crate::notifier::{NotificationChannel, Notifier};
use crate::orchestrator::clients::{InventoryClient, TaskClient};
use crate::orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorHandler};
use crate::pipeline::{AssignmentEngine, SelectionPools, WorkflowEngine};
use crate::relay::EventRelay;
use crate::repository::memory::{
    MemoryInventoryRepository, MemoryTaskRepository, MemoryUserRepository,
};
use crate::repository::{InventoryRepository, TaskRepository, UserRepository};
use crate::retry::RetryPolicy;
use crate::trigger::{ConfiguredTrigger, TriggerScheduler};

pub use config::{MeshRunnerConfig, MeshRunnerConfigBuilder};

/// Errors raised while assembling the runner.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A required dependency was not supplied to the builder
    #[error("missing dependency: {0}")]
    MissingDependency(&'static str),
}

/// Builder collecting the runner's dependencies before startup.
pub struct MeshRunnerBuilder {
    config: MeshRunnerConfig,
    inventory_client: Option<Arc<dyn InventoryClient>>,
    task_client: Option<Arc<dyn TaskClient>>,
    token_validator: Option<Arc<dyn TokenValidator>>,
    allowlist: HashSet<String>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    pipelines: Vec<Pipeline>,
    pools: Vec<(String, SelectionPools)>,
    triggers: Vec<ConfiguredTrigger>,
}

impl MeshRunnerBuilder {
    /// Starts a builder with the given configuration.
    pub fn new(config: MeshRunnerConfig) -> Self {
        Self {
            config,
            inventory_client: None,
            task_client: None,
            token_validator: None,
            allowlist: HashSet::new(),
            channels: Vec::new(),
            pipelines: Vec::new(),
            pools: Vec::new(),
            triggers: Vec::new(),
        }
    }

    /// Supplies the inventory service client.
    pub fn inventory_client(mut self, client: Arc<dyn InventoryClient>) -> Self {
        self.inventory_client = Some(client);
        self
    }

    /// Supplies the task service client.
    pub fn task_client(mut self, client: Arc<dyn TaskClient>) -> Self {
        self.task_client = Some(client);
        self
    }

    /// Supplies the token validator backing the authenticator.
    pub fn token_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.token_validator = Some(validator);
        self
    }

    /// Adds a fully-qualified method name to the auth allowlist.
    pub fn allow_method(mut self, method: impl Into<String>) -> Self {
        self.allowlist.insert(method.into());
        self
    }

    /// Adds a notification channel adapter.
    pub fn channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Registers a pipeline with the workflow engine.
    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    /// Sets the selection pools for a task system.
    pub fn pools(mut self, task_system_id: impl Into<String>, pools: SelectionPools) -> Self {
        self.pools.push((task_system_id.into(), pools));
        self
    }

    /// Adds a trigger watcher to start.
    pub fn trigger(mut self, trigger: ConfiguredTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Wires everything together and starts the cooperative tasks.
    pub fn start(self) -> Result<MeshRunner, RunnerError> {
        let inventory_client = self
            .inventory_client
            .ok_or(RunnerError::MissingDependency("inventory client"))?;
        let task_client = self
            .task_client
            .ok_or(RunnerError::MissingDependency("task client"))?;
        let token_validator = self
            .token_validator
            .ok_or(RunnerError::MissingDependency("token validator"))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Repositories.
        let task_repo: Arc<dyn TaskRepository> = Arc::new(MemoryTaskRepository::new());
        let user_repo: Arc<dyn UserRepository> = Arc::new(MemoryUserRepository::new());
        let inventory_repo: Arc<dyn InventoryRepository> =
            Arc::new(MemoryInventoryRepository::new());

        // One bus per process, explicitly injected below.
        let bus = Arc::new(EventBus::new(EventBusConfig {
            queue_capacity: self.config.bus_queue_capacity(),
        }));
        let relay = Arc::new(EventRelay::new(self.config.event_ttl()));

        let notifier = Arc::new(Notifier::new(user_repo.clone(), self.channels));

        let engine = Arc::new(WorkflowEngine::new(
            self.config.source(),
            AssignmentEngine::new(self.config.sampling_strategy()),
            bus.clone(),
            notifier.clone(),
        ));
        for pipeline in self.pipelines {
            engine.register_pipeline(pipeline);
        }
        for (task_system_id, pools) in self.pools {
            engine.set_pools(task_system_id, pools);
        }

        let orchestrator = Arc::new(Orchestrator::new(
            inventory_client,
            task_client,
            bus.clone(),
            OrchestratorConfig {
                source: self.config.source().to_string(),
                restock_assignee: self.config.restock_assignee().to_string(),
                retry: RetryPolicy::with_max_attempts(self.config.max_retries()),
            },
        ));

        // The orchestrator reacts to exactly these kinds.
        let handler: Arc<dyn EventHandler> =
            Arc::new(OrchestratorHandler::new(orchestrator.clone()));
        bus.subscribe(
            KindSelector::Kind(EventKind::InventoryLevelChanged),
            handler.clone(),
        );
        bus.subscribe(KindSelector::Kind(EventKind::ScheduleTriggered), handler);

        let probe = orchestrator
            .spawn_recovery_probe(self.config.recovery_probe_interval(), shutdown_rx.clone());

        let mut scheduler = TriggerScheduler::new(engine.clone(), shutdown_rx);
        for configured in self.triggers {
            scheduler.spawn(configured);
        }

        let authenticator = Arc::new(Authenticator::new(token_validator, self.allowlist));

        info!(
            source = self.config.source(),
            watchers = scheduler.watcher_count(),
            "mesh runner started"
        );

        Ok(MeshRunner {
            config: self.config,
            bus,
            relay,
            engine,
            orchestrator,
            authenticator,
            notifier,
            task_repo,
            user_repo,
            inventory_repo,
            scheduler: Some(scheduler),
            probe: Some(probe),
            shutdown_tx,
        })
    }
}

/// A running process of the federation core.
pub struct MeshRunner {
    config: MeshRunnerConfig,
    bus: Arc<EventBus>,
    relay: Arc<EventRelay>,
    engine: Arc<WorkflowEngine>,
    orchestrator: Arc<Orchestrator>,
    authenticator: Arc<Authenticator>,
    notifier: Arc<Notifier>,
    task_repo: Arc<dyn TaskRepository>,
    user_repo: Arc<dyn UserRepository>,
    inventory_repo: Arc<dyn InventoryRepository>,
    scheduler: Option<TriggerScheduler>,
    probe: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl MeshRunner {
    /// Begins building a runner.
    pub fn builder(config: MeshRunnerConfig) -> MeshRunnerBuilder {
        MeshRunnerBuilder::new(config)
    }

    /// The process-wide event bus.
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// The event relay.
    pub fn relay(&self) -> Arc<EventRelay> {
        self.relay.clone()
    }

    /// The workflow engine.
    pub fn engine(&self) -> Arc<WorkflowEngine> {
        self.engine.clone()
    }

    /// The orchestrator.
    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.orchestrator.clone()
    }

    /// The boundary authenticator.
    pub fn authenticator(&self) -> Arc<Authenticator> {
        self.authenticator.clone()
    }

    /// The notifier.
    pub fn notifier(&self) -> Arc<Notifier> {
        self.notifier.clone()
    }

    /// The task repository.
    pub fn task_repository(&self) -> Arc<dyn TaskRepository> {
        self.task_repo.clone()
    }

    /// The user repository.
    pub fn user_repository(&self) -> Arc<dyn UserRepository> {
        self.user_repo.clone()
    }

    /// The inventory repository.
    pub fn inventory_repository(&self) -> Arc<dyn InventoryRepository> {
        self.inventory_repo.clone()
    }

    /// Ordered shutdown: cancel watchers, drain the bus within the
    /// configured window, stop the relay, release everything else.
    pub async fn shutdown(mut self) {
        info!("mesh runner shutting down");
        let _ = self.shutdown_tx.send(true);

        if let Some(scheduler) = self.scheduler.take() {
            scheduler.join(self.config.shutdown_drain()).await;
        }
        self.bus.shutdown(self.config.shutdown_drain()).await;
        self.relay.shutdown().await;
        if let Some(probe) = self.probe.take() {
            let _ = tokio::time::timeout(self.config.shutdown_drain(), probe).await;
        }
        info!("mesh runner stopped");
    }
}
