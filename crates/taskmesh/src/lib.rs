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

//! # Taskmesh
//!
//! Core library for a small federation of cooperating services: an
//! inventory service, a task service, a user service, and the event fabric
//! and workflow orchestration that bind them together.
//!
//! ## Subsystems
//!
//! - [`models`]: the shared domain types (event envelope and taxonomy,
//!   inventory items and units, tasks, users and groups, pipelines)
//! - [`bus`]: the in-process publish/subscribe fabric with per-handler
//!   back-pressure
//! - [`relay`]: the out-of-process event relay (remote publish, filtered
//!   streaming subscriptions, TTL-bounded storage)
//! - [`auth`]: bearer-token validation and claim propagation at the
//!   service boundary
//! - [`repository`]: abstract persistence contracts plus the in-memory
//!   backend
//! - [`trigger`]: interval, weekly, threshold, and cron watchers feeding
//!   the workflow engine
//! - [`pipeline`]: pipeline activities, assignment policies, and the
//!   conflict resolution engine (precedence
//!   `surpass -> block -> aggregate -> stack -> replace`)
//! - [`orchestrator`]: cross-service reactions between tasks and inventory
//! - [`notifier`]: preference-aware, multi-channel user notifications
//! - [`runner`]: startup wiring and ordered shutdown
//!
//! ## Construction
//!
//! Components are constructed explicitly at startup and injected where they
//! are needed; one [`bus::EventBus`] instance serves a process. The
//! [`runner::MeshRunner`] builder is the front door:
//!
//! ```rust,ignore
//! let runner = MeshRunner::builder(MeshRunnerConfig::default())
//!     .inventory_client(inventory)
//!     .task_client(tasks)
//!     .token_validator(users)
//!     .channel(Arc::new(InAppLogChannel))
//!     .start()?;
//! ```

pub mod auth;
pub mod bus;
pub mod config;
pub mod error;
pub mod models;
pub mod notifier;
pub mod orchestrator;
pub mod pipeline;
pub mod relay;
pub mod repository;
pub mod retry;
pub mod runner;
pub mod trigger;

pub use config::MeshConfig;
pub use error::{ConflictReason, ServiceError};
pub use models::event::{Event, EventKind, EventPayload};
pub use runner::{MeshRunner, MeshRunnerConfig};
