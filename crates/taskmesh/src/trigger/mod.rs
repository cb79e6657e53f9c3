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

//! # Trigger Watchers
//!
//! Triggers poll for conditions and fire pipeline work when they hold. Each
//! configured trigger runs as its own cooperative task under the
//! [`scheduler::TriggerScheduler`]; a firing invokes the configured sink with
//! the pipeline binding and the trigger's context.
//!
//! Watcher variants:
//! - [`IntervalTrigger`] fires every configured duration after startup
//! - [`WeeklyTrigger`] fires at a {weekday, seconds-since-midnight} slot in
//!   the local zone
//! - [`ThresholdTrigger`] polls a pile quantity and fires while the
//!   comparison holds
//! - [`CronTrigger`] fires on a cron expression's occurrences
//!
//! Watchers log errors and continue to the next scheduled firing; they never
//! die. Re-evaluation always advances past the fire time even when the
//! previous firing is still being handled.

mod cron;
mod interval;
pub mod scheduler;
mod threshold;
mod weekly;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

pub use cron::CronTrigger;
pub use interval::IntervalTrigger;
pub use scheduler::{ConfiguredTrigger, TriggerScheduler, TriggerSink};
pub use threshold::{CompareOp, PileSource, ThresholdTrigger};
pub use weekly::WeeklyTrigger;

/// String context attached to a firing.
pub type TriggerContext = HashMap<String, String>;

/// Errors raised while polling a trigger.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    /// The polled quantity could not be read
    #[error("trigger poll failed: {message}")]
    PollError {
        /// What went wrong
        message: String,
    },

    /// The trigger was configured with an unusable expression
    #[error("invalid trigger configuration: {message}")]
    InvalidConfiguration {
        /// What was wrong with the configuration
        message: String,
    },
}

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerResult {
    /// Fire, carrying context for the pipeline
    Fire(TriggerContext),
    /// Condition not met this poll
    Skip,
}

/// A pollable trigger.
///
/// The scheduler sleeps `poll_interval()` between polls; interval and
/// schedule variants express their cadence through it (recomputed every
/// cycle), threshold variants poll at a fixed rate and decide inside
/// `poll()`.
#[async_trait]
pub trait Trigger: Send + Sync {
    /// Unique name for logs and firing context.
    fn name(&self) -> &str;

    /// Time to wait before the next poll.
    fn poll_interval(&self) -> Duration;

    /// Whether a firing may start while a previous one is still running.
    fn allow_concurrent(&self) -> bool {
        false
    }

    /// Polls the condition.
    async fn poll(&self) -> Result<TriggerResult, TriggerError>;
}

/// Which pipeline a trigger feeds, and with what projected value.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerBinding {
    /// Pipeline to start work on (always its first step)
    pub pipeline_id: String,
    /// Task-system the pipeline belongs to
    pub task_system_id: String,
    /// Projected points for the triggered work item
    pub projected_points: u32,
}
