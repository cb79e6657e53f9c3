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

//! Threshold trigger: polls a named pile quantity (an inventory level in the
//! common case) at a fixed interval and fires on each tick where the
//! comparison against the threshold holds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{Trigger, TriggerContext, TriggerError, TriggerResult};

/// Comparison operator for threshold checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Fire while current > threshold
    Greater,
    /// Fire while current < threshold
    Less,
    /// Fire while current == threshold
    Equal,
}

impl CompareOp {
    /// Applies the comparison.
    pub fn holds(&self, current: f64, threshold: f64) -> bool {
        match self {
            CompareOp::Greater => current > threshold,
            CompareOp::Less => current < threshold,
            CompareOp::Equal => current == threshold,
        }
    }

    /// Symbolic form used in firing context.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Greater => ">",
            CompareOp::Less => "<",
            CompareOp::Equal => "=",
        }
    }
}

/// A readable aggregated quantity watched by threshold triggers.
#[async_trait]
pub trait PileSource: Send + Sync {
    /// Name of the pile, used in logs and firing context.
    fn pile_name(&self) -> &str;

    /// Reads the current value.
    async fn current_value(&self) -> Result<f64, TriggerError>;
}

/// Fires whenever `compare(current, threshold, op)` holds at poll time.
pub struct ThresholdTrigger {
    name: String,
    source: Arc<dyn PileSource>,
    threshold: f64,
    op: CompareOp,
    poll_interval: Duration,
}

impl ThresholdTrigger {
    /// Default poll cadence for threshold checks.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(120);

    /// Creates a threshold trigger with the default poll cadence.
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn PileSource>,
        threshold: f64,
        op: CompareOp,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            threshold,
            op,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the poll cadence.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl Trigger for ThresholdTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn poll(&self) -> Result<TriggerResult, TriggerError> {
        let current = self.source.current_value().await?;
        if !self.op.holds(current, self.threshold) {
            debug!(
                trigger = %self.name,
                pile = %self.source.pile_name(),
                current,
                threshold = self.threshold,
                "threshold condition not met"
            );
            return Ok(TriggerResult::Skip);
        }

        let mut context = TriggerContext::new();
        context.insert("trigger".to_string(), self.name.clone());
        context.insert("pile".to_string(), self.source.pile_name().to_string());
        context.insert("current".to_string(), current.to_string());
        context.insert("threshold".to_string(), self.threshold.to_string());
        context.insert("op".to_string(), self.op.as_str().to_string());
        Ok(TriggerResult::Fire(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct StaticPile {
        value: AtomicU64,
    }

    #[async_trait]
    impl PileSource for StaticPile {
        fn pile_name(&self) -> &str {
            "coffee-level"
        }

        async fn current_value(&self) -> Result<f64, TriggerError> {
            Ok(self.value.load(Ordering::SeqCst) as f64)
        }
    }

    #[test]
    fn compare_ops() {
        assert!(CompareOp::Greater.holds(5.0, 3.0));
        assert!(!CompareOp::Greater.holds(3.0, 3.0));
        assert!(CompareOp::Less.holds(2.0, 3.0));
        assert!(CompareOp::Equal.holds(3.0, 3.0));
        assert!(!CompareOp::Equal.holds(3.1, 3.0));
    }

    #[tokio::test]
    async fn fires_while_condition_holds() {
        let pile = Arc::new(StaticPile {
            value: AtomicU64::new(10),
        });
        let trigger = ThresholdTrigger::new("low-coffee", pile.clone(), 20.0, CompareOp::Less)
            .with_poll_interval(Duration::from_millis(10));

        match trigger.poll().await.unwrap() {
            TriggerResult::Fire(ctx) => {
                assert_eq!(ctx.get("pile").unwrap(), "coffee-level");
                assert_eq!(ctx.get("op").unwrap(), "<");
                assert_eq!(ctx.get("current").unwrap(), "10");
            }
            TriggerResult::Skip => panic!("10 < 20 should fire"),
        }

        // Refill; the next tick skips.
        pile.value.store(50, Ordering::SeqCst);
        assert_eq!(trigger.poll().await.unwrap(), TriggerResult::Skip);
    }

    #[tokio::test]
    async fn default_poll_interval_is_two_minutes() {
        let pile = Arc::new(StaticPile {
            value: AtomicU64::new(0),
        });
        let trigger = ThresholdTrigger::new("t", pile, 1.0, CompareOp::Less);
        assert_eq!(trigger.poll_interval(), Duration::from_secs(120));
    }
}
