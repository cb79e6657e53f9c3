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

//! Interval trigger: fires every configured duration after startup, on the
//! runtime's monotonic clock.

use std::time::Duration;

use async_trait::async_trait;

use super::{Trigger, TriggerContext, TriggerError, TriggerResult};

/// Fires unconditionally at a fixed cadence.
#[derive(Debug, Clone)]
pub struct IntervalTrigger {
    name: String,
    interval: Duration,
}

impl IntervalTrigger {
    /// Creates an interval trigger firing every `interval`.
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
        }
    }
}

#[async_trait]
impl Trigger for IntervalTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll_interval(&self) -> Duration {
        self.interval
    }

    async fn poll(&self) -> Result<TriggerResult, TriggerError> {
        let mut context = TriggerContext::new();
        context.insert("trigger".to_string(), self.name.clone());
        context.insert(
            "interval_secs".to_string(),
            self.interval.as_secs().to_string(),
        );
        Ok(TriggerResult::Fire(context))
    }
}
