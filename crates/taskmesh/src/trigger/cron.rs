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

//! Cron schedule trigger: fires on each occurrence of a cron expression in
//! the local zone. Firings carry the expression so downstream
//! `schedule.triggered` events can reproduce it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use croner::Cron;
use uuid::Uuid;

use super::{Trigger, TriggerContext, TriggerError, TriggerResult};

/// Fires on a cron expression's occurrences.
#[derive(Debug, Clone)]
pub struct CronTrigger {
    id: String,
    name: String,
    expression: String,
    cron: Cron,
    action: String,
}

impl CronTrigger {
    /// Parses `expression` and creates the trigger.
    ///
    /// `action` travels in the firing context (e.g. `inventory_check`) so
    /// the orchestrator can route the resulting `schedule.triggered` event.
    pub fn new(
        name: impl Into<String>,
        expression: impl Into<String>,
        action: impl Into<String>,
    ) -> Result<Self, TriggerError> {
        let expression = expression.into();
        let cron =
            Cron::new(&expression)
                .parse()
                .map_err(|e| TriggerError::InvalidConfiguration {
                    message: format!("bad cron expression '{}': {}", expression, e),
                })?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            expression,
            cron,
            action: action.into(),
        })
    }

    /// Opaque trigger id carried in `schedule.triggered` payloads.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The configured cron expression.
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

#[async_trait]
impl Trigger for CronTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    /// Time until the next cron occurrence; the scheduler sleeps exactly
    /// this long, so the poll lands on the occurrence.
    fn poll_interval(&self) -> Duration {
        let now = Local::now();
        match self.cron.find_next_occurrence(&now, false) {
            Ok(next) => (next - now).to_std().unwrap_or(Duration::from_secs(1)),
            // Expressions with no future occurrence back off for a minute.
            Err(_) => Duration::from_secs(60),
        }
    }

    async fn poll(&self) -> Result<TriggerResult, TriggerError> {
        let mut context = TriggerContext::new();
        context.insert("trigger_id".to_string(), self.id.clone());
        context.insert("trigger".to_string(), self.name.clone());
        context.insert("cron_expression".to_string(), self.expression.clone());
        context.insert("action".to_string(), self.action.clone());
        Ok(TriggerResult::Fire(context))
    }
}
