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

//! Weekly schedule trigger: computes the next {day-of-week,
//! seconds-since-midnight} occurrence in the local zone, sleeps until then,
//! fires, and re-computes.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Local, NaiveTime, Weekday};

use super::{Trigger, TriggerContext, TriggerError, TriggerResult};

/// Fires once per week at a fixed local-time slot.
#[derive(Debug, Clone)]
pub struct WeeklyTrigger {
    name: String,
    weekday: Weekday,
    seconds_since_midnight: u32,
}

impl WeeklyTrigger {
    /// Creates a weekly trigger for the given local-time slot.
    ///
    /// `seconds_since_midnight` above 86399 is rejected.
    pub fn new(
        name: impl Into<String>,
        weekday: Weekday,
        seconds_since_midnight: u32,
    ) -> Result<Self, TriggerError> {
        if seconds_since_midnight >= 86_400 {
            return Err(TriggerError::InvalidConfiguration {
                message: format!(
                    "seconds_since_midnight {} out of range",
                    seconds_since_midnight
                ),
            });
        }
        Ok(Self {
            name: name.into(),
            weekday,
            seconds_since_midnight,
        })
    }

    /// The next occurrence strictly after `now`.
    pub fn next_occurrence(&self, now: DateTime<Local>) -> DateTime<Local> {
        let slot = NaiveTime::from_num_seconds_from_midnight_opt(self.seconds_since_midnight, 0)
            .unwrap_or(NaiveTime::MIN);

        let days_ahead = (7 + self.weekday.num_days_from_monday() as i64
            - now.weekday().num_days_from_monday() as i64)
            % 7;
        let mut candidate_date = now.date_naive() + ChronoDuration::days(days_ahead);

        loop {
            let naive = candidate_date.and_time(slot);
            // A skipped local time (DST gap) falls through to the next week.
            if let Some(candidate) = naive.and_local_timezone(Local).earliest() {
                if candidate > now {
                    return candidate;
                }
            }
            candidate_date += ChronoDuration::days(7);
        }
    }
}

#[async_trait]
impl Trigger for WeeklyTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    /// Time until the next occurrence; the scheduler sleeps exactly this
    /// long, so the poll lands on the slot.
    fn poll_interval(&self) -> Duration {
        let now = Local::now();
        let next = self.next_occurrence(now);
        (next - now).to_std().unwrap_or(Duration::from_secs(1))
    }

    async fn poll(&self) -> Result<TriggerResult, TriggerError> {
        let mut context = TriggerContext::new();
        context.insert("trigger".to_string(), self.name.clone());
        context.insert("weekday".to_string(), self.weekday.to_string());
        context.insert(
            "seconds_since_midnight".to_string(),
            self.seconds_since_midnight.to_string(),
        );
        Ok(TriggerResult::Fire(context))
    }
}
