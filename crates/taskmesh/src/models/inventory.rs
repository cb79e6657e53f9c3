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

//! # Inventory Domain Model
//!
//! Inventory items, measurement units, and consumption behavior. Units carry
//! a base-conversion factor into their category's base unit; units in the
//! same category are mutually convertible, cross-category conversion fails.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Errors raised by inventory domain operations.
#[derive(Debug, thiserror::Error)]
pub enum InventoryModelError {
    /// Conversion attempted between units of different categories
    #[error("cannot convert between unit categories '{from}' and '{to}'")]
    CategoryMismatch { from: String, to: String },

    /// A unit declared a non-positive base factor
    #[error("unit '{unit_id}' has non-positive base factor {factor}")]
    InvalidBaseFactor { unit_id: String, factor: f64 },

    /// Item invariant violation
    #[error("invalid item '{item_id}': {reason}")]
    InvalidItem { item_id: String, reason: String },
}

/// A measurement unit.
///
/// `base_factor` is the multiplicand into the category's base unit: a value
/// `v` in this unit equals `v * base_factor` base units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Unit identifier (e.g. "ikg")
    pub id: String,
    /// Display name
    pub name: String,
    /// Short symbol used in rendered text
    pub symbol: String,
    /// Conversion factor into the category base unit
    pub base_factor: f64,
    /// Category tag (e.g. "weight", "volume"); same-category units convert
    pub category: String,
}

impl Unit {
    /// Creates a unit, rejecting non-positive base factors.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        symbol: impl Into<String>,
        base_factor: f64,
        category: impl Into<String>,
    ) -> Result<Self, InventoryModelError> {
        let id = id.into();
        if base_factor <= 0.0 || !base_factor.is_finite() {
            return Err(InventoryModelError::InvalidBaseFactor {
                unit_id: id,
                factor: base_factor,
            });
        }
        Ok(Self {
            id,
            name: name.into(),
            symbol: symbol.into(),
            base_factor,
            category: category.into(),
        })
    }

    /// Converts `value` expressed in this unit into `target`.
    ///
    /// Fails when the units belong to different categories.
    pub fn convert(&self, value: f64, target: &Unit) -> Result<f64, InventoryModelError> {
        if self.category != target.category {
            return Err(InventoryModelError::CategoryMismatch {
                from: self.category.clone(),
                to: target.category.clone(),
            });
        }
        Ok(value * self.base_factor / target.base_factor)
    }
}

/// How an item's level is expected to drain over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionPattern {
    /// Constant mean rate
    Linear,
    /// Mean rate scaled by a per-month multiplier
    Seasonal,
    /// Step-shaped draws at the mean rate
    Batch,
    /// Stochastic around the mean rate
    Random,
}

/// Consumption behavior attached to an inventory item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionBehavior {
    /// Drain shape
    pub pattern: ConsumptionPattern,
    /// Mean consumption per day, in the item's unit
    pub mean_rate: f64,
    /// Rate variance (informational for linear/seasonal)
    pub variance: f64,
    /// Twelve per-month multipliers (January first)
    pub seasonal_multipliers: [f64; 12],
}

impl Default for ConsumptionBehavior {
    fn default() -> Self {
        Self {
            pattern: ConsumptionPattern::Linear,
            mean_rate: 0.0,
            variance: 0.0,
            seasonal_multipliers: [1.0; 12],
        }
    }
}

/// Active prediction model configuration for an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionModel {
    /// Model identifier (e.g. "consumption_projection")
    pub model: String,
    /// Model-specific parameters
    #[serde(default)]
    pub parameters: HashMap<String, f64>,
}

impl Default for PredictionModel {
    fn default() -> Self {
        Self {
            model: "consumption_projection".to_string(),
            parameters: HashMap::new(),
        }
    }
}

/// Result of applying a level change to an item.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelChange {
    /// Level before the change
    pub prev_level: f64,
    /// Level after the change
    pub new_level: f64,
    /// True when the new level is at or below the low-stock threshold
    pub below_threshold: bool,
    /// True when this change crossed the threshold downward
    pub crossed_down: bool,
}

/// Projected consumption for an item over a horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionForecast {
    /// Projected consumption per day over the horizon
    pub daily: Vec<f64>,
    /// Days until the current level reaches zero, if it does within the horizon
    pub days_until_empty: Option<u32>,
    /// Days until the current level reaches the low-stock threshold
    pub days_until_threshold: Option<u32>,
}

/// An inventory item tracked by the federation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Item identifier
    pub id: String,
    /// Human name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Current level, in `unit_id` units; never negative
    pub level: f64,
    /// Maximum capacity
    pub capacity: f64,
    /// Low-stock threshold; at most `capacity`
    pub low_threshold: f64,
    /// Primary unit id; must resolve against the unit registry
    pub unit_id: String,
    /// Optional alternate unit ids
    #[serde(default)]
    pub alternate_unit_ids: Vec<String>,
    /// Expected drain behavior
    #[serde(default)]
    pub behavior: ConsumptionBehavior,
    /// Advisory metadata (also used for restock-task dedup)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Active prediction model
    #[serde(default)]
    pub prediction: PredictionModel,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Creates an item with the given identity and capacity bounds.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        level: f64,
        capacity: f64,
        low_threshold: f64,
        unit_id: impl Into<String>,
    ) -> Result<Self, InventoryModelError> {
        let now = Utc::now();
        let item = Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            level,
            capacity,
            low_threshold,
            unit_id: unit_id.into(),
            alternate_unit_ids: Vec::new(),
            behavior: ConsumptionBehavior::default(),
            metadata: HashMap::new(),
            prediction: PredictionModel::default(),
            created_at: now,
            updated_at: now,
        };
        item.validate()?;
        Ok(item)
    }

    /// Checks the item invariants: non-negative level, threshold within
    /// capacity, non-empty unit reference.
    pub fn validate(&self) -> Result<(), InventoryModelError> {
        if self.level < 0.0 || !self.level.is_finite() {
            return Err(self.invalid(format!("level {} must be >= 0", self.level)));
        }
        if self.low_threshold > self.capacity {
            return Err(self.invalid(format!(
                "threshold {} exceeds capacity {}",
                self.low_threshold, self.capacity
            )));
        }
        if self.unit_id.is_empty() {
            return Err(self.invalid("unit id must not be empty".to_string()));
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> InventoryModelError {
        InventoryModelError::InvalidItem {
            item_id: self.id.clone(),
            reason,
        }
    }

    /// Applies a level change, returning the threshold bookkeeping the
    /// caller needs to publish an `inventory.level_changed` event.
    pub fn apply_level(&mut self, new_level: f64) -> Result<LevelChange, InventoryModelError> {
        if new_level < 0.0 || !new_level.is_finite() {
            return Err(self.invalid(format!("level {} must be >= 0", new_level)));
        }
        let prev_level = self.level;
        self.level = new_level;
        self.updated_at = Utc::now();

        let below_threshold = new_level <= self.low_threshold;
        let crossed_down = prev_level > self.low_threshold && below_threshold;
        Ok(LevelChange {
            prev_level,
            new_level,
            below_threshold,
            crossed_down,
        })
    }

    /// Projects consumption over `horizon_days` from the item's behavior.
    ///
    /// Linear, batch, and random patterns project at the mean rate; the
    /// seasonal pattern scales the mean by the multiplier of each projected
    /// day's month.
    pub fn predict_consumption(&self, horizon_days: u32) -> ConsumptionForecast {
        let mut daily = Vec::with_capacity(horizon_days as usize);
        let mut remaining = self.level;
        let mut days_until_empty = None;
        let mut days_until_threshold = None;
        let start = self.updated_at;

        for day in 0..horizon_days {
            let rate = match self.behavior.pattern {
                ConsumptionPattern::Seasonal => {
                    let date = start + chrono::Duration::days(day as i64);
                    let month_index = (date.month0()) as usize;
                    self.behavior.mean_rate * self.behavior.seasonal_multipliers[month_index]
                }
                _ => self.behavior.mean_rate,
            };
            daily.push(rate);
            remaining -= rate;

            if days_until_threshold.is_none() && remaining <= self.low_threshold {
                days_until_threshold = Some(day + 1);
            }
            if days_until_empty.is_none() && remaining <= 0.0 {
                days_until_empty = Some(day + 1);
                break;
            }
        }

        ConsumptionForecast {
            daily,
            days_until_empty,
            days_until_threshold,
        }
    }
}
