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

//! # Assignment Policy Engine
//!
//! Derives the assignee and reviewer sets for a step from the task-system's
//! pools. Single-pick policies choose one user; the group policy accumulates
//! users by weight up to a total capacity.
//!
//! Candidate sampling is configurable: `Uniform` ignores weights (the
//! historical behavior), `Weighted` draws without replacement with
//! probability proportional to weight (Efraimidis–Spirakis keys). Reviewers
//! are always picked uniformly.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::models::pipeline::{AssignmentPolicy, PipelineStep};

/// Errors raised during selection.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AssignmentError {
    /// A required selection found an empty pool
    #[error("unassignable: empty {pool} pool")]
    Unassignable {
        /// Which pool was empty ("assignee" or "reviewer")
        pool: &'static str,
    },
}

/// A candidate in a selection pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolMember {
    /// Candidate user id
    pub user_id: String,
    /// Selection weight; non-positive weights count as 1
    pub weight: f64,
}

impl PoolMember {
    /// Creates a member with the default weight of 1.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            weight: 1.0,
        }
    }

    /// Creates a member with an explicit weight.
    pub fn weighted(user_id: impl Into<String>, weight: f64) -> Self {
        Self {
            user_id: user_id.into(),
            weight,
        }
    }

    fn effective_weight(&self) -> f64 {
        if self.weight > 0.0 && self.weight.is_finite() {
            self.weight
        } else {
            1.0
        }
    }
}

/// Assignee and reviewer pools for a task-system.
#[derive(Debug, Clone, Default)]
pub struct SelectionPools {
    /// Candidates for assignment
    pub assignees: Vec<PoolMember>,
    /// Candidates for review
    pub reviewers: Vec<PoolMember>,
}

/// How candidates are drawn from a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Every candidate equally likely; weights ignored
    #[default]
    Uniform,
    /// Probability proportional to weight, without replacement
    Weighted,
}

/// The selected assignees and reviewers for one work item.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Selected assignee ids
    pub assignees: HashSet<String>,
    /// Selected reviewer ids; empty when the step needs no review
    pub reviewers: HashSet<String>,
}

/// Stateless selection engine parameterized by sampling strategy.
#[derive(Debug, Clone, Default)]
pub struct AssignmentEngine {
    strategy: SamplingStrategy,
}

impl AssignmentEngine {
    /// Creates an engine with the given strategy.
    pub fn new(strategy: SamplingStrategy) -> Self {
        Self { strategy }
    }

    /// The configured strategy.
    pub fn strategy(&self) -> SamplingStrategy {
        self.strategy
    }

    /// Derives the assignee and reviewer sets for `step`.
    ///
    /// `previous_assignee` feeds the `new_assignee_or_same_as_previous`
    /// policy; it is reused only while still present in the pool.
    pub fn assign<R: Rng + ?Sized>(
        &self,
        step: &PipelineStep,
        pools: &SelectionPools,
        previous_assignee: Option<&str>,
        rng: &mut R,
    ) -> Result<Assignment, AssignmentError> {
        let assignees = match &step.assignment {
            AssignmentPolicy::NewAssignee => {
                HashSet::from([self.pick_one(&pools.assignees, rng)?])
            }
            AssignmentPolicy::NewAssigneeOrSameAsPrevious => {
                let reused = previous_assignee
                    .filter(|prev| pools.assignees.iter().any(|m| m.user_id == *prev));
                match reused {
                    Some(prev) => HashSet::from([prev.to_string()]),
                    None => HashSet::from([self.pick_one(&pools.assignees, rng)?]),
                }
            }
            AssignmentPolicy::GroupAssignees { total_capacity } => {
                self.pick_group(&pools.assignees, *total_capacity, rng)?
            }
        };

        let reviewers = if step.requires_review {
            // Reviewers are drawn uniformly regardless of strategy.
            let index = non_empty_index(&pools.reviewers, "reviewer", rng)?;
            HashSet::from([pools.reviewers[index].user_id.clone()])
        } else {
            HashSet::new()
        };

        Ok(Assignment {
            assignees,
            reviewers,
        })
    }

    /// Picks a single assignee according to the strategy.
    fn pick_one<R: Rng + ?Sized>(
        &self,
        pool: &[PoolMember],
        rng: &mut R,
    ) -> Result<String, AssignmentError> {
        match self.strategy {
            SamplingStrategy::Uniform => {
                let index = non_empty_index(pool, "assignee", rng)?;
                Ok(pool[index].user_id.clone())
            }
            SamplingStrategy::Weighted => {
                let order = weighted_order(pool, rng);
                order
                    .into_iter()
                    .next()
                    .map(|i| pool[i].user_id.clone())
                    .ok_or(AssignmentError::Unassignable { pool: "assignee" })
            }
        }
    }

    /// Accumulates unchosen users until adding the next would exceed
    /// `total_capacity` or the pool is exhausted.
    fn pick_group<R: Rng + ?Sized>(
        &self,
        pool: &[PoolMember],
        total_capacity: f64,
        rng: &mut R,
    ) -> Result<HashSet<String>, AssignmentError> {
        if pool.is_empty() {
            return Err(AssignmentError::Unassignable { pool: "assignee" });
        }
        let order = match self.strategy {
            SamplingStrategy::Uniform => uniform_order(pool.len(), rng),
            SamplingStrategy::Weighted => weighted_order(pool, rng),
        };

        let mut selected = HashSet::new();
        let mut accumulated = 0.0;
        for index in order {
            let weight = pool[index].effective_weight();
            if accumulated + weight > total_capacity {
                break;
            }
            accumulated += weight;
            selected.insert(pool[index].user_id.clone());
        }
        Ok(selected)
    }
}

fn non_empty_index<R: Rng + ?Sized>(
    pool: &[PoolMember],
    name: &'static str,
    rng: &mut R,
) -> Result<usize, AssignmentError> {
    if pool.is_empty() {
        return Err(AssignmentError::Unassignable { pool: name });
    }
    Ok(rng.gen_range(0..pool.len()))
}

/// Random permutation of indices (Fisher–Yates).
fn uniform_order<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    for i in (1..order.len()).rev() {
        let j = rng.gen_range(0..=i);
        order.swap(i, j);
    }
    order
}

/// Weighted order without replacement: each candidate draws the key
/// `u^(1/w)` and candidates are taken by descending key.
fn weighted_order<R: Rng + ?Sized>(pool: &[PoolMember], rng: &mut R) -> Vec<usize> {
    let mut keyed: Vec<(usize, f64)> = pool
        .iter()
        .enumerate()
        .map(|(i, member)| {
            let u: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
            (i, u.powf(1.0 / member.effective_weight()))
        })
        .collect();
    keyed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    keyed.into_iter().map(|(i, _)| i).collect()
}
