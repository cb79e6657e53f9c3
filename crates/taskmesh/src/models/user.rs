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

//! # User & Group Model
//!
//! Users carry an ordered role, a status, and per-kind notification
//! preferences. Groups hold member roles and may subsume other groups;
//! subsumption is acyclic and effective membership extends transitively.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Errors raised by user and group operations.
#[derive(Debug, thiserror::Error)]
pub enum UserModelError {
    /// Group subsumption would form a cycle
    #[error("group subsumption cycle involving '{group_id}'")]
    SubsumptionCycle { group_id: String },
}

/// Ordered role ladder; comparison follows privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Guest,
    User,
    Admin,
}

impl Role {
    /// Returns the wire representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Normalizes a role string from a collaborator into the known set.
    ///
    /// Unknown strings fall back to `Guest`, the least-privileged role.
    pub fn normalize(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" | "administrator" => Role::Admin,
            "user" | "member" => Role::User,
            _ => Role::Guest,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
}

/// Delivery methods a notification can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    /// Structured log entry in the service's own output
    InApp,
    /// SMTP mail to the user's address
    Email,
    /// HTTP POST to the user's configured webhook
    Webhook,
}

/// Notification classes a user can configure independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// New work was assigned
    Assignment,
    /// In-flight work was replaced by newer work
    Replacement,
    /// Proposed work was rejected by a conflict policy
    Blocked,
    /// A review was requested
    ReviewRequested,
    /// A task is approaching its due time
    DueSoon,
    /// An inventory item fell to or below its threshold
    InventoryLow,
    /// An error the user should know about
    Error,
}

/// Per-kind notification preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreference {
    /// Whether notifications of this kind are delivered at all
    pub enabled: bool,
    /// Delivery methods to fan out to
    pub methods: Vec<DeliveryMethod>,
    /// For due-time kinds, how many days before the due time to notify
    #[serde(default)]
    pub days_before_due: Option<u32>,
}

impl Default for NotificationPreference {
    fn default() -> Self {
        Self {
            enabled: true,
            methods: vec![DeliveryMethod::InApp],
            days_before_due: None,
        }
    }
}

/// Privacy flags controlling what other services may see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyFlags {
    /// Hide the email address from listings
    #[serde(default)]
    pub hide_email: bool,
    /// Hide activity history from listings
    #[serde(default)]
    pub hide_activity: bool,
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User identifier
    pub id: String,
    /// Email address, unique across the federation
    pub email: String,
    /// Display name
    pub display_name: String,
    /// Privilege role
    pub role: Role,
    /// Account status
    pub status: UserStatus,
    /// Per-kind notification preferences; missing kinds use the default
    #[serde(default)]
    pub preferences: HashMap<NotificationKind, NotificationPreference>,
    /// Integration tokens by integration name (e.g. "webhook_url")
    #[serde(default)]
    pub integration_tokens: HashMap<String, String>,
    /// Privacy flags
    #[serde(default)]
    pub privacy: PrivacyFlags,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Creates an active user with the `User` role.
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            email: email.into(),
            display_name: display_name.into(),
            role: Role::User,
            status: UserStatus::Active,
            preferences: HashMap::new(),
            integration_tokens: HashMap::new(),
            privacy: PrivacyFlags::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the preference for a notification kind, falling back to the
    /// default (enabled, in-app only).
    pub fn preference(&self, kind: NotificationKind) -> NotificationPreference {
        self.preferences.get(&kind).cloned().unwrap_or_default()
    }
}

/// Role of a member inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupRole {
    Member,
    Admin,
    Owner,
}

/// A group of users, possibly subsuming other groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Group identifier
    pub id: String,
    /// Group name
    pub name: String,
    /// Direct members by user id
    #[serde(default)]
    pub members: HashMap<String, GroupRole>,
    /// Ids of subsumed groups; the subsumption graph is acyclic
    #[serde(default)]
    pub subsumed: HashSet<String>,
}

impl Group {
    /// Creates an empty group.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            members: HashMap::new(),
            subsumed: HashSet::new(),
        }
    }

    /// Effective membership: direct members plus the effective membership of
    /// every subsumed group, transitively.
    ///
    /// Unknown subsumed ids are skipped; a cycle in the provided registry is
    /// reported as an error.
    pub fn effective_members(
        &self,
        groups: &HashMap<String, Group>,
    ) -> Result<HashSet<String>, UserModelError> {
        let mut result = HashSet::new();
        let mut in_stack = HashSet::new();
        self.collect_members(groups, &mut result, &mut in_stack)?;
        Ok(result)
    }

    fn collect_members(
        &self,
        groups: &HashMap<String, Group>,
        result: &mut HashSet<String>,
        in_stack: &mut HashSet<String>,
    ) -> Result<(), UserModelError> {
        if !in_stack.insert(self.id.clone()) {
            return Err(UserModelError::SubsumptionCycle {
                group_id: self.id.clone(),
            });
        }
        result.extend(self.members.keys().cloned());
        for sub_id in &self.subsumed {
            if let Some(sub) = groups.get(sub_id) {
                sub.collect_members(groups, result, in_stack)?;
            }
        }
        in_stack.remove(&self.id);
        Ok(())
    }
}

/// Validates that the subsumption graph over `groups` is acyclic.
pub fn validate_subsumption(groups: &HashMap<String, Group>) -> Result<(), UserModelError> {
    for group in groups.values() {
        group.effective_members(groups)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_normalization_is_lenient() {
        assert_eq!(Role::normalize("ADMIN"), Role::Admin);
        assert_eq!(Role::normalize("administrator"), Role::Admin);
        assert_eq!(Role::normalize(" user "), Role::User);
        assert_eq!(Role::normalize("member"), Role::User);
        assert_eq!(Role::normalize("something-else"), Role::Guest);
    }

    #[test]
    fn roles_are_ordered_by_privilege() {
        assert!(Role::Guest < Role::User);
        assert!(Role::User < Role::Admin);
    }

    #[test]
    fn default_preference_is_in_app_enabled() {
        let user = User::new("u1", "u1@example.com", "U One");
        let pref = user.preference(NotificationKind::Assignment);
        assert!(pref.enabled);
        assert_eq!(pref.methods, vec![DeliveryMethod::InApp]);
    }

    #[test]
    fn effective_membership_is_transitive() {
        let mut top = Group::new("top", "Top");
        top.members.insert("alice".into(), GroupRole::Owner);
        top.subsumed.insert("mid".into());

        let mut mid = Group::new("mid", "Mid");
        mid.members.insert("bob".into(), GroupRole::Member);
        mid.subsumed.insert("leaf".into());

        let mut leaf = Group::new("leaf", "Leaf");
        leaf.members.insert("carol".into(), GroupRole::Member);

        let groups: HashMap<String, Group> = [top.clone(), mid, leaf]
            .into_iter()
            .map(|g| (g.id.clone(), g))
            .collect();

        let members = top.effective_members(&groups).unwrap();
        let expected: HashSet<String> = ["alice", "bob", "carol"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(members, expected);
    }

    #[test]
    fn subsumption_cycle_is_detected() {
        let mut a = Group::new("a", "A");
        a.subsumed.insert("b".into());
        let mut b = Group::new("b", "B");
        b.subsumed.insert("a".into());

        let groups: HashMap<String, Group> = [a, b].into_iter().map(|g| (g.id.clone(), g)).collect();
        assert!(validate_subsumption(&groups).is_err());
    }
}
