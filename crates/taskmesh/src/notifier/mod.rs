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

//! # Notifier
//!
//! Single entry point for user notifications: resolve the user, filter by
//! the user's per-kind preferences, render the template, and fan out to the
//! enabled channel adapters. A channel failure is logged and never aborts
//! the other channels.
//!
//! Channels are pluggable; the built-in adapters cover in-app structured
//! logs, webhooks, and SMTP mail.

pub mod channels;
mod templates;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::models::user::{DeliveryMethod, NotificationKind, User};
use crate::repository::{RepositoryError, UserRepository};

pub use templates::RenderedNotification;

/// A notification to deliver to one user.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Notification class, matched against the user's preferences
    pub kind: NotificationKind,
    /// Short subject line
    pub subject: String,
    /// Human-oriented body text
    pub body: String,
    /// Correlation id for error-class notifications so support can trace
    /// the failure
    pub correlation_id: Option<Uuid>,
}

impl Notification {
    /// Creates a notification without a correlation id.
    pub fn new(
        kind: NotificationKind,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            subject: subject.into(),
            body: body.into(),
            correlation_id: None,
        }
    }

    /// Attaches a correlation id (error-class notifications).
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// Errors raised by a channel adapter.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The user has no usable address/endpoint for this channel
    #[error("user '{user_id}' has no {method} endpoint configured")]
    NotConfigured {
        /// The affected user
        user_id: String,
        /// The channel method
        method: &'static str,
    },

    /// Delivery failed
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// A pluggable delivery channel.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Which delivery method this channel implements.
    fn method(&self) -> DeliveryMethod;

    /// Delivers one rendered notification to the user.
    async fn deliver(
        &self,
        user: &User,
        rendered: &RenderedNotification,
    ) -> Result<(), ChannelError>;
}

/// Errors surfaced by the notifier entry point.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The target user does not exist
    #[error("cannot notify unknown user '{user_id}'")]
    UserNotFound {
        /// The missing user
        user_id: String,
    },

    /// The user repository failed
    #[error(transparent)]
    Repository(RepositoryError),
}

/// Fire-and-forget notification seam used by the policy engines.
///
/// Implementations log failures instead of surfacing them, matching the
/// handler error policy of the event bus.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Dispatches a notification, swallowing (but logging) failures.
    async fn dispatch(&self, user_id: &str, notification: Notification);
}

/// The notifier: preference-aware fan-out over the channel adapters.
pub struct Notifier {
    users: Arc<dyn UserRepository>,
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl Notifier {
    /// Creates a notifier over the user repository and channel set.
    pub fn new(users: Arc<dyn UserRepository>, channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { users, channels }
    }

    /// Resolves the user, renders the notification, and forwards it to each
    /// channel the user enabled for the kind. Channel errors are logged and
    /// do not abort the remaining channels.
    pub async fn notify(&self, user_id: &str, notification: Notification) -> Result<(), NotifyError> {
        let user = self.users.get_by_id(user_id).await.map_err(|e| match e {
            RepositoryError::NotFound { .. } => NotifyError::UserNotFound {
                user_id: user_id.to_string(),
            },
            other => NotifyError::Repository(other),
        })?;

        let preference = user.preference(notification.kind);
        if !preference.enabled {
            debug!(user_id, kind = ?notification.kind, "notifications disabled for kind");
            return Ok(());
        }

        let rendered = templates::render(&user, &notification);
        for method in &preference.methods {
            let Some(channel) = self.channels.iter().find(|c| c.method() == *method) else {
                debug!(user_id, method = ?method, "no channel adapter for method");
                continue;
            };
            if let Err(e) = channel.deliver(&user, &rendered).await {
                error!(
                    user_id,
                    method = ?method,
                    kind = ?notification.kind,
                    error = %e,
                    "notification channel failed"
                );
                metrics::counter!("taskmesh_notify_failures_total").increment(1);
            } else {
                metrics::counter!("taskmesh_notify_delivered_total").increment(1);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for Notifier {
    async fn dispatch(&self, user_id: &str, notification: Notification) {
        if let Err(e) = self.notify(user_id, notification).await {
            warn!(user_id, error = %e, "notification dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    use crate::models::user::{NotificationPreference, Role, UserStatus};
    use crate::repository::memory::MemoryUserRepository;

    struct RecordingChannel {
        method: DeliveryMethod,
        delivered: Mutex<Vec<(String, RenderedNotification)>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn method(&self) -> DeliveryMethod {
            self.method
        }

        async fn deliver(
            &self,
            user: &User,
            rendered: &RenderedNotification,
        ) -> Result<(), ChannelError> {
            if self.fail {
                return Err(ChannelError::Delivery("boom".into()));
            }
            self.delivered
                .lock()
                .push((user.id.clone(), rendered.clone()));
            Ok(())
        }
    }

    fn channel(method: DeliveryMethod, fail: bool) -> Arc<RecordingChannel> {
        Arc::new(RecordingChannel {
            method,
            delivered: Mutex::new(Vec::new()),
            fail,
        })
    }

    async fn user_with_methods(
        repo: &MemoryUserRepository,
        methods: Vec<DeliveryMethod>,
    ) -> User {
        let mut user = User::new("u-1", "u1@example.com", "U One");
        user.role = Role::User;
        user.status = UserStatus::Active;
        user.preferences.insert(
            NotificationKind::Assignment,
            NotificationPreference {
                enabled: true,
                methods,
                days_before_due: None,
            },
        );
        use crate::repository::UserRepository as _;
        repo.create(user.clone()).await.unwrap();
        user
    }

    #[tokio::test]
    async fn delivers_to_each_enabled_method() {
        let repo = Arc::new(MemoryUserRepository::new());
        user_with_methods(&repo, vec![DeliveryMethod::InApp, DeliveryMethod::Webhook]).await;

        let in_app = channel(DeliveryMethod::InApp, false);
        let webhook = channel(DeliveryMethod::Webhook, false);
        let notifier = Notifier::new(repo, vec![in_app.clone(), webhook.clone()]);

        notifier
            .notify(
                "u-1",
                Notification::new(NotificationKind::Assignment, "assigned", "you have work"),
            )
            .await
            .unwrap();

        assert_eq!(in_app.delivered.lock().len(), 1);
        assert_eq!(webhook.delivered.lock().len(), 1);
    }

    #[tokio::test]
    async fn channel_failure_does_not_abort_others() {
        let repo = Arc::new(MemoryUserRepository::new());
        user_with_methods(&repo, vec![DeliveryMethod::Email, DeliveryMethod::InApp]).await;

        let email = channel(DeliveryMethod::Email, true);
        let in_app = channel(DeliveryMethod::InApp, false);
        let notifier = Notifier::new(repo, vec![email, in_app.clone()]);

        notifier
            .notify(
                "u-1",
                Notification::new(NotificationKind::Assignment, "assigned", "you have work"),
            )
            .await
            .unwrap();

        assert_eq!(in_app.delivered.lock().len(), 1, "in-app still delivered");
    }

    #[tokio::test]
    async fn disabled_kind_is_silently_skipped() {
        let repo = Arc::new(MemoryUserRepository::new());
        let mut user = User::new("u-1", "u1@example.com", "U One");
        user.preferences.insert(
            NotificationKind::Assignment,
            NotificationPreference {
                enabled: false,
                methods: vec![DeliveryMethod::InApp],
                days_before_due: None,
            },
        );
        use crate::repository::UserRepository as _;
        repo.create(user).await.unwrap();

        let in_app = channel(DeliveryMethod::InApp, false);
        let notifier = Notifier::new(repo, vec![in_app.clone()]);

        notifier
            .notify(
                "u-1",
                Notification::new(NotificationKind::Assignment, "assigned", "you have work"),
            )
            .await
            .unwrap();
        assert!(in_app.delivered.lock().is_empty());
    }

    #[tokio::test]
    async fn unknown_user_is_an_error() {
        let repo = Arc::new(MemoryUserRepository::new());
        let notifier = Notifier::new(repo, vec![]);
        let result = notifier
            .notify(
                "ghost",
                Notification::new(NotificationKind::Assignment, "s", "b"),
            )
            .await;
        assert!(matches!(result, Err(NotifyError::UserNotFound { .. })));
    }

    #[tokio::test]
    async fn error_notifications_carry_the_correlation_id() {
        let repo = Arc::new(MemoryUserRepository::new());
        let mut user = User::new("u-1", "u1@example.com", "U One");
        user.preferences.insert(
            NotificationKind::Error,
            NotificationPreference {
                enabled: true,
                methods: vec![DeliveryMethod::InApp],
                days_before_due: None,
            },
        );
        use crate::repository::UserRepository as _;
        repo.create(user).await.unwrap();

        let in_app = channel(DeliveryMethod::InApp, false);
        let notifier = Notifier::new(repo, vec![in_app.clone()]);

        let correlation_id = Uuid::new_v4();
        notifier
            .notify(
                "u-1",
                Notification::new(NotificationKind::Error, "failed", "something broke")
                    .with_correlation_id(correlation_id),
            )
            .await
            .unwrap();

        let delivered = in_app.delivered.lock();
        assert!(delivered[0].1.body.contains(&correlation_id.to_string()));
    }
}
