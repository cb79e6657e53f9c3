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

//! # Channel Adapters
//!
//! Built-in delivery channels: in-app structured log, webhook POST, and
//! SMTP mail. Each adapter maps one [`DeliveryMethod`]; the notifier fans
//! out per the user's preferences.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use super::{ChannelError, NotificationChannel, RenderedNotification};
use crate::models::user::{DeliveryMethod, User};

/// Integration-token key holding a user's webhook endpoint.
const WEBHOOK_URL_TOKEN: &str = "webhook_url";

/// In-app channel: emits the notification as a structured log record.
#[derive(Debug, Default)]
pub struct InAppLogChannel;

#[async_trait]
impl NotificationChannel for InAppLogChannel {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::InApp
    }

    async fn deliver(
        &self,
        user: &User,
        rendered: &RenderedNotification,
    ) -> Result<(), ChannelError> {
        info!(
            user_id = %user.id,
            subject = %rendered.subject,
            body = %rendered.body,
            "in-app notification"
        );
        Ok(())
    }
}

/// Webhook channel: POSTs the rendered notification as JSON to the user's
/// configured endpoint.
pub struct WebhookChannel {
    client: reqwest::Client,
}

impl WebhookChannel {
    /// Creates the channel with a bounded request timeout.
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for WebhookChannel {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Webhook
    }

    async fn deliver(
        &self,
        user: &User,
        rendered: &RenderedNotification,
    ) -> Result<(), ChannelError> {
        let url = user
            .integration_tokens
            .get(WEBHOOK_URL_TOKEN)
            .ok_or(ChannelError::NotConfigured {
                user_id: user.id.clone(),
                method: "webhook",
            })?;

        let payload = serde_json::json!({
            "user_id": user.id,
            "subject": rendered.subject,
            "body": rendered.body,
        });
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::Delivery(e.to_string()))?;

        response
            .error_for_status()
            .map_err(|e| ChannelError::Delivery(e.to_string()))?;
        Ok(())
    }
}

/// SMTP channel: mails the rendered notification to the user's address.
pub struct SmtpChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpChannel {
    /// Creates the channel over an existing transport and sender mailbox.
    pub fn new(transport: AsyncSmtpTransport<Tokio1Executor>, from: Mailbox) -> Self {
        Self { transport, from }
    }

    /// Convenience constructor for a plain relay host.
    pub fn for_relay(host: &str, from: Mailbox) -> Result<Self, ChannelError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| ChannelError::Delivery(e.to_string()))?
            .build();
        Ok(Self::new(transport, from))
    }
}

#[async_trait]
impl NotificationChannel for SmtpChannel {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Email
    }

    async fn deliver(
        &self,
        user: &User,
        rendered: &RenderedNotification,
    ) -> Result<(), ChannelError> {
        let to: Mailbox = user
            .email
            .parse()
            .map_err(|_| ChannelError::NotConfigured {
                user_id: user.id.clone(),
                method: "email",
            })?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&rendered.subject)
            .body(rendered.body.clone())
            .map_err(|e| ChannelError::Delivery(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| ChannelError::Delivery(e.to_string()))?;
        Ok(())
    }
}
