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

//! Notification rendering: greeting, body, and the correlation-id footer for
//! error-class messages.

use crate::models::user::User;

use super::Notification;

/// A notification rendered for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedNotification {
    /// Subject line
    pub subject: String,
    /// Rendered body
    pub body: String,
}

/// Renders `notification` for `user`.
///
/// The body greets the user by display name; error-class notifications
/// append the correlation id so support can trace the failure.
pub(crate) fn render(user: &User, notification: &Notification) -> RenderedNotification {
    let mut body = format!("Hi {},\n\n{}", user.display_name, notification.body);
    if let Some(correlation_id) = notification.correlation_id {
        body.push_str(&format!("\n\nReference: {correlation_id}"));
    }
    RenderedNotification {
        subject: notification.subject.clone(),
        body,
    }
}
