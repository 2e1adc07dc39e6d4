//! Push transport abstraction.
//!
//! The session manager never speaks the push protocol itself. Registration
//! and the long-lived listen connection go through [`PushTransport`]:
//!
//! ```text
//! PushTransport (trait)
//!     │
//!     ├── register(sender_id) -> Credentials
//!     │
//!     └── listen(ListenRequest, NotificationSink) -> Box<dyn Connection>
//!             │
//!             └── sink.deliver(Delivery { notification, persistent_id }) per message
//! ```
//!
//! - [`relay::RelayTransport`] - HTTP registration + WebSocket listen against a push relay

pub mod relay;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::credentials::Credentials;

/// One delivered notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    /// Notification body forwarded to the application untouched.
    pub notification: serde_json::Value,
    /// Identifier unique to this delivery.
    pub persistent_id: String,
}

/// Everything the transport needs to open a listen connection.
#[derive(Clone, Debug)]
pub struct ListenRequest {
    /// Credentials from registration (or the store).
    pub credentials: Credentials,
    /// Ids already delivered; the backend must not redeliver these.
    pub persistent_ids: Vec<String>,
}

/// Callback the transport invokes once per delivered notification.
#[derive(Clone)]
pub struct NotificationSink {
    deliver: Arc<dyn Fn(Delivery) + Send + Sync>,
}

impl std::fmt::Debug for NotificationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSink").finish_non_exhaustive()
    }
}

impl NotificationSink {
    /// Wrap a delivery callback.
    pub fn new(deliver: impl Fn(Delivery) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Hand one delivery to the session.
    pub fn deliver(&self, delivery: Delivery) {
        (self.deliver)(delivery);
    }
}

/// An open listen connection.
pub trait Connection: Send + std::fmt::Debug {
    /// Disconnect. No further deliveries are made after this returns.
    fn destroy(&mut self);
}

/// Registration + listen against a push backend.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Register a new device for `sender_id`.
    async fn register(&self, sender_id: &str) -> anyhow::Result<Credentials>;

    /// Open a listen connection. Resolves once the connection is established.
    async fn listen(
        &self,
        request: ListenRequest,
        sink: NotificationSink,
    ) -> anyhow::Result<Box<dyn Connection>>;
}
