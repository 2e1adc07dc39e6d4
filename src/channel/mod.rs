//! Message channel between the host application and the session worker.
//!
//! Two inbound and four outbound message names, carried as
//! `{"channel": NAME, "payload": VALUE}` objects. The session talks to the
//! host only through a [`Recipient`], which also reports whether the host
//! side is still alive.
//!
//! # Transports
//!
//! - [`ChannelRecipient`] - tokio `mpsc` pair, used by the stdio worker and tests
//! - [`stdio`] - line-delimited JSON over stdin/stdout

pub mod stdio;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::constants;

/// Requests from the host application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload")]
pub enum InboundMessage {
    /// Start listening for the given sender id.
    #[serde(rename = "START_NOTIFICATION_SERVICE")]
    Start(String),
    /// Tear the session down and forget stored credentials.
    #[serde(rename = "DESTROY_NOTIFICATION_SERVICE")]
    Destroy,
}

/// Signals to the host application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload")]
pub enum OutboundMessage {
    /// Listening; carries the current token (empty when unknown).
    #[serde(rename = "NOTIFICATION_SERVICE_STARTED")]
    ServiceStarted(String),
    /// Start failed; carries a human-readable message.
    #[serde(rename = "NOTIFICATION_SERVICE_ERROR")]
    ServiceError(String),
    /// A notification was delivered.
    #[serde(rename = "NOTIFICATION_RECEIVED")]
    NotificationReceived(serde_json::Value),
    /// Registration produced a new token.
    #[serde(rename = "TOKEN_UPDATED")]
    TokenUpdated(String),
}

impl InboundMessage {
    /// Wire name of this message.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => constants::START_NOTIFICATION_SERVICE,
            Self::Destroy => constants::DESTROY_NOTIFICATION_SERVICE,
        }
    }
}

impl OutboundMessage {
    /// Wire name of this message.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ServiceStarted(_) => constants::NOTIFICATION_SERVICE_STARTED,
            Self::ServiceError(_) => constants::NOTIFICATION_SERVICE_ERROR,
            Self::NotificationReceived(_) => constants::NOTIFICATION_RECEIVED,
            Self::TokenUpdated(_) => constants::TOKEN_UPDATED,
        }
    }
}

/// Parse one inbound line.
pub fn decode_inbound(line: &str) -> Result<InboundMessage> {
    serde_json::from_str(line).with_context(|| format!("Invalid inbound message: {line}"))
}

/// Serialize one outbound message (no trailing newline).
pub fn encode_outbound(message: &OutboundMessage) -> Result<String> {
    serde_json::to_string(message).context("Failed to serialize outbound message")
}

/// The host-side end of the channel.
pub trait Recipient: Send + Sync {
    /// Deliver a signal. Delivery to a dead host is silently dropped.
    fn send(&self, message: OutboundMessage);

    /// `true` once the host side has been torn down.
    fn is_destroyed(&self) -> bool;
}

/// [`Recipient`] backed by an unbounded `mpsc` channel.
///
/// Reports destroyed after [`mark_destroyed`](Self::mark_destroyed) or once
/// the receiving half has been dropped.
#[derive(Debug, Clone)]
pub struct ChannelRecipient {
    tx: mpsc::UnboundedSender<OutboundMessage>,
    destroyed: Arc<AtomicBool>,
}

impl ChannelRecipient {
    /// Create a recipient and the receiver the host reads from.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let recipient = Self {
            tx,
            destroyed: Arc::new(AtomicBool::new(false)),
        };
        (recipient, rx)
    }

    /// Mark the host side as gone. Affects every clone.
    pub fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

impl Recipient for ChannelRecipient {
    fn send(&self, message: OutboundMessage) {
        let name = message.name();
        if self.tx.send(message).is_err() {
            log::debug!("[Channel] Dropped {name}: receiver closed");
        }
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst) || self.tx.is_closed()
    }
}
