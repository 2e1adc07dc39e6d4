//! Push session lifecycle.
//!
//! [`SessionManager`] owns the single listen session: it registers when
//! needed, opens the listen connection, records delivered persistent ids,
//! and forwards notifications to the host through a [`Recipient`].
//!
//! # Concurrency
//!
//! The manager is a single-writer actor. Start requests, stop requests and
//! transport deliveries all arrive on one unbounded `mpsc` queue and are
//! handled strictly one at a time by [`SessionManager::run`]:
//!
//! ```text
//! host ──SessionHandle──┐
//!                       ├──> mpsc<SessionEvent> ──> SessionManager (store, connection, state)
//! transport ──sink──────┘
//! ```
//!
//! Deliveries that arrive while a start is awaiting the transport wait in
//! the queue. A stop that arrives mid-start is applied once the start has
//! finished. Deliveries tagged with an older session generation (from a
//! connection that has since been torn down) are discarded.
//!
//! # State machine
//!
//! ```text
//! NotStarted --start ok-->   Started    (TOKEN_UPDATED?, NOTIFICATION_SERVICE_STARTED)
//! NotStarted --start err-->  NotStarted (NOTIFICATION_SERVICE_ERROR)
//! Started    --start-->      Started    (NOTIFICATION_SERVICE_STARTED, no transport calls)
//! Started    --stop-->       NotStarted (disconnect + clear store)
//! Started    --delivery-->   Started    (append id, NOTIFICATION_RECEIVED if host alive)
//! ```

pub mod error;
pub mod persistence;

use std::sync::Arc;

use tokio::sync::mpsc;

pub use error::{ErrorKind, SessionError};
pub use persistence::SessionStore;

use crate::channel::{InboundMessage, OutboundMessage, Recipient};
use crate::credentials::{redact, Credentials};
use crate::store::KeyValueStore;
use crate::transport::{Connection, Delivery, ListenRequest, NotificationSink, PushTransport};

/// Work items for the session actor.
#[derive(Debug)]
enum SessionEvent {
    Start(String),
    Stop,
    Delivered { generation: u64, delivery: Delivery },
    Shutdown,
}

#[derive(Debug)]
enum SessionState {
    NotStarted,
    Started { connection: Box<dyn Connection> },
}

/// Cloneable handle for feeding requests to a running [`SessionManager`].
///
/// Each method returns `false` once the manager has exited.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    /// Queue a start request.
    pub fn start(&self, sender_id: impl Into<String>) -> bool {
        self.tx.send(SessionEvent::Start(sender_id.into())).is_ok()
    }

    /// Queue a stop request.
    pub fn stop(&self) -> bool {
        self.tx.send(SessionEvent::Stop).is_ok()
    }

    /// Ask the manager to disconnect (keeping stored credentials) and exit.
    pub fn shutdown(&self) -> bool {
        self.tx.send(SessionEvent::Shutdown).is_ok()
    }

    /// Route an inbound channel message.
    pub fn dispatch(&self, message: InboundMessage) -> bool {
        match message {
            InboundMessage::Start(sender_id) => self.start(sender_id),
            InboundMessage::Destroy => self.stop(),
        }
    }
}

/// Owner of the push session.
pub struct SessionManager {
    store: SessionStore,
    transport: Arc<dyn PushTransport>,
    recipient: Arc<dyn Recipient>,
    state: SessionState,
    /// Bumped for every listen attempt and every teardown.
    generation: u64,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager in the `NotStarted` state.
    pub fn new(
        store: Box<dyn KeyValueStore>,
        transport: Arc<dyn PushTransport>,
        recipient: Arc<dyn Recipient>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            store: SessionStore::new(store),
            transport,
            recipient,
            state: SessionState::NotStarted,
            generation: 0,
            events_tx,
            events_rx,
        }
    }

    /// Handle for queueing requests once [`run`](Self::run) is spawned.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.events_tx.clone(),
        }
    }

    /// Whether a listen session is active.
    pub fn is_started(&self) -> bool {
        matches!(self.state, SessionState::Started { .. })
    }

    /// Process queued events until a shutdown request arrives.
    pub async fn run(mut self) {
        log::info!("[Session] Worker running");

        while let Some(event) = self.events_rx.recv().await {
            match event {
                SessionEvent::Start(sender_id) => self.start(&sender_id).await,
                SessionEvent::Stop => self.stop(),
                SessionEvent::Delivered {
                    generation,
                    delivery,
                } => {
                    if self.is_current(generation) {
                        self.on_notification(delivery);
                    } else {
                        log::debug!(
                            "[Session] Discarding delivery {} from closed connection",
                            delivery.persistent_id
                        );
                    }
                }
                SessionEvent::Shutdown => break,
            }
        }

        self.shutdown();
        log::info!("[Session] Worker stopped");
    }

    fn is_current(&self, generation: u64) -> bool {
        self.is_started() && generation == self.generation
    }

    /// Start the session for `sender_id`, or re-announce the running one.
    pub async fn start(&mut self, sender_id: &str) {
        if self.is_started() {
            let token = self
                .store
                .credentials()
                .map(|c| c.fcm.token)
                .unwrap_or_default();
            log::debug!("[Session] Already started, re-announcing token");
            self.recipient.send(OutboundMessage::ServiceStarted(token));
            return;
        }

        match self.establish(sender_id).await {
            Ok((connection, token)) => {
                log::info!("[Session] Listening, token {}...", redact(&token));
                self.state = SessionState::Started { connection };
                self.recipient.send(OutboundMessage::ServiceStarted(token));
            }
            Err(e) => {
                log::error!("[Session] Error while starting the service ({}): {}", e.kind(), e);
                self.state = SessionState::NotStarted;
                self.recipient
                    .send(OutboundMessage::ServiceError(e.message().to_string()));
            }
        }
    }

    /// Register if needed, then open the listen connection.
    async fn establish(
        &mut self,
        sender_id: &str,
    ) -> Result<(Box<dyn Connection>, String), SessionError> {
        if sender_id.is_empty() {
            return Err(SessionError::new(
                ErrorKind::InvalidSenderId,
                "Sender id must not be empty",
            ));
        }

        let stored = self.store.credentials();
        let saved_sender_id = self.store.sender_id();
        let persistent_ids = self.store.persistent_ids();

        let credentials = match stored {
            Some(credentials) if saved_sender_id.as_deref() == Some(sender_id) => {
                log::debug!("[Session] Reusing stored credentials for sender {sender_id}");
                credentials
            }
            _ => self.register(sender_id).await?,
        };

        self.generation += 1;
        let sink = self.sink_for(self.generation);
        let token = credentials.fcm.token.clone();
        let request = ListenRequest {
            credentials,
            persistent_ids,
        };

        let connection = self
            .transport
            .listen(request, sink)
            .await
            .map_err(|e| SessionError::from_source(ErrorKind::Transport, &e))?;

        Ok((connection, token))
    }

    async fn register(&mut self, sender_id: &str) -> Result<Credentials, SessionError> {
        log::info!("[Session] Registering for sender {sender_id}");

        let credentials = self
            .transport
            .register(sender_id)
            .await
            .and_then(|c| c.validate().map(|()| c))
            .map_err(|e| SessionError::from_source(ErrorKind::Registration, &e))?;

        self.store.save_registration(sender_id, &credentials);
        self.recipient
            .send(OutboundMessage::TokenUpdated(credentials.fcm.token.clone()));
        Ok(credentials)
    }

    fn sink_for(&self, generation: u64) -> NotificationSink {
        let tx = self.events_tx.clone();
        NotificationSink::new(move |delivery| {
            let _ = tx.send(SessionEvent::Delivered {
                generation,
                delivery,
            });
        })
    }

    /// Disconnect, clear stored credentials and ids, return to `NotStarted`.
    pub fn stop(&mut self) {
        self.disconnect();
        self.store.clear();
        log::info!("[Session] Stopped, stored credentials cleared");
    }

    /// Record one delivery and forward it to the host if it is still alive.
    pub fn on_notification(&mut self, delivery: Delivery) {
        let count = self.store.append_persistent_id(&delivery.persistent_id);
        log::debug!(
            "[Session] Delivered {} ({count} known ids)",
            delivery.persistent_id
        );

        if self.recipient.is_destroyed() {
            log::debug!("[Session] Host is gone, notification not forwarded");
            return;
        }
        self.recipient
            .send(OutboundMessage::NotificationReceived(delivery.notification));
    }

    /// Disconnect without touching the store.
    fn shutdown(&mut self) {
        self.disconnect();
    }

    fn disconnect(&mut self) {
        let previous = std::mem::replace(&mut self.state, SessionState::NotStarted);
        if let SessionState::Started { mut connection } = previous {
            connection.destroy();
        }
        self.generation += 1;
    }
}
