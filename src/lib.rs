//! push-receiver - push notification session worker.
//!
//! Exposes a third-party push transport (registration + persistent listen
//! loop) to a desktop host application over a message channel, with
//! encrypted local persistence of credentials and delivery state.
//!
//! # Architecture
//!
//! - **Session** - single-writer actor owning the listen session and its state
//! - **Transport** - registration/listen collaborator behind a trait
//! - **Store** - encrypted key-value persistence of credentials and persistent ids
//! - **Channel** - the host-facing message names and their stdio framing
//!
//! # Modules
//!
//! - [`session`] - session lifecycle and persistent-id tracking
//! - [`transport`] - push transport trait and the relay implementation
//! - [`store`] - key-value stores
//! - [`channel`] - inbound/outbound messages and the stdio worker loop
//! - [`config`] - configuration loading/saving

pub mod channel;
pub mod commands;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod crypto;
pub mod env;
pub mod keyring;
pub mod session;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use channel::{ChannelRecipient, InboundMessage, OutboundMessage, Recipient};
pub use config::Config;
pub use credentials::Credentials;
pub use session::{ErrorKind, SessionError, SessionHandle, SessionManager};
pub use store::{EncryptedFileStore, KeyValueStore, MemoryStore};
pub use transport::{Connection, Delivery, ListenRequest, NotificationSink, PushTransport};
