//! Channel names and tuning constants.
//!
//! # Categories
//!
//! - **Channel names**: the six message names shared with the host application
//! - **Store keys**: the persisted session keys
//! - **Timeouts**: network timeouts and reconnect backoff

use std::time::Duration;

// ============================================================================
// Channel names
// ============================================================================

/// Inbound: start the notification service. Payload: sender id.
pub const START_NOTIFICATION_SERVICE: &str = "START_NOTIFICATION_SERVICE";

/// Inbound: tear down the notification service. No payload.
pub const DESTROY_NOTIFICATION_SERVICE: &str = "DESTROY_NOTIFICATION_SERVICE";

/// Outbound: the session is listening. Payload: current token (may be empty).
pub const NOTIFICATION_SERVICE_STARTED: &str = "NOTIFICATION_SERVICE_STARTED";

/// Outbound: starting the session failed. Payload: human-readable message.
pub const NOTIFICATION_SERVICE_ERROR: &str = "NOTIFICATION_SERVICE_ERROR";

/// Outbound: a notification was delivered. Payload: notification body.
pub const NOTIFICATION_RECEIVED: &str = "NOTIFICATION_RECEIVED";

/// Outbound: registration produced a new token. Payload: token.
pub const TOKEN_UPDATED: &str = "TOKEN_UPDATED";

// ============================================================================
// Store keys
// ============================================================================

/// Default store namespace; the store file is `{name}.enc`.
pub const DEFAULT_STORE_NAME: &str = "fcm";

/// Registration result.
pub const CREDENTIALS_KEY: &str = "credentials";

/// Sender id the stored credentials were registered against.
pub const SENDER_ID_KEY: &str = "senderId";

/// Persistent ids of notifications already delivered.
pub const PERSISTENT_IDS_KEY: &str = "persistentIds";

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP request timeout for relay registration.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// First reconnect delay after the listen socket drops.
pub const RECONNECT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Reconnect delay ceiling.
pub const RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(60);
