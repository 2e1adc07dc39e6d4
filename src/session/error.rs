//! Session start failures.
//!
//! Every failure carries a human-readable message (what the host receives
//! in `NOTIFICATION_SERVICE_ERROR`) and a machine-readable [`ErrorKind`].

/// What went wrong while starting a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The sender id was empty.
    InvalidSenderId,
    /// The registration call failed.
    Registration,
    /// The listen connection could not be opened.
    Transport,
}

impl ErrorKind {
    /// Stable string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidSenderId => "invalid_sender_id",
            Self::Registration => "registration",
            Self::Transport => "transport",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    kind: ErrorKind,
    message: String,
}

impl SessionError {
    /// Build an error from parts.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Wrap a collaborator error, keeping its full context chain as the message.
    pub fn from_source(kind: ErrorKind, source: &anyhow::Error) -> Self {
        Self::new(kind, format!("{source:#}"))
    }

    /// Machine-readable kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SessionError {}
