//! Runtime environment, read from `PUSH_RECEIVER_ENV`.
//!
//! | Value                  | Environment   | Effect                                   |
//! |------------------------|---------------|------------------------------------------|
//! | `test`                 | `Test`        | file-backed store key, repo-local `tmp/` |
//! | `development`, `dev`   | `Development` | debug logging by default                 |
//! | anything else, unset   | `Production`  |                                          |

/// Application name used for config directories and the keyring service.
pub const APP_NAME: &str = "push-receiver";

/// Runtime environment for the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Default.
    #[default]
    Production,
    /// Local development.
    Development,
    /// Automated tests.
    Test,
}

impl Environment {
    /// Detect the environment from `PUSH_RECEIVER_ENV`.
    #[must_use]
    pub fn current() -> Self {
        std::env::var("PUSH_RECEIVER_ENV")
            .map(|value| Self::from_value(&value))
            .unwrap_or_default()
    }

    fn from_value(value: &str) -> Self {
        match value {
            "test" => Self::Test,
            "development" | "dev" => Self::Development,
            _ => Self::Production,
        }
    }

    /// Lower-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
            Self::Test => "test",
        }
    }

    /// Returns `true` for the test environment.
    #[must_use]
    pub fn is_test(self) -> bool {
        self == Self::Test
    }

    /// Log filter used when `RUST_LOG` is unset.
    #[must_use]
    pub fn default_log_filter(self) -> &'static str {
        match self {
            Self::Production => "info",
            Self::Development | Self::Test => "debug",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns `true` if the OS keyring should be bypassed.
#[must_use]
pub fn should_skip_keyring() -> bool {
    Environment::current().is_test()
}
