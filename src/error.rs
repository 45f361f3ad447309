//! # Error Types
//!
//! Call-level failures of the engine API.
//!
//! Most OPC-UA outcomes are not errors in the Rust sense: per-item results
//! (one [`StatusCode`] per monitored item, per acknowledgement, per triggering
//! link) are returned inside `Ok(..)`. An [`Error`] means the whole call was
//! rejected.
//!
//! | Variant | Cause | Recoverable? |
//! |---------|-------|--------------|
//! | [`Error::Service`] | The service rejected the request (`BadSubscriptionIdInvalid`, `BadTooManySubscriptions`, ...) | Depends on the code |
//! | [`Error::Config`] | Invalid [`EngineConfig`](crate::EngineConfig) | No (fix config) |
//! | [`Error::RuntimeShutdown`] | The engine task has stopped | No |
//!
//! ## Usage Pattern
//!
//! ```no_run
//! use opcua_publish_engine::prelude::*;
//!
//! async fn create(session: &Session) -> Result<u32> {
//!     match session.create_subscription(CreateSubscriptionRequest::default()).await {
//!         Ok(created) => Ok(created.subscription_id),
//!         Err(Error::Service(code)) if code == StatusCode::BAD_TOO_MANY_SUBSCRIPTIONS => {
//!             // Server is at capacity, retry later
//!             Err(Error::Service(code))
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! # fn main() {}
//! ```

use std::fmt;

use crate::status::StatusCode;

/// Result type alias using the library's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for all engine operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The service call as a whole failed with the given status.
    Service(StatusCode),

    /// Configuration error.
    ///
    /// Returned by [`EngineBuilder::start`](crate::EngineBuilder::start) when
    /// the configuration is inconsistent.
    Config(ConfigError),

    /// The engine has shut down.
    ///
    /// Occurs once [`ServerEngine::shutdown`](crate::ServerEngine::shutdown)
    /// completed or the last engine handle was dropped.
    RuntimeShutdown,
}

impl Error {
    /// The OPC-UA status equivalent of this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Service(code) => *code,
            Self::Config(_) => StatusCode::BAD_INTERNAL_ERROR,
            Self::RuntimeShutdown => StatusCode::BAD_SHUTDOWN,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service(code) => write!(f, "Service fault: {code}"),
            Self::Config(e) => write!(f, "Configuration error: {}", e.message),
            Self::RuntimeShutdown => write!(f, "Engine has shut down"),
        }
    }
}

impl std::error::Error for Error {}

impl From<StatusCode> for Error {
    fn from(code: StatusCode) -> Self {
        Self::Service(code)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
