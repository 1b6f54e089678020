use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategy::signals::ActionType;

/// Failure reported by a callback implementation.
///
/// A failed callback always carries a message.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct CallbackError {
    pub message: String,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Result of every call that crosses the callback boundary
pub type CallbackResult<T> = std::result::Result<T, CallbackError>;

/// Wire form of a callback result: `{success, data, message}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> CallbackEnvelope<T> {
    /// Convert into a result, requiring data on success
    pub fn into_result(self) -> CallbackResult<T> {
        if !self.success {
            return Err(CallbackError::new(
                self.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| CallbackError::new("response reported success but carried no data"))
    }
}

impl<T: Default> CallbackEnvelope<T> {
    /// Convert into a result, substituting the default when data is absent
    pub fn into_result_or_default(self) -> CallbackResult<T> {
        if !self.success {
            return Err(CallbackError::new(
                self.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(self.data.unwrap_or_default())
    }
}

/// Pipeline error taxonomy. Expected skips are not errors and never show up here.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("{operation} failed: {source}")]
    Exchange {
        operation: &'static str,
        #[source]
        source: CallbackError,
    },

    #[error("Invalid precision_amount ({reason}): {value}")]
    InvalidPrecision { value: f64, reason: &'static str },

    #[error("{action} requires {field}")]
    MissingField {
        action: ActionType,
        field: &'static str,
    },

    #[error("Unknown action type: {0}")]
    UnknownAction(String),

    #[error("Invalid ticker price for {0}")]
    InvalidTickerPrice(String),

    #[error("{0} returned no data")]
    MissingData(&'static str),

    #[error("Action {action} failed: {source}")]
    ActionFailed {
        action: ActionType,
        #[source]
        source: Box<BotError>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BotError {
    pub fn exchange(operation: &'static str, source: CallbackError) -> Self {
        Self::Exchange { operation, source }
    }
}

impl From<config::ConfigError> for BotError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
