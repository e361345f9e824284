#![forbid(unsafe_code)]

//! Error types for the change-notification protocol.

use std::error::Error as StdError;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Failure raised by an observer callback.
///
/// Observers return this from `will_change`/`did_change`; the notifier
/// stops the delivery pass and hands it back to whoever drove the cycle.
#[derive(Debug, Error)]
#[error("observer failed: {message}")]
pub struct ObserverError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + 'static>>,
}

impl ObserverError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error, keeping it reachable through `source()`.
    #[must_use]
    pub fn with_source(message: impl Into<String>, source: impl StdError + 'static) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Observer(#[from] ObserverError),

    /// `begin` while a cycle is already pending on the same collection.
    #[error("begin called while a change cycle is already pending (cycle {cycle})")]
    NestedBegin { cycle: u64 },

    /// `end` while no cycle is pending.
    #[error("end called without a matching begin")]
    EndWithoutBegin,
}

impl ProtocolError {
    /// Whether this error reports caller misuse rather than an observer failure.
    #[must_use]
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::NestedBegin { .. } | Self::EndWithoutBegin)
    }
}
