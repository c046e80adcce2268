//! Engine error model.

use thiserror::Error;

use chronicle_core::CoreError;
use chronicle_hlc::ClockError;
use chronicle_index::IndexError;
use chronicle_journal::JournalError;

/// Application-level failure raised while executing a command.
///
/// Carries the failing error's type name and message so the pipeline can
/// turn it into a durable diagnostic event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{type_name}: {message}")]
pub struct CommandError {
    pub type_name: String,
    pub message: String,
}

impl CommandError {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Capture a typed error's name and message.
    pub fn from_error<E: std::error::Error>(error: &E) -> Self {
        Self::new(std::any::type_name::<E>(), error.to_string())
    }
}

/// Engine operation error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The command's own execution failed; the original failure, surfaced to
    /// the publisher after being audited as a diagnostic event.
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error(transparent)]
    Codec(#[from] CoreError),

    /// The command or event type was never registered with the repository.
    #[error("unregistered type: {0}")]
    UnregisteredType(String),

    /// The predicate names an attribute the type never declared.
    #[error("unknown attribute '{attribute}' on type '{type_name}'")]
    UnknownAttribute {
        type_name: String,
        attribute: String,
    },

    /// The publishing side went away before completing the future.
    #[error("publish abandoned before completion")]
    Abandoned,

    /// An internal lock was poisoned by a panicking thread.
    #[error("engine lock poisoned")]
    Poisoned,
}

impl EngineError {
    /// Short classification used when auditing a failure as a diagnostic
    /// event; for command failures this is the application error's own type.
    pub fn kind(&self) -> String {
        match self {
            Self::Command(e) => e.type_name.clone(),
            Self::Journal(_) => "JournalError".to_string(),
            Self::Index(_) => "IndexError".to_string(),
            Self::Clock(_) => "ClockError".to_string(),
            Self::Codec(_) => "CodecError".to_string(),
            Self::UnregisteredType(_) => "UnregisteredType".to_string(),
            Self::UnknownAttribute { .. } => "UnknownAttribute".to_string(),
            Self::Abandoned => "Abandoned".to_string(),
            Self::Poisoned => "Poisoned".to_string(),
        }
    }
}
