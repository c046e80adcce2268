//! System events the pipeline itself records.

use serde::{Deserialize, Serialize};

use chronicle_core::{EntityId, EntityLayout};
use chronicle_index::{AttributeDescriptor, IndexFeature};

use crate::command::Event;
use crate::registry::TypeDescriptor;

/// A durable fact linking a produced event to the command that caused it.
///
/// One command may cause many events; migrations preserve provenance by
/// re-emitting these links for transformed events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCausalityEstablished {
    pub event: EntityId,
    pub command: EntityId,
}

impl EventCausalityEstablished {
    pub const TYPE_NAME: &'static str = "chronicle.event.causality_established";

    pub fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new(EntityLayout::new(
            Self::TYPE_NAME,
            [("event", "entity_id"), ("command", "entity_id")],
        ))
        .with_attribute(AttributeDescriptor::field("event", [IndexFeature::Equality]))
        .with_attribute(AttributeDescriptor::field("command", [IndexFeature::Equality]))
    }
}

impl Event for EventCausalityEstablished {
    fn event_type(&self) -> &'static str {
        Self::TYPE_NAME
    }
}

/// Marker fact recorded when a command's execution failed; the linked
/// [`ExceptionOccurred`] event carries the details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTerminatedExceptionally {}

impl CommandTerminatedExceptionally {
    pub const TYPE_NAME: &'static str = "chronicle.command.terminated_exceptionally";

    pub fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new(EntityLayout::new(Self::TYPE_NAME, []))
    }
}

impl Event for CommandTerminatedExceptionally {
    fn event_type(&self) -> &'static str {
        Self::TYPE_NAME
    }
}

/// One captured stack frame: an opaque `(symbol, file, line)` tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    pub symbol: String,
    pub file: String,
    pub line: u32,
}

impl FrameDescriptor {
    /// Best-effort capture of the current call stack.
    ///
    /// Backtrace availability depends on the build; an empty list just means
    /// the runtime had nothing to offer.
    pub fn capture() -> Vec<FrameDescriptor> {
        let backtrace = std::backtrace::Backtrace::force_capture().to_string();
        let mut frames = Vec::new();
        let mut lines = backtrace.lines().peekable();
        while let Some(line) = lines.next() {
            let line = line.trim();
            let Some((_, symbol)) = line.split_once(": ") else {
                continue;
            };
            let mut frame = FrameDescriptor {
                symbol: symbol.to_string(),
                file: String::new(),
                line: 0,
            };
            let location = lines
                .peek()
                .and_then(|l| l.trim().strip_prefix("at "))
                .map(str::to_string);
            if let Some(location) = location {
                lines.next();
                // location is "<file>:<line>:<column>"
                let mut parts = location.rsplitn(3, ':');
                let _column = parts.next();
                frame.line = parts.next().and_then(|l| l.parse().ok()).unwrap_or(0);
                frame.file = parts.next().unwrap_or_default().to_string();
            }
            frames.push(frame);
        }
        frames
    }
}

/// Structured failure record: the failing error's type, message, and stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionOccurred {
    pub error_type: String,
    pub message: String,
    pub frames: Vec<FrameDescriptor>,
}

impl ExceptionOccurred {
    pub const TYPE_NAME: &'static str = "chronicle.command.exception_occurred";

    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            frames: FrameDescriptor::capture(),
        }
    }

    pub fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new(EntityLayout::new(
            Self::TYPE_NAME,
            [
                ("error_type", "string"),
                ("message", "string"),
                ("frames", "list<frame>"),
            ],
        ))
        .with_attribute(AttributeDescriptor::field(
            "error_type",
            [IndexFeature::Equality],
        ))
    }
}

impl Event for ExceptionOccurred {
    fn event_type(&self) -> &'static str {
        Self::TYPE_NAME
    }
}

/// Descriptors of every event type the pipeline records on its own behalf.
pub fn system_event_descriptors() -> Vec<TypeDescriptor> {
    vec![
        EventCausalityEstablished::descriptor(),
        CommandTerminatedExceptionally::descriptor(),
        ExceptionOccurred::descriptor(),
    ]
}
