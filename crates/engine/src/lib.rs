//! `chronicle-engine` — the repository commit pipeline.
//!
//! Orchestrates the whole engine: given a command, it acquires locks,
//! computes the resulting event stream, timestamps and journals everything
//! transactionally, updates indexes, records causality, and returns the
//! command's declared result through a future.

pub mod command;
pub mod error;
pub mod events;
pub mod future;
pub mod lock;
pub mod registry;
pub mod repository;

mod pool;

#[cfg(test)]
mod integration_tests;

pub use command::{Command, Event, EventStream, ProducedEvent};
pub use error::{CommandError, EngineError};
pub use events::{
    CommandTerminatedExceptionally, EventCausalityEstablished, ExceptionOccurred, FrameDescriptor,
};
pub use future::CommandFuture;
pub use lock::{LockGuard, LockProvider};
pub use registry::{TypeDescriptor, TypeRegistry};
pub use repository::{Repository, RepositoryOptions};
