//! Publish futures.

use std::sync::mpsc;
use std::time::Duration;

use tracing::debug;

use crate::error::EngineError;

/// The pending outcome of a published command.
///
/// Resolves to the command's declared result, or rejects with the original
/// failure (the diagnostic event the pipeline journals on failure is a side
/// artifact for auditability, never the surfaced error).
#[derive(Debug)]
pub struct CommandFuture<T> {
    receiver: mpsc::Receiver<Result<T, EngineError>>,
}

impl<T> CommandFuture<T> {
    pub(crate) fn channel() -> (Self, Completer<T>) {
        let (sender, receiver) = mpsc::channel();
        (Self { receiver }, Completer { sender })
    }

    /// Block until the pipeline completes.
    pub fn wait(&self) -> Result<T, EngineError> {
        self.receiver.recv().unwrap_or(Err(EngineError::Abandoned))
    }

    /// Check for completion without blocking.
    pub fn try_wait(&self) -> Option<Result<T, EngineError>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(EngineError::Abandoned)),
        }
    }

    /// Block for up to `timeout` waiting for completion.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, EngineError>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => Some(Err(EngineError::Abandoned)),
        }
    }
}

/// Pipeline-side handle completing a [`CommandFuture`].
pub(crate) struct Completer<T> {
    sender: mpsc::Sender<Result<T, EngineError>>,
}

impl<T> Completer<T> {
    pub fn complete(self, outcome: Result<T, EngineError>) {
        if self.sender.send(outcome).is_err() {
            // The publisher stopped waiting; the work is still durable.
            debug!("publish future dropped before completion");
        }
    }
}
