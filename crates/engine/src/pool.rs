//! Fixed worker pool executing publish pipelines.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::warn;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed set of named worker threads draining one job queue.
///
/// Dropping the pool closes the queue, lets workers finish what they hold,
/// and joins them.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size.max(1))
            .map(|i| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("chronicle-worker-{i}"))
                    .spawn(move || {
                        loop {
                            let job = {
                                let guard = match receiver.lock() {
                                    Ok(guard) => guard,
                                    Err(_) => break,
                                };
                                guard.recv()
                            };
                            match job {
                                Ok(job) => job(),
                                Err(_) => break,
                            }
                        }
                    })
                    .expect("failed to spawn pipeline worker thread")
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            if sender.send(Box::new(job)).is_err() {
                warn!("worker pool queue closed, dropping job");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        let me = thread::current().id();
        for worker in self.workers.drain(..) {
            // The last repository handle can die inside a pipeline job; that
            // worker detaches itself instead of joining its own thread.
            if worker.thread().id() == me {
                continue;
            }
            let _ = worker.join();
        }
    }
}
