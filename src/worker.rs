//! Deferred execution facility.
//!
//! The dispatcher hands create/update work to a `JobQueue` when one is
//! configured. The trait is the seam for real task systems (serialize the
//! job, consume it elsewhere, call `JobRunner::run`); `TokioJobQueue` is
//! the in-process implementation: an unbounded channel drained by one
//! worker task that runs jobs to completion, one at a time.
//!
//! Delivery is at-least-once within the process and carries no ordering
//! guarantee relative to other events. A failed job is logged and
//! dropped; retry policy belongs to the queue facility, not the engine.

use crate::context::{Lifecycle, Snapshot};
use crate::dispatcher::JobRunner;
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// One unit of deferred counter work. Serializable so external task
/// systems can carry it across process boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredJob {
    pub counter: String,
    pub lifecycle: Lifecycle,
    pub snapshot: Snapshot,
}

/// Deferred-execution seam consumed by the dispatcher.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: DeferredJob) -> Result<(), EngineError>;
}

/// Messages for the queue worker.
enum QueueMessage {
    Run(Box<DeferredJob>),
    Shutdown { response_tx: oneshot::Sender<()> },
}

/// In-process queue handle. Cheap to clone; all clones feed the same
/// worker.
#[derive(Clone)]
pub struct TokioJobQueue {
    tx: mpsc::UnboundedSender<QueueMessage>,
}

impl TokioJobQueue {
    /// Create the queue handle and its receiving end. Pass the receiver to
    /// `QueueWorker::new` and spawn `run` on a runtime.
    pub fn channel() -> (Self, QueueReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TokioJobQueue { tx }, QueueReceiver { rx })
    }

    /// Stop the worker after it drains everything queued ahead of the
    /// shutdown message.
    pub async fn shutdown(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self.tx.send(QueueMessage::Shutdown { response_tx }).is_ok() {
            let _ = response_rx.await;
        }
    }
}

impl JobQueue for TokioJobQueue {
    fn enqueue(&self, job: DeferredJob) -> Result<(), EngineError> {
        self.tx
            .send(QueueMessage::Run(Box::new(job)))
            .map_err(|_| EngineError::Storage("deferred queue worker is gone".to_string()))
    }
}

/// Receiving end of the queue, owned by the worker.
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<QueueMessage>,
}

/// Worker that owns the receiver and processes jobs until shutdown.
pub struct QueueWorker {
    runner: JobRunner,
    rx: mpsc::UnboundedReceiver<QueueMessage>,
}

impl QueueWorker {
    pub fn new(runner: JobRunner, receiver: QueueReceiver) -> Self {
        QueueWorker {
            runner,
            rx: receiver.rx,
        }
    }

    /// Run the worker loop. Returns when every queue handle is dropped or
    /// a shutdown message arrives.
    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                QueueMessage::Run(job) => {
                    debug!(counter = %job.counter, lifecycle = %job.lifecycle, "running deferred job");
                    if let Err(err) = self.runner.run(*job) {
                        error!(%err, "deferred job failed");
                    }
                }
                QueueMessage::Shutdown { response_tx } => {
                    info!("queue worker shutting down");
                    let _ = response_tx.send(());
                    break;
                }
            }
        }
    }
}
