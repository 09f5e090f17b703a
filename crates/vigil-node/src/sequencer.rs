//! Single-writer sequencer.
//!
//! Submissions may arrive from any number of tasks; one loop owns the
//! engine, stamps each submission with the next logical time, and applies
//! it. Arrival order at the channel is the order of the log.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vigil_core::error::VigilError;
use vigil_core::operation::{Applied, Submission};
use vigil_core::types::{LogicalTime, Timestamp};
use vigil_state::StateEngine;

/// Wall-clock source for logical timestamps.
pub trait Clock: Send + 'static {
    fn now(&mut self) -> Timestamp;
}

/// UTC seconds from the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&mut self) -> Timestamp {
        chrono::Utc::now().timestamp()
    }
}

impl<F> Clock for F
where
    F: FnMut() -> Timestamp + Send + 'static,
{
    fn now(&mut self) -> Timestamp {
        self()
    }
}

struct Request {
    submission: Submission,
    reply: oneshot::Sender<Result<Applied, VigilError>>,
}

/// Cloneable submission endpoint of a running sequencer.
#[derive(Clone)]
pub struct SequencerHandle {
    tx: mpsc::Sender<Request>,
}

impl SequencerHandle {
    /// Queue `submission` and wait for its outcome.
    pub async fn submit(&self, submission: Submission) -> Result<Applied, VigilError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request { submission, reply })
            .await
            .map_err(|_| VigilError::Other("sequencer stopped".into()))?;
        rx.await
            .map_err(|_| VigilError::Other("sequencer dropped the request".into()))?
    }
}

pub struct Sequencer<C: Clock> {
    engine: Arc<StateEngine>,
    clock: C,
    last: LogicalTime,
}

impl<C: Clock> Sequencer<C> {
    /// Resume from the last logged operation, or from height zero.
    pub fn new(engine: Arc<StateEngine>, clock: C) -> Result<Self, VigilError> {
        let head = engine.db.head()?;
        let last = match engine.db.get_logged_op(head)? {
            Some(entry) => entry.at,
            None => LogicalTime::default(),
        };
        Ok(Self { engine, clock, last })
    }

    /// Next logical time: one block later, never earlier than the last stamp.
    fn tick(&mut self) -> LogicalTime {
        let timestamp = self.clock.now().max(self.last.timestamp);
        self.last = LogicalTime::new(self.last.height + 1, timestamp);
        self.last
    }

    /// Start the loop. It runs until every handle is dropped.
    pub fn spawn(mut self, capacity: usize) -> (SequencerHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Request>(capacity);
        let task = tokio::spawn(async move {
            info!(height = self.last.height, "sequencer started");
            while let Some(req) = rx.recv().await {
                let now = self.tick();
                let result = self.engine.apply(&req.submission, now);
                match &result {
                    Ok(applied) => debug!(sequence = applied.sequence, height = now.height, "sequenced"),
                    Err(e) => warn!(error = %e, op = req.submission.operation.name(), "submission rejected"),
                }
                let _ = req.reply.send(result);
            }
            info!(height = self.last.height, "sequencer stopped");
        });
        (SequencerHandle { tx }, task)
    }
}
