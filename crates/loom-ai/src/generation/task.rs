//! Producer task that drives a [`Generation`] and hands snapshots to a
//! consumer through a bounded channel.

use loom_common::HistoryEntry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use super::coordinator::{Generation, GenerationReport};
use crate::AiError;

/// Snapshots buffered between producer and consumer.
pub const SNAPSHOT_BUFFER: usize = 8;

/// Consumer side of a running generation.
///
/// Dropping the handle cancels the producer.
pub struct GenerationHandle {
    receiver: mpsc::Receiver<Vec<HistoryEntry>>,
    cancel: CancellationToken,
    task: JoinHandle<Result<GenerationReport, AiError>>,
    _cancel_on_drop: DropGuard,
}

impl GenerationHandle {
    /// Next snapshot, or `None` once the producer has stopped.
    pub async fn next(&mut self) -> Option<Vec<HistoryEntry>> {
        self.receiver.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain any remaining snapshots and wait for the producer's result.
    pub async fn finish(mut self) -> Result<GenerationReport, AiError> {
        while self.receiver.recv().await.is_some() {}
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(AiError::ApiError(format!("generation task failed: {err}"))),
        }
    }
}

/// Run `generation` on its own task, publishing a snapshot after every chunk.
pub fn spawn_generation(generation: Generation, buffer: usize) -> GenerationHandle {
    let (tx, receiver) = mpsc::channel(buffer.max(1));
    let cancel = generation.cancel_token();
    let task = tokio::spawn(drive(generation, tx));
    GenerationHandle {
        receiver,
        _cancel_on_drop: cancel.clone().drop_guard(),
        cancel,
        task,
    }
}

async fn drive(
    mut generation: Generation,
    tx: mpsc::Sender<Vec<HistoryEntry>>,
) -> Result<GenerationReport, AiError> {
    while let Some(snapshot) = generation.next_chunk().await? {
        if tx.send(snapshot).await.is_err() {
            debug!("snapshot receiver dropped, cancelling generation");
            generation.cancel();
        }
    }
    Ok(generation.report())
}
