//! The caller's side of a streaming call.

use crate::defaults;
use crate::error::LlmError;
use crate::types::{Fragment, GenOutput};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

/// A streaming generation in progress.
///
/// Yields fragments as they arrive; [`GenStream::finish`] waits for the call to
/// end and returns the accumulated result. Dropping the handle cancels the call.
pub struct GenStream {
    fragments: mpsc::Receiver<Fragment>,
    task: JoinHandle<Result<GenOutput, LlmError>>,
    _guard: DropGuard,
}

impl GenStream {
    /// `cancel` is cancelled when the handle is dropped.
    pub(crate) fn new(
        fragments: mpsc::Receiver<Fragment>,
        task: JoinHandle<Result<GenOutput, LlmError>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fragments,
            task,
            _guard: cancel.drop_guard(),
        }
    }

    /// Replay a finished result as a stream, for providers without streaming support.
    pub fn from_output(output: GenOutput) -> Self {
        let replay = output.result.to_fragments();
        let (tx, rx) = mpsc::channel(replay.len().max(defaults::streaming::FRAGMENT_BUFFER));
        for fragment in replay {
            // Capacity covers every fragment.
            let _ = tx.try_send(fragment);
        }
        drop(tx);
        Self::new(
            rx,
            tokio::spawn(async move { Ok(output) }),
            CancellationToken::new(),
        )
    }

    /// The next fragment, or `None` once the stream has ended.
    pub async fn next_fragment(&mut self) -> Option<Fragment> {
        self.fragments.recv().await
    }

    /// Wait for the call to complete.
    ///
    /// Fragments not read yet are discarded but still part of the result. A
    /// failed call returns its error, never a partial result.
    pub async fn finish(self) -> Result<GenOutput, LlmError> {
        let Self {
            fragments,
            task,
            _guard: guard,
        } = self;
        drop(fragments);
        let outcome = task.await.map_err(|e| {
            if e.is_cancelled() {
                LlmError::Cancelled
            } else {
                LlmError::InternalError(format!("generation task failed: {e}"))
            }
        })?;
        let _ = guard.disarm();
        outcome
    }
}

impl Stream for GenStream {
    type Item = Fragment;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Fragment>> {
        self.fragments.poll_recv(cx)
    }
}

impl std::fmt::Debug for GenStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenStream").finish_non_exhaustive()
    }
}
