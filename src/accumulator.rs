//! Folds a fragment stream into the trailing assistant message.

use std::time::Instant;

use futures::{Stream, StreamExt};

use crate::Result;
use crate::cancellation::CancellationToken;
use crate::observability::{STREAM_BYTES, STREAM_DROPPED, STREAM_FRAGMENTS, STREAM_TTFB};
use crate::state::SessionStore;

/// How a fold ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The provider finished and the message was finalized.
    Completed,
    /// The token was cancelled; the remaining fragments were not consumed.
    Cancelled,
}

/// Applies fragments, in order, to the store on behalf of one send.
pub struct StreamAccumulator<'a> {
    store: &'a SessionStore,
    token: &'a CancellationToken,
    fragments: usize,
}

impl<'a> StreamAccumulator<'a> {
    /// Creates an accumulator writing to `store` for as long as `token` is live.
    pub fn new(store: &'a SessionStore, token: &'a CancellationToken) -> Self {
        Self {
            store,
            token,
            fragments: 0,
        }
    }

    /// Number of fragments applied so far.
    pub fn fragments_applied(&self) -> usize {
        self.fragments
    }

    /// Consume `fragments` until the stream ends, fails, or the token is cancelled.
    ///
    /// Cancellation is not an error. A failed fragment ends the fold with that
    /// error and leaves the message unfinalized for the caller to clean up.
    pub async fn run<S>(&mut self, fragments: S) -> Result<StreamEnd>
    where
        S: Stream<Item = Result<String>>,
    {
        let started = Instant::now();
        futures::pin_mut!(fragments);
        while let Some(fragment) = fragments.next().await {
            if self.token.is_cancelled() {
                STREAM_DROPPED.click();
                return Ok(StreamEnd::Cancelled);
            }
            let fragment = fragment?;
            if !self
                .store
                .apply_delta_unless_cancelled(self.token, &fragment)
            {
                STREAM_DROPPED.click();
                return Ok(StreamEnd::Cancelled);
            }
            if self.fragments == 0 {
                STREAM_TTFB.add(started.elapsed().as_secs_f64());
            }
            self.fragments += 1;
            STREAM_FRAGMENTS.click();
            STREAM_BYTES.count(fragment.len() as u64);
        }
        if !self.store.finalize_assistant_unless_cancelled(self.token) {
            return Ok(StreamEnd::Cancelled);
        }
        tracing::debug!(fragments = self.fragments, "stream completed");
        Ok(StreamEnd::Completed)
    }
}
