//! Per-request stream state
//!
//! One `StreamSession` exists per outstanding relay call: it owns the
//! stateful decoder and the cancellation token that aborts the read loop
//! when the widget closes mid-stream. Accumulated reply text lives with the
//! consumer of the decoded deltas. Dropped when the stream ends, fails, or
//! is cancelled; never persisted.

use crate::decode::StreamDecoder;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct StreamSession {
    decoder: StreamDecoder,
    cancel: CancellationToken,
}

impl StreamSession {
    pub fn new(cancel: CancellationToken) -> Self {
        StreamSession {
            decoder: StreamDecoder::new(),
            cancel,
        }
    }

    /// Decode the next byte chunk. Returns the decoded delta (may be empty
    /// while a multi-byte character is still incomplete).
    pub fn push_bytes(&mut self, chunk: &[u8]) -> String {
        self.decoder.decode(chunk)
    }

    /// End of stream: flush any dangling partial sequence.
    pub fn finish(&mut self) -> String {
        self.decoder.finish()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
