//! Background task driving one widget's relay calls
//!
//! Mirrors the widget's one-outstanding-request model: commands go in over
//! an unbounded channel, decoded token deltas come back as events. The UI
//! thread polls `try_recv` from its event loop; the receive loop itself
//! never touches UI state, so dragging and streaming cannot block each
//! other.

use crate::session::StreamSession;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use llm::Client;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

enum EngineCommand {
    SendMessage {
        message: String,
        // Captured when the command is queued, so a cancel that lands before
        // the processor picks the command up still aborts this request.
        cancel: CancellationToken,
    },
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A decoded text delta, in arrival order.
    Token(String),
    MessageComplete,
    Error(String),
}

/// Relay request body: `{"message": "..."}`
#[derive(Serialize)]
struct RelayQuery {
    message: String,
}

pub struct ChatEngine {
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    event_rx: mpsc::UnboundedReceiver<EngineEvent>,
    cancel_slot: Arc<Mutex<CancellationToken>>,
    #[allow(dead_code)]
    processor_handle: JoinHandle<()>,
}

impl ChatEngine {
    pub fn new(relay_url: String) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel_slot = Arc::new(Mutex::new(CancellationToken::new()));

        let processor_handle = tokio::spawn(async move {
            Self::processor_loop(Client::default(), relay_url, cmd_rx, event_tx).await;
        });

        Self {
            cmd_tx,
            event_rx,
            cancel_slot,
            processor_handle,
        }
    }

    async fn processor_loop(
        client: Client,
        relay_url: String,
        mut cmd_rx: mpsc::UnboundedReceiver<EngineCommand>,
        event_tx: mpsc::UnboundedSender<EngineEvent>,
    ) {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                EngineCommand::SendMessage { message, cancel } => {
                    // Cancelled while still queued: finalize without calling out.
                    if cancel.is_cancelled() {
                        let _ = event_tx.send(EngineEvent::MessageComplete);
                        continue;
                    }
                    let mut session = StreamSession::new(cancel);

                    let query = RelayQuery { message };
                    match client.post_byte_stream(&relay_url, &query).await {
                        Ok(stream) => pump_stream(&mut session, stream, &event_tx).await,
                        Err(e) => {
                            tracing::warn!(error = %e, "relay request failed to open");
                            let _ = event_tx.send(EngineEvent::Error(e.to_string()));
                        }
                    }
                }
            }
        }
    }

    pub fn send_message(&self, message: String) {
        let cancel = match self.cancel_slot.lock() {
            Ok(token) => token.clone(),
            Err(_) => CancellationToken::new(),
        };
        let _ = self
            .cmd_tx
            .send(EngineCommand::SendMessage { message, cancel });
    }

    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Abort the in-flight stream, if any. Called when the widget closes;
    /// the next submission gets a fresh token.
    pub fn cancel_in_flight(&self) {
        if let Ok(mut slot) = self.cancel_slot.lock() {
            slot.cancel();
            *slot = CancellationToken::new();
        }
    }
}

/// Read one response body to completion, decoding and forwarding in strict
/// arrival order.
///
/// Terminates on end-of-stream (complete), transport error (error event), or
/// cancellation (completes with whatever text had accumulated).
async fn pump_stream<S>(
    session: &mut StreamSession,
    mut stream: S,
    event_tx: &mpsc::UnboundedSender<EngineEvent>,
) where
    S: Stream<Item = anyhow::Result<Bytes>> + Unpin,
{
    let cancel = session.cancel_token().clone();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("stream cancelled by widget close");
                let _ = event_tx.send(EngineEvent::MessageComplete);
                return;
            }
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    let delta = session.push_bytes(&bytes);
                    if !delta.is_empty() {
                        let _ = event_tx.send(EngineEvent::Token(delta));
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "transport failure while reading relay stream");
                    let _ = event_tx.send(EngineEvent::Error(e.to_string()));
                    return;
                }
                None => {
                    let tail = session.finish();
                    if !tail.is_empty() {
                        let _ = event_tx.send(EngineEvent::Token(tail));
                    }
                    let _ = event_tx.send(EngineEvent::MessageComplete);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&[u8]]) -> Vec<anyhow::Result<Bytes>> {
        parts.iter().map(|p| Ok(Bytes::copy_from_slice(p))).collect()
    }

    async fn pump_collect(items: Vec<anyhow::Result<Bytes>>) -> Vec<EngineEvent> {
        let mut session = StreamSession::new(CancellationToken::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        pump_stream(&mut session, stream::iter(items), &tx).await;
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn tokens_arrive_in_order_then_complete() {
        let events = pump_collect(chunks(&[b"Hel", b"lo, ", b"world!"])).await;

        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], EngineEvent::Token(t) if t == "Hel"));
        assert!(matches!(&events[1], EngineEvent::Token(t) if t == "lo, "));
        assert!(matches!(&events[2], EngineEvent::Token(t) if t == "world!"));
        assert!(matches!(events[3], EngineEvent::MessageComplete));
    }

    #[tokio::test]
    async fn split_multibyte_decodes_across_chunks() {
        let bytes = "欢迎".as_bytes();
        let events = pump_collect(chunks(&[&bytes[..4], &bytes[4..]])).await;

        let text: String = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Token(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "欢迎");
        assert!(matches!(events.last(), Some(EngineEvent::MessageComplete)));
    }

    #[tokio::test]
    async fn transport_error_after_partial_data() {
        let items: Vec<anyhow::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"partial ")),
            Err(anyhow::anyhow!("connection reset")),
        ];
        let events = pump_collect(items).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], EngineEvent::Token(t) if t == "partial "));
        assert!(matches!(&events[1], EngineEvent::Error(_)));
    }

    #[tokio::test]
    async fn cancel_covers_a_queued_but_unprocessed_request() {
        // Single-threaded runtime: the processor task cannot run between the
        // two calls below, so the command is still queued when the cancel
        // lands. The captured token must abort it without a relay call (an
        // attempt against this closed port would surface as Error instead).
        let mut engine = ChatEngine::new("http://127.0.0.1:9/api/chat".to_string());
        engine.send_message("hello".to_string());
        engine.cancel_in_flight();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                if let Some(event) = engine.try_recv() {
                    return event;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(matches!(event, EngineEvent::MessageComplete));
    }

    #[tokio::test]
    async fn cancellation_completes_with_accumulated_text() {
        let token = CancellationToken::new();
        let mut session = StreamSession::new(token.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        // A stream that never yields: only cancellation can end the pump.
        token.cancel();
        pump_stream(&mut session, stream::pending::<anyhow::Result<Bytes>>(), &tx).await;
        drop(tx);

        let event = rx.recv().await;
        assert!(matches!(event, Some(EngineEvent::MessageComplete)));
        assert!(rx.recv().await.is_none());
    }
}
