//! Streaming chat relay for the Shopmate storefront
//!
//! One route: `POST /api/chat` with `{"message": "..."}`. The relay opens a
//! single streaming completion call (fixed system instruction plus the one
//! user message — no server-side history) and forwards each text delta to
//! the caller as raw chunked UTF-8, unbatched and in upstream order.
//!
//! Failures are communicated in-band: whatever goes wrong upstream, the
//! caller gets a 200 whose body ends with a fixed error marker, and the
//! stream always closes.
//!
//! Can be used as:
//! - An embedded server (via `start_server_on`)
//! - A standalone binary (`shopmate-relay`)

mod error;

pub use error::RelayError;

use futures::StreamExt;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Bytes, Frame};
use hyper::header::{CACHE_CONTROL, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use llm::{ChatModel, ChatRequest};
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, Infallible>;

/// Written as the final (or only) body content when the upstream call
/// fails at any point. Matches the storefront's localized placeholder.
pub const STREAM_ERROR_MARKER: &str = "（发生错误）";

pub const CHAT_PATH: &str = "/api/chat";

/// Request body for the chat route.
#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub message: String,
}

fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|_| -> Infallible { unreachable!() })
        .boxed()
}

fn status_response(status: StatusCode) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .body(empty_body())
        .unwrap()
}

/// Pull deltas off the upstream stream and push them to the outbound
/// channel as they arrive. No batching, no retry; one attempt.
///
/// Returns `Ok` on clean end-of-stream or when the caller hung up, `Err`
/// when the upstream failed (at open or mid-stream).
async fn forward_upstream(
    model: Arc<dyn ChatModel + Send + Sync>,
    request: ChatRequest,
    tx: &mpsc::Sender<Bytes>,
) -> Result<(), RelayError> {
    let mut stream = model
        .stream_chat(&request)
        .await
        .map_err(|e| RelayError::UpstreamUnavailable(e.to_string()))?;

    while let Some(item) = stream.next().await {
        let chunk = item.map_err(|e| RelayError::UpstreamStreamError(e.to_string()))?;
        if chunk.content.is_empty() {
            continue;
        }
        if tx.send(Bytes::from(chunk.content)).await.is_err() {
            // Caller disconnected; nothing left to relay.
            return Ok(());
        }
    }

    Ok(())
}

/// Build the outbound streaming body for one chat request.
///
/// The forwarding task owns the channel sender, so the body terminates in
/// every case: clean completion, upstream failure (marker written first),
/// or caller disconnect.
fn relay_body(
    model: Arc<dyn ChatModel + Send + Sync>,
    system_prompt: String,
    message: String,
) -> BoxBody {
    let (tx, rx) = mpsc::channel::<Bytes>(16);

    tokio::spawn(async move {
        let request = ChatRequest::single_turn(system_prompt, message);
        if let Err(e) = forward_upstream(model, request, &tx).await {
            tracing::warn!(error = %e, "downgrading upstream failure to in-band marker");
            let _ = tx.send(Bytes::from_static(STREAM_ERROR_MARKER.as_bytes())).await;
        }
    });

    let frames = ReceiverStream::new(rx).map(|bytes| Ok(Frame::data(bytes)));
    BodyExt::boxed(StreamBody::new(frames))
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    model: Arc<dyn ChatModel + Send + Sync>,
    system_prompt: String,
) -> Result<Response<BoxBody>, Infallible> {
    if req.method() != Method::POST || req.uri().path() != CHAT_PATH {
        return Ok(status_response(StatusCode::NOT_FOUND));
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read request body");
            return Ok(status_response(StatusCode::BAD_REQUEST));
        }
    };

    let query: ChatQuery = match serde_json::from_slice(&body) {
        Ok(query) => query,
        Err(e) => {
            tracing::warn!(error = %e, "malformed chat request body");
            return Ok(status_response(StatusCode::BAD_REQUEST));
        }
    };

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(CACHE_CONTROL, "no-cache")
        .body(relay_body(model, system_prompt, query.message))
        .unwrap();

    Ok(response)
}

/// Handle to a running server that can be used to stop it
pub struct ServerHandle {
    shutdown_tx: oneshot::Sender<()>,
    port: u16,
}

impl ServerHandle {
    /// Get the port the server is running on
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the URL for the chat endpoint
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, CHAT_PATH)
    }

    /// Stop the server
    pub fn stop(self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Start the relay on the specified host and port.
///
/// Use port 0 to get a random available port. Returns a handle that can be
/// used to get the port and stop the server.
pub async fn start_server_on(
    host: &str,
    port: u16,
    model: Arc<dyn ChatModel + Send + Sync>,
    system_prompt: String,
) -> anyhow::Result<ServerHandle> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let actual_port = local_addr.port();

    info!("Starting Shopmate chat relay on {}", local_addr);

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Shutting down Shopmate chat relay");
                    break;
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let io = TokioIo::new(stream);
                            let model = Arc::clone(&model);
                            let system_prompt = system_prompt.clone();

                            tokio::spawn(async move {
                                let service = hyper::service::service_fn(move |req| {
                                    handle_request(req, Arc::clone(&model), system_prompt.clone())
                                });
                                if let Err(err) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    tracing::error!("Error serving connection: {:?}", err);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }
    });

    Ok(ServerHandle {
        shutdown_tx,
        port: actual_port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use llm::{ChatChunk, ChatStream, Role};

    /// Scripted upstream: yields the given items, or fails at open.
    struct FakeModel {
        script: Vec<anyhow::Result<ChatChunk>>,
        fail_at_open: bool,
    }

    impl FakeModel {
        fn chunks(parts: &[&str]) -> Arc<dyn ChatModel + Send + Sync> {
            Arc::new(FakeModel {
                script: parts
                    .iter()
                    .map(|p| Ok(ChatChunk::new(Role::Assistant, *p)))
                    .collect(),
                fail_at_open: false,
            })
        }

        fn failing_at_open() -> Arc<dyn ChatModel + Send + Sync> {
            Arc::new(FakeModel {
                script: vec![],
                fail_at_open: true,
            })
        }

        fn failing_after(parts: &[&str]) -> Arc<dyn ChatModel + Send + Sync> {
            let mut script: Vec<anyhow::Result<ChatChunk>> = parts
                .iter()
                .map(|p| Ok(ChatChunk::new(Role::Assistant, *p)))
                .collect();
            script.push(Err(anyhow::anyhow!("upstream dropped the connection")));
            Arc::new(FakeModel {
                script,
                fail_at_open: false,
            })
        }
    }

    #[async_trait]
    impl ChatModel for FakeModel {
        fn name(&self) -> &str {
            "fake"
        }

        async fn stream_chat(&self, _request: &ChatRequest) -> anyhow::Result<ChatStream> {
            if self.fail_at_open {
                anyhow::bail!("401 unauthorized");
            }
            let items: Vec<anyhow::Result<ChatChunk>> = self
                .script
                .iter()
                .map(|item| match item {
                    Ok(chunk) => Ok(chunk.clone()),
                    Err(e) => Err(anyhow::anyhow!(e.to_string())),
                })
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    async fn collect_frames(mut body: BoxBody) -> Vec<String> {
        let mut frames = Vec::new();
        while let Some(frame) = body.frame().await {
            let frame = frame.unwrap();
            if let Some(data) = frame.data_ref() {
                frames.push(String::from_utf8(data.to_vec()).unwrap());
            }
        }
        frames
    }

    #[tokio::test]
    async fn forwards_deltas_unbatched_in_order() {
        let model = FakeModel::chunks(&["Hel", "lo, ", "world!"]);
        let body = relay_body(model, "system".into(), "hi".into());

        let frames = collect_frames(body).await;
        assert_eq!(frames, vec!["Hel", "lo, ", "world!"]);
    }

    #[tokio::test]
    async fn empty_deltas_are_skipped() {
        let model = FakeModel::chunks(&["a", "", "b"]);
        let body = relay_body(model, "system".into(), "hi".into());

        let frames = collect_frames(body).await;
        assert_eq!(frames, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn failure_at_open_yields_only_the_marker() {
        let model = FakeModel::failing_at_open();
        let body = relay_body(model, "system".into(), "hi".into());

        let frames = collect_frames(body).await;
        assert_eq!(frames, vec![STREAM_ERROR_MARKER]);
    }

    #[tokio::test]
    async fn mid_stream_failure_appends_marker_after_partial_text() {
        let model = FakeModel::failing_after(&["Hel", "lo"]);
        let body = relay_body(model, "system".into(), "hi".into());

        let frames = collect_frames(body).await;
        assert_eq!(frames, vec!["Hel", "lo", STREAM_ERROR_MARKER]);
    }

    /// Records the request it was called with.
    struct CapturingModel {
        seen: std::sync::Mutex<Option<ChatRequest>>,
    }

    #[async_trait]
    impl ChatModel for CapturingModel {
        fn name(&self) -> &str {
            "capture"
        }

        async fn stream_chat(&self, request: &ChatRequest) -> anyhow::Result<ChatStream> {
            *self.seen.lock().unwrap() = Some(request.clone());
            Ok(Box::pin(stream::empty()))
        }
    }

    #[tokio::test]
    async fn each_call_is_stateless_system_plus_one_user_message() {
        let model = Arc::new(CapturingModel {
            seen: std::sync::Mutex::new(None),
        });
        let body = relay_body(model.clone(), "be helpful".into(), "where is my order".into());
        let _ = collect_frames(body).await;

        let seen = model.seen.lock().unwrap().clone().unwrap();
        let messages = seen.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "be helpful");
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "where is my order");
    }

    #[tokio::test]
    async fn body_always_terminates() {
        // Even with a zero-chunk clean script the stream must close.
        let model = FakeModel::chunks(&[]);
        let body = relay_body(model, "system".into(), "hi".into());

        let collected = body.collect().await.unwrap().to_bytes();
        assert!(collected.is_empty());
    }
}
