use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;
use std::sync::Arc;

pub mod api;
mod client;
pub mod providers;

pub use api::*;
pub use client::{BoxedStream, Client};
pub use providers::{DeepSeekChatModel, DeepSeekProvider};

/// Incremental deltas from a streaming chat call.
///
/// Items are `Err` when the transport fails after the stream opened, so
/// consumers can distinguish a clean end-of-stream from a broken one.
pub type ChatStream = Pin<Box<dyn Stream<Item = anyhow::Result<ChatChunk>> + Send>>;

#[async_trait]
pub trait ChatModel {
    fn name(&self) -> &str;

    async fn stream_chat(&self, request: &ChatRequest) -> anyhow::Result<ChatStream>;
}

// Blanket implementation for Arc<dyn ChatModel> to make it easier to work with
#[async_trait]
impl ChatModel for Arc<dyn ChatModel + Send + Sync> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn stream_chat(&self, request: &ChatRequest) -> anyhow::Result<ChatStream> {
        (**self).stream_chat(request).await
    }
}
