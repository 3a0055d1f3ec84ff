use crate::api::{ChatChunk, ChatRequest, Role};
use crate::client::Client;
use crate::{ChatModel, ChatStream};
use async_trait::async_trait;
use futures::StreamExt;

use super::api::{ChatCompletionChunk, ChatCompletionRequest};

#[derive(Clone)]
pub struct DeepSeekChatModel {
    client: Client,
    base_url: String,
    model_name: String,
}

impl DeepSeekChatModel {
    pub fn new(client: Client, base_url: String, model_name: String) -> Self {
        DeepSeekChatModel {
            client,
            base_url,
            model_name,
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatModel for DeepSeekChatModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn stream_chat(&self, request: &ChatRequest) -> anyhow::Result<ChatStream> {
        let api_request =
            ChatCompletionRequest::from_request(self.model_name.clone(), request, true);

        let stream = self
            .client
            .post_stream::<_, _, _, ChatCompletionChunk>(self.chat_url(), &api_request, |m| {
                // Streaming replies use SSE with a "data: " prefix
                let trimmed = m.trim();
                let json_str = trimmed.strip_prefix("data: ")?;
                // The final message is "data: [DONE]"
                if json_str == "[DONE]" {
                    return None;
                }
                Some(json_str)
            })
            .await?;

        let chat_stream = stream.map(|chunk| {
            let chunk: ChatCompletionChunk = chunk?;
            let (role, content) = chunk
                .choices
                .first()
                .map(|choice| {
                    (
                        choice.delta.role.unwrap_or(Role::Assistant),
                        choice.delta.content.clone().unwrap_or_default(),
                    )
                })
                .unwrap_or((Role::Assistant, String::new()));

            Ok(ChatChunk::new(role, content))
        });

        Ok(Box::pin(chat_stream))
    }
}
