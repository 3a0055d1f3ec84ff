use crate::ChatModel;
use crate::client::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::sync::Arc;

use super::chat::DeepSeekChatModel;

/// Factory for DeepSeek chat models (OpenAI-compatible wire format).
#[derive(Clone)]
pub struct DeepSeekProvider {
    client: Client,
    base_url: String,
}

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

impl DeepSeekProvider {
    pub fn default(api_key: &str) -> anyhow::Result<Self> {
        Self::new(DEFAULT_BASE_URL, api_key)
    }

    /// Create a provider with a custom base URL (e.g., for proxying).
    pub fn new(base_url: &str, api_key: &str) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| anyhow::anyhow!("API key contains invalid header characters"))?,
        );

        Ok(DeepSeekProvider {
            client: Client::with_headers(headers),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn create_chat_model(&self, model_name: &str) -> Arc<dyn ChatModel + Send + Sync> {
        Arc::new(DeepSeekChatModel::new(
            self.client.clone(),
            self.base_url.clone(),
            model_name.to_string(),
        ))
    }
}
