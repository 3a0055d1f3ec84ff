use bytes::Bytes;
use futures::stream::Stream;
use futures::{
    StreamExt,
    stream::{self},
};
use reqwest::header::HeaderMap;
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt::Debug, pin::Pin};
use tracing::instrument;

#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
}

pub type BoxedStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

impl Client {
    pub fn default() -> Self {
        Client {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_headers(headers: HeaderMap) -> Self {
        Client {
            client: reqwest::Client::builder()
                .default_headers(headers)
                .build()
                .expect("Failed to build headers"),
        }
    }

    /// POST a JSON request and return the raw response body as a byte stream.
    ///
    /// Used for endpoints whose reply is a chunked plain-text stream rather
    /// than line-delimited JSON. Transport errors while reading the body are
    /// surfaced as `Err` items.
    #[instrument(level = "trace", skip(self, request), fields(json_request = serde_json::to_string(request).unwrap()))]
    pub async fn post_byte_stream<U, S>(
        &self,
        url: U,
        request: &S,
    ) -> anyhow::Result<BoxedStream<anyhow::Result<Bytes>>>
    where
        U: reqwest::IntoUrl + Debug,
        S: Serialize + Sized,
    {
        let response = self.client.post(url).json(request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(anyhow::anyhow!(
                "Request failed with status {}: {}",
                status,
                error_body
            ));
        }

        Ok(Box::pin(
            response.bytes_stream().map(|chunk| Ok(chunk?)),
        ))
    }

    /// POST a JSON request and parse the streamed response line by line.
    ///
    /// `process` picks the JSON payload out of each complete line (e.g.
    /// stripping an SSE `data: ` prefix) or skips it by returning `None`.
    #[instrument(level = "trace", skip(self, request, process), fields(json_request = serde_json::to_string(request).unwrap()))]
    pub async fn post_stream<U, S, F, T>(
        &self,
        url: U,
        request: &S,
        process: F,
    ) -> anyhow::Result<BoxedStream<anyhow::Result<T>>>
    where
        U: reqwest::IntoUrl + Debug,
        S: Serialize + Sized,
        T: DeserializeOwned + Send + 'static,
        F: Fn(&str) -> Option<&str> + 'static + Send,
    {
        let response = self.client.post(url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(anyhow::anyhow!(
                "Request failed with status {}: {}",
                status,
                error_body
            ));
        }

        Ok(parse_line_stream(response.bytes_stream(), process))
    }
}

/// Turn a raw byte stream into a stream of parsed values, one per complete
/// line accepted by `process`.
///
/// A scan buffer carries incomplete lines across chunk boundaries, so a JSON
/// payload split between two network reads still parses once its trailing
/// newline arrives. A transport error ends the stream with a single `Err`
/// item.
pub(crate) fn parse_line_stream<B, E, F, T>(bytes: B, process: F) -> BoxedStream<anyhow::Result<T>>
where
    B: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<&str> + 'static + Send,
    T: DeserializeOwned + Send + 'static,
{
    // Use scan to maintain state (buffer) across chunks
    let buffered_stream = bytes.scan(String::new(), move |buffer, chunk| {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                return futures::future::ready(Some(vec![Err(anyhow::Error::new(e))]));
            }
        };

        // Append new chunk data to buffer
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        // Process complete lines (ending with \n)
        let mut messages: Vec<anyhow::Result<T>> = vec![];
        let mut last_newline_pos = 0;

        for (idx, _) in buffer.match_indices('\n') {
            let line = &buffer[last_newline_pos..idx];
            last_newline_pos = idx + 1;

            if let Some(processed) = process(line) {
                if !processed.trim().is_empty() {
                    match serde_json::from_str::<T>(processed) {
                        Ok(parsed) => messages.push(Ok(parsed)),
                        Err(e) => {
                            tracing::warn!("Failed to parse line: {}: {}", processed, e);
                        }
                    }
                }
            }
        }

        // Keep incomplete line in buffer
        *buffer = buffer[last_newline_pos..].to_string();

        futures::future::ready(Some(messages))
    });

    Box::pin(buffered_stream.flat_map(stream::iter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
    struct TestEvent {
        id: u32,
        text: String,
    }

    fn data_prefix(line: &str) -> Option<&str> {
        line.strip_prefix("data: ")
    }

    async fn collect_ok(
        chunks: Vec<Result<Bytes, std::io::Error>>,
    ) -> Vec<anyhow::Result<TestEvent>> {
        parse_line_stream(stream::iter(chunks), data_prefix)
            .collect()
            .await
    }

    #[tokio::test]
    async fn parses_complete_lines() {
        let data = b"data: {\"id\":1,\"text\":\"hello\"}\ndata: {\"id\":2,\"text\":\"world\"}\n";
        let results = collect_ok(vec![Ok(Bytes::from(&data[..]))]).await;

        let events: Vec<TestEvent> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], TestEvent { id: 1, text: "hello".to_string() });
        assert_eq!(events[1], TestEvent { id: 2, text: "world".to_string() });
    }

    #[tokio::test]
    async fn parses_json_split_across_chunks() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"id\":1,\"te")),
            Ok(Bytes::from_static(b"xt\":\"hello\"}\ndata: {\"id\":2")),
            Ok(Bytes::from_static(b",\"text\":\"world\"}\n")),
        ];
        let results = collect_ok(chunks).await;

        let events: Vec<TestEvent> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].text, "hello");
        assert_eq!(events[1].text, "world");
    }

    #[tokio::test]
    async fn incomplete_final_line_is_dropped() {
        let data = b"data: {\"id\":1,\"text\":\"hello\"}\ndata: {\"id\":2,\"text\":\"incomplete";
        let results = collect_ok(vec![Ok(Bytes::from(&data[..]))]).await;

        let events: Vec<TestEvent> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, 1);
    }

    #[tokio::test]
    async fn malformed_json_is_skipped() {
        let data = b"data: {\"id\":1,\"text\":\"hello\"}\ndata: {malformed json}\ndata: {\"id\":2,\"text\":\"world\"}\n";
        let results = collect_ok(vec![Ok(Bytes::from(&data[..]))]).await;

        let events: Vec<TestEvent> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, 1);
        assert_eq!(events[1].id, 2);
    }

    #[tokio::test]
    async fn transport_error_surfaces_as_err_item() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"id\":1,\"text\":\"hello\"}\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let results = collect_ok(chunks).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[tokio::test]
    async fn single_byte_chunks_reassemble() {
        let data = b"data: {\"id\":1,\"text\":\"hello\"}\n";
        let chunks: Vec<Result<Bytes, std::io::Error>> = data
            .iter()
            .map(|&b| Ok(Bytes::from(vec![b])))
            .collect();
        let results = collect_ok(chunks).await;

        let events: Vec<TestEvent> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], TestEvent { id: 1, text: "hello".to_string() });
    }
}
