//! Ollama-compatible HTTP client

use super::backend::{ChunkCallback, GenerateRequest, ModelBackend};
use super::error::BackendError;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    raw: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    options: &'a Map<String, Value>,
}

/// One object of the `/api/generate` response (the whole body when not streaming,
/// one NDJSON line when streaming).
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for an Ollama-compatible model server
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - Server root, e.g. "http://localhost:11434"
    /// * `timeout` - Upper bound for a single HTTP request
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check_status(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            message,
        })
    }

    fn apply_chunk(
        chunk: GenerateChunk,
        text: &mut String,
        on_chunk: Option<&ChunkCallback>,
    ) -> Result<bool, BackendError> {
        if let Some(error) = chunk.error {
            // Partial output means the stream broke; otherwise the server refused.
            return Err(if text.is_empty() {
                BackendError::InvalidResponse(error)
            } else {
                BackendError::Interrupted(error)
            });
        }
        if !chunk.response.is_empty() {
            if let Some(callback) = on_chunk {
                callback(&chunk.response);
            }
            text.push_str(&chunk.response);
        }
        Ok(chunk.done)
    }

    async fn read_stream(
        mut response: Response,
        on_chunk: Option<&ChunkCallback>,
    ) -> Result<String, BackendError> {
        let mut text = String::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut done = false;

        while let Some(bytes) = response.chunk().await? {
            pending.extend_from_slice(&bytes);

            while let Some(newline) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                let line = line.trim_ascii();
                if line.is_empty() {
                    continue;
                }
                let chunk: GenerateChunk = serde_json::from_slice(line)
                    .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
                done = Self::apply_chunk(chunk, &mut text, on_chunk)?;
            }
        }

        let tail = pending.trim_ascii();
        if !tail.is_empty() {
            let chunk: GenerateChunk = serde_json::from_slice(tail)
                .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
            done = Self::apply_chunk(chunk, &mut text, on_chunk)?;
        }

        if !done {
            return Err(BackendError::Interrupted(
                "stream ended before the final chunk".to_string(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl ModelBackend for OllamaClient {
    async fn generate(
        &self,
        request: &GenerateRequest,
        on_chunk: Option<&ChunkCallback>,
    ) -> Result<String, BackendError> {
        let body = OllamaGenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            stream: on_chunk.is_some(),
            raw: request.raw,
            system: request.system.as_deref(),
            options: &request.options,
        };

        log::debug!(
            "POST {}/api/generate model={} stream={}",
            self.base_url,
            request.model,
            body.stream
        );

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        if on_chunk.is_some() {
            return Self::read_stream(response, on_chunk).await;
        }

        let chunk: GenerateChunk = response.json().await?;
        let mut text = String::new();
        Self::apply_chunk(chunk, &mut text, None)?;
        Ok(text)
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}
