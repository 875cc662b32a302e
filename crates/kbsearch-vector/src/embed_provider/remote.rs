//! OpenAI-compatible HTTP embedding provider (`POST {model, input}` -> `data[].embedding`).

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::EmbedProvider;

pub struct HttpProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dim: usize,
    id: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl HttpProvider {
    pub fn new(url: &str, api_key: String, model: &str, dim: usize, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key,
            model: model.to_string(),
            dim,
            id: format!("remote:{model}:d{dim}"),
        })
    }
}

#[async_trait]
impl EmbedProvider for HttpProvider {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let msg = serde_json::from_slice::<ErrorBody>(&bytes)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).chars().take(200).collect());
            bail!("embedding endpoint returned {status}: {msg}");
        }

        let parsed: EmbeddingResponse =
            serde_json::from_slice(&bytes).map_err(|e| anyhow!("invalid embedding response: {e}"))?;
        if parsed.data.len() != texts.len() {
            bail!("embedding endpoint returned {} vectors for {} inputs", parsed.data.len(), texts.len());
        }
        let mut data = parsed.data;
        if data.iter().all(|d| d.index.is_some()) {
            data.sort_by_key(|d| d.index);
        }
        debug!(model = %self.model, n = data.len(), "remote embeddings");
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}
