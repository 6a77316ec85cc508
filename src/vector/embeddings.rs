// src/vector/embeddings.rs
// Embedding model as a capability: a trait object so the rest of the
// crate never depends on a specific provider, plus a zero-vector default
// that lets every other feature work with embeddings disabled.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_DIMENSIONS: usize = 384;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn encode_text(&self, text: &str) -> Vec<f32>;

    async fn encode_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.encode_text(text).await);
        }
        out
    }
}

/// Zero vectors for every input. Downstream similarity queries treat an
/// all-zero embedding as "no match", so this is a safe default when no
/// embedding backend is configured.
pub struct NullEmbeddingProvider {
    dimensions: usize,
}

impl NullEmbeddingProvider {
    pub fn new() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
        }
    }
}

impl Default for NullEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for NullEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn encode_text(&self, _text: &str) -> Vec<f32> {
        vec![0.0; self.dimensions]
    }
}

/// Embeds text via a configurable HTTP embeddings endpoint (OpenAI-shaped
/// `{model, input}` request, `{data: [{embedding}]}` response), for a
/// server operator who has an embeddings API but no in-process model.
pub struct HttpEmbeddingProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: String, api_key: String, model: String, dimensions: usize) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url,
            api_key,
            model,
            dimensions,
        }
    }

    async fn embed_one(&self, text: &str) -> Option<Vec<f32>> {
        self.embed_many(std::slice::from_ref(&text.to_string()))
            .await
            .and_then(|mut v| v.pop())
    }

    async fn embed_many(&self, texts: &[String]) -> Option<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            tracing::warn!("embedding request failed with status {}", response.status());
            return None;
        }

        let raw: serde_json::Value = response.json().await.ok()?;
        let data = raw.get("data")?.as_array()?;

        Some(
            data.iter()
                .filter_map(|item| {
                    item.get("embedding")?.as_array().map(|arr| {
                        arr.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect()
                    })
                })
                .collect(),
        )
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn encode_text(&self, text: &str) -> Vec<f32> {
        if text.is_empty() {
            return vec![0.0; self.dimensions];
        }
        self.embed_one(text).await.unwrap_or_else(|| vec![0.0; self.dimensions])
    }

    async fn encode_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        if texts.is_empty() {
            return Vec::new();
        }
        self.embed_many(texts)
            .await
            .unwrap_or_else(|| texts.iter().map(|_| vec![0.0; self.dimensions]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_provider_returns_fixed_dimension_zero_vector() {
        let provider = NullEmbeddingProvider::new();
        let v = provider.encode_text("anything").await;
        assert_eq!(v.len(), DEFAULT_DIMENSIONS);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn null_provider_batch_preserves_input_count() {
        let provider = NullEmbeddingProvider::new();
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let vectors = provider.encode_batch(&texts).await;
        assert_eq!(vectors.len(), 3);
    }
}
