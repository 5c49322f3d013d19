use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

/// Boundary to the embedding collaborator. Chunks and questions must
/// go through the same implementation so they share one vector space.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| PipelineError::collaborator("embedding", "empty response"))
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct HttpEmbedder {
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
    client: Client,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        dimensions: usize,
    ) -> Result<Self> {
        let endpoint = Url::parse(base_url)?.join("v1/embeddings")?;
        Ok(Self {
            endpoint,
            model: model.into(),
            api_key,
            dimensions,
            client: Client::new(),
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(self.endpoint.clone()).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(PipelineError::collaborator(
                "embedding",
                format!("endpoint returned {}", response.status()),
            ));
        }

        let payload: EmbeddingResponse = response.json().await?;

        if payload.data.len() != texts.len() {
            return Err(PipelineError::collaborator(
                "embedding",
                format!(
                    "requested {} embeddings, received {}",
                    texts.len(),
                    payload.data.len()
                ),
            ));
        }

        let vectors: Vec<Vec<f32>> = payload.data.into_iter().map(|item| item.embedding).collect();

        if let Some(mismatch) = vectors.iter().find(|vector| vector.len() != self.dimensions) {
            return Err(PipelineError::collaborator(
                "embedding",
                format!(
                    "expected dimension {}, received {}",
                    self.dimensions,
                    mismatch.len()
                ),
            ));
        }

        Ok(vectors)
    }
}

/// Deterministic local embedder hashing character trigrams into a
/// normalized bag-of-buckets vector. Useful offline and as a test
/// double; not a substitute for a learned model.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    pub dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dimensions: 256 }
    }
}

fn fnv1a(token: &str) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = texts
            .iter()
            .map(|text| {
                let mut vector = vec![0f32; self.dimensions.max(1)];
                let chars: Vec<char> = text.to_lowercase().chars().collect();

                for window in chars.windows(3) {
                    let token: String = window.iter().collect();
                    let bucket = (fnv1a(&token) % vector.len() as u64) as usize;
                    vector[bucket] += 1.0;
                }

                let magnitude = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
                if magnitude > 0.0 {
                    for value in &mut vector {
                        *value /= magnitude;
                    }
                }

                vector
            })
            .collect();

        Ok(vectors)
    }
}
