use crate::error::{PipelineError, Result};
use crate::models::{ChunkRecord, ScoredChunk};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;

/// Boundary to the vector index collaborator: upsert by id, delete the
/// whole per-file group, cosine similarity search scoped to one file.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn ensure_collection(&self, dimensions: usize) -> Result<()>;

    async fn upsert_chunks(&self, chunks: &[ChunkRecord]) -> Result<()>;

    /// Removes every entry whose payload `file_id` matches. A file with
    /// no entries is a no-op, not an error.
    async fn delete_file(&self, file_id: &str) -> Result<()>;

    async fn search(
        &self,
        vector: &[f32],
        file_id: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>>;
}

/// Qdrant only accepts UUID or unsigned-integer point ids, so the
/// deterministic logical id `{file_id}_chunk_{i}` maps through UUID v5.
/// Upsert-by-id replacement semantics are unchanged.
pub fn point_id(logical_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, logical_id.as_bytes()).to_string()
}

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.endpoint, self.collection, suffix)
    }

    fn file_filter(file_id: &str) -> Value {
        json!({
            "must": [
                {"key": "file_id", "match": {"value": file_id}}
            ]
        })
    }
}

fn backend_error(details: impl Into<String>) -> PipelineError {
    PipelineError::collaborator("vector index", details.into())
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        if dimensions != self.vector_size {
            return Err(backend_error(format!(
                "configured vector size {} does not match requested {}",
                self.vector_size, dimensions
            )));
        }

        let existing = self
            .client
            .get(self.collection_url(""))
            .send()
            .await?;

        if existing.status().is_success() {
            return Ok(());
        }

        // Cosine is a collection-level setting; queries cannot override it.
        let response = self
            .client
            .put(self.collection_url(""))
            .json(&json!({
                "vectors": {"size": dimensions, "distance": "Cosine"}
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(format!(
                "collection create returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn upsert_chunks(&self, chunks: &[ChunkRecord]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let points = chunks
            .iter()
            .map(|chunk| {
                if chunk.vector.len() != self.vector_size {
                    return Err(backend_error(format!(
                        "embedding dimension {} != {}",
                        chunk.vector.len(),
                        self.vector_size
                    )));
                }

                Ok(json!({
                    "id": point_id(&chunk.logical_id()),
                    "vector": chunk.vector,
                    "payload": {
                        "file_id": chunk.file_id,
                        "chunk_id": chunk.chunk_id,
                        "text": chunk.text,
                    },
                }))
            })
            .collect::<Result<Vec<_>>>()?;

        let response = self
            .client
            .put(self.collection_url("/points?wait=true"))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(format!(
                "upsert returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        let response = self
            .client
            .post(self.collection_url("/points/delete?wait=true"))
            .json(&json!({ "filter": Self::file_filter(file_id) }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(format!(
                "delete returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        file_id: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if vector.len() != self.vector_size {
            return Err(backend_error(format!(
                "query vector dim {} is not {}",
                vector.len(),
                self.vector_size
            )));
        }

        let response = self
            .client
            .post(self.collection_url("/points/search"))
            .json(&json!({
                "vector": vector,
                "limit": top_k,
                "with_payload": true,
                "filter": Self::file_filter(file_id),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(format!(
                "search returned {}",
                response.status()
            )));
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut result = Vec::new();
        for hit in hits {
            let file_id = hit
                .pointer("/payload/file_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let chunk_id = hit
                .pointer("/payload/chunk_id")
                .and_then(Value::as_u64)
                .unwrap_or_default() as usize;
            let text = hit
                .pointer("/payload/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);

            result.push(ScoredChunk {
                file_id,
                chunk_id,
                text,
                score,
            });
        }

        Ok(result)
    }
}
