use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata row for one uploaded document. Created at upload, the
/// `embedding_status` flag is the only field that ever changes, and
/// only a full delete removes the record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: String,
    pub file_name: String,
    pub file_size: i64,
    pub num_pages: i64,
    pub checksum: String,
    pub uploaded_at: String,
    pub embedding_status: bool,
}

impl FileRecord {
    pub fn new(file_name: String, file_size: i64, num_pages: i64, checksum: String) -> Self {
        Self {
            file_id: Uuid::new_v4().to_string(),
            file_name,
            file_size,
            num_pages,
            checksum,
            uploaded_at: Utc::now().to_rfc3339(),
            embedding_status: false,
        }
    }
}

/// Result of the extraction stage, including a bounded preview for
/// user feedback. The preview is never fed into downstream stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub file_id: String,
    pub text_length: usize,
    pub preview_text: String,
}

/// Read-only view of how a chunk policy splits a file's extracted text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPreview {
    pub file_id: String,
    pub total_chunks: usize,
    pub chunk_size: usize,
    pub overlap: usize,
    pub chunks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingReport {
    pub file_id: String,
    pub total_chunks: usize,
}

/// One chunk ready for the vector index. The logical id is derived
/// deterministically from `(file_id, chunk_id)` so re-embedding a file
/// replaces rather than duplicates surviving chunk indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub file_id: String,
    pub chunk_id: usize,
    pub text: String,
    pub vector: Vec<f32>,
}

impl ChunkRecord {
    pub fn logical_id(&self) -> String {
        format!("{}_chunk_{}", self.file_id, self.chunk_id)
    }
}

/// A chunk returned by similarity search, in search-result order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub file_id: String,
    pub chunk_id: usize,
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<ScoredChunk>,
}

#[cfg(test)]
mod tests {
    use super::{ChunkRecord, FileRecord};

    #[test]
    fn new_records_start_unembedded() {
        let record = FileRecord::new("report.pdf".into(), 1024, 2, "abc123".into());
        assert!(!record.embedding_status);
        assert!(!record.file_id.is_empty());
    }

    #[test]
    fn logical_id_is_derived_from_file_and_chunk() {
        let record = ChunkRecord {
            file_id: "f-1".into(),
            chunk_id: 4,
            text: String::new(),
            vector: Vec::new(),
        };
        assert_eq!(record.logical_id(), "f-1_chunk_4");
    }
}
