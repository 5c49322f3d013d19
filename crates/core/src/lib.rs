pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod llm;
pub mod meta;
pub mod models;
pub mod pipeline;
pub mod storage;

pub use chunking::{chunk_text, ChunkPolicy};
pub use embeddings::{Embedder, HashEmbedder, HttpEmbedder};
pub use error::{ErrorClass, PipelineError};
pub use extractor::{preview_text, LopdfExtractor, PdfExtractor};
pub use index::{QdrantStore, VectorIndex};
pub use llm::{ChatModel, HttpChatModel};
pub use meta::MetaDb;
pub use models::{
    Answer, ChunkPreview, ChunkRecord, EmbeddingReport, ExtractionReport, FileRecord, ScoredChunk,
};
pub use pipeline::{compose_prompt, Pipeline, TOP_K};
pub use storage::FileStorage;
