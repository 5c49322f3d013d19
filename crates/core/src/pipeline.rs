use crate::chunking::{chunk_text, ChunkPolicy};
use crate::embeddings::Embedder;
use crate::error::{PipelineError, Result};
use crate::extractor::{preview_text, PdfExtractor};
use crate::index::VectorIndex;
use crate::llm::ChatModel;
use crate::meta::MetaDb;
use crate::models::{
    Answer, ChunkPreview, ChunkRecord, EmbeddingReport, ExtractionReport, FileRecord,
};
use crate::storage::FileStorage;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Number of chunks retrieved per question.
pub const TOP_K: usize = 3;

/// Number of chunks included in a chunk-preview response.
const PREVIEW_SAMPLE: usize = 5;

/// Drives one file through upload, extraction, embedding, and querying,
/// gating each stage on the previous one. Collaborators are injected so
/// every seam can be replaced with a test double.
pub struct Pipeline<X, E, V, C>
where
    X: PdfExtractor,
    E: Embedder,
    V: VectorIndex,
    C: ChatModel,
{
    extractor: X,
    embedder: E,
    index: V,
    chat: C,
    meta: MetaDb,
    storage: FileStorage,
    embed_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<X, E, V, C> Pipeline<X, E, V, C>
where
    X: PdfExtractor,
    E: Embedder,
    V: VectorIndex,
    C: ChatModel,
{
    pub fn new(extractor: X, embedder: E, index: V, chat: C, meta: MetaDb, storage: FileStorage) -> Self {
        Self {
            extractor,
            embedder,
            index,
            chat,
            meta,
            storage,
            embed_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Registers an uploaded document. Rejects empty uploads before any
    /// record exists; a previously seen `file_name` resolves to the
    /// existing record instead of creating a duplicate.
    pub async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<FileRecord> {
        if bytes.is_empty() {
            return Err(PipelineError::InvalidInput(
                "uploaded file is empty".to_string(),
            ));
        }
        if file_name.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "uploaded file has no name".to_string(),
            ));
        }

        if let Some(existing) = self.meta.get_file_by_name(file_name).await? {
            info!(file_id = %existing.file_id, file_name, "upload deduplicated by name");
            return Ok(existing);
        }

        // Rejects corrupt or encrypted documents before anything persists.
        let num_pages = self.extractor.page_count(bytes)?;

        let checksum = digest_bytes(bytes);
        let record = FileRecord::new(
            file_name.to_string(),
            bytes.len() as i64,
            num_pages as i64,
            checksum,
        );

        self.storage.save_upload(&record.file_id, bytes).await?;
        self.meta.insert_file(&record).await?;

        info!(file_id = %record.file_id, file_name, num_pages, "file uploaded");
        Ok(record)
    }

    pub async fn list_files(&self) -> Result<Vec<FileRecord>> {
        self.meta.list_files().await
    }

    /// Extracts the full text and persists it, overwriting any earlier
    /// extraction for the file. Safe to re-run.
    pub async fn extract(&self, file_id: &str) -> Result<ExtractionReport> {
        self.require_record(file_id).await?;

        let bytes = self.storage.read_upload(file_id).await?;
        let text = self.extractor.extract_text(&bytes)?;

        self.storage.save_extracted_text(file_id, &text).await?;

        let text_length = text.chars().count();
        info!(file_id, text_length, "text extracted");
        Ok(ExtractionReport {
            file_id: file_id.to_string(),
            text_length,
            preview_text: preview_text(&text),
        })
    }

    /// Read-only view of how a policy would split the extracted text.
    /// Returns the count plus a small sample, never the full chunk set.
    pub async fn preview_chunks(&self, file_id: &str, policy: ChunkPolicy) -> Result<ChunkPreview> {
        let text = self.storage.read_extracted_text(file_id).await?;
        let chunks = chunk_text(&text, policy)?;

        Ok(ChunkPreview {
            file_id: file_id.to_string(),
            total_chunks: chunks.len(),
            chunk_size: policy.chunk_size,
            overlap: policy.overlap,
            chunks: chunks.into_iter().take(PREVIEW_SAMPLE).collect(),
        })
    }

    /// Embeds every chunk of the file and stores the batch in the
    /// vector index. Serialized per `file_id`; different files embed in
    /// parallel. The file's previous vector group is deleted before the
    /// new batch is written so a shorter re-chunking cannot leave
    /// orphaned high-index entries behind.
    pub async fn embed_file(&self, file_id: &str) -> Result<EmbeddingReport> {
        let lock = self.lock_for(file_id).await;
        let _guard = lock.lock().await;

        self.require_record(file_id).await?;
        let text = self.storage.read_extracted_text(file_id).await?;

        let chunks = chunk_text(&text, ChunkPolicy::EMBED)?;
        let vectors = self.embedder.embed(&chunks).await?;

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(chunk_id, (text, vector))| ChunkRecord {
                file_id: file_id.to_string(),
                chunk_id,
                text,
                vector,
            })
            .collect();

        self.index.delete_file(file_id).await?;
        self.index.upsert_chunks(&records).await?;
        self.meta.mark_embedded(file_id).await?;

        // The vector index is now the durable representation; the
        // extracted text is reclaimable. Cleanup failure is logged and
        // never fails the embedding.
        if let Err(error) = self.storage.delete_extracted_text(file_id).await {
            warn!(file_id, %error, "could not remove extracted text after embedding");
        }

        info!(file_id, total_chunks = records.len(), "file embedded");
        Ok(EmbeddingReport {
            file_id: file_id.to_string(),
            total_chunks: records.len(),
        })
    }

    /// Removes the file's vector group, stored artifacts, and metadata
    /// record. Idempotent: deleting an unknown file is a no-op.
    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.index.delete_file(file_id).await?;
        self.storage.delete_extracted_text(file_id).await?;
        self.storage.delete_upload(file_id).await?;
        self.meta.delete_file(file_id).await?;

        // The lock map would otherwise retain one entry per file_id
        // ever embedded for the life of the process.
        self.embed_locks.lock().await.remove(file_id);

        info!(file_id, "file and embeddings deleted");
        Ok(())
    }

    /// Answers a question from the file's embedded chunks. Fails with
    /// `NoEmbeddings` for a file that was uploaded but never embedded.
    pub async fn answer(&self, question: &str, file_id: &str) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(PipelineError::InvalidInput("question is empty".to_string()));
        }

        let record = self.require_record(file_id).await?;
        if !record.embedding_status {
            return Err(PipelineError::NoEmbeddings(file_id.to_string()));
        }

        let question_vector = self.embedder.embed_one(question).await?;
        let hits = self.index.search(&question_vector, file_id, TOP_K).await?;

        if hits.is_empty() {
            return Err(PipelineError::NoEmbeddings(file_id.to_string()));
        }

        // Context keeps the similarity-search order; no re-ranking.
        let context = hits
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = compose_prompt(&context, question);
        let answer = self.chat.complete(&prompt).await?;

        Ok(Answer {
            answer,
            sources: hits,
        })
    }

    async fn require_record(&self, file_id: &str) -> Result<FileRecord> {
        self.meta
            .get_file(file_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("file not found: {file_id}")))
    }

    async fn lock_for(&self, file_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.embed_locks.lock().await;
        locks
            .entry(file_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Prompt instructing the model to answer strictly from the retrieved
/// context, admit when the context does not contain the answer, and
/// stay within a few lines.
pub fn compose_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an expert assistant answering user questions strictly from the provided context.\n\
         \n\
         Rules:\n\
         1. Use ONLY the information present in the context.\n\
         2. Do NOT add assumptions, external knowledge, or invented details.\n\
         3. If the answer is not found in the context, reply with:\n\
         \"The information you requested is not available in the document.\"\n\
         4. Keep the answer concise (4-5 lines), clear, and user-friendly.\n\
         5. Maintain accuracy and avoid repetition.\n\
         \n\
         -----------------------------\n\
         CONTEXT:\n\
         {context}\n\
         -----------------------------\n\
         \n\
         USER QUESTION:\n\
         {question}\n\
         \n\
         Now provide the best possible answer based only on the context.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::{compose_prompt, Pipeline, TOP_K};
    use crate::chunking::ChunkPolicy;
    use crate::embeddings::{Embedder, HashEmbedder};
    use crate::error::{PipelineError, Result};
    use crate::extractor::PdfExtractor;
    use crate::index::VectorIndex;
    use crate::llm::ChatModel;
    use crate::meta::MetaDb;
    use crate::models::{ChunkRecord, ScoredChunk};
    use crate::storage::FileStorage;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Extractor double whose text can be swapped between extractions.
    struct FakeExtractor {
        text: Mutex<String>,
    }

    impl FakeExtractor {
        fn with_text(text: &str) -> Self {
            Self {
                text: Mutex::new(text.to_string()),
            }
        }

        fn set_text(&self, text: &str) {
            *self.text.lock().unwrap() = text.to_string();
        }
    }

    impl PdfExtractor for FakeExtractor {
        fn page_count(&self, _bytes: &[u8]) -> Result<usize> {
            Ok(2)
        }

        fn extract_text(&self, _bytes: &[u8]) -> Result<String> {
            Ok(self.text.lock().unwrap().clone())
        }
    }

    /// In-memory vector index recording the order of write operations.
    #[derive(Default)]
    struct FakeIndex {
        points: Mutex<HashMap<String, ChunkRecord>>,
        operations: Mutex<Vec<String>>,
    }

    impl FakeIndex {
        fn stored_for(&self, file_id: &str) -> Vec<ChunkRecord> {
            let mut chunks: Vec<ChunkRecord> = self
                .points
                .lock()
                .unwrap()
                .values()
                .filter(|record| record.file_id == file_id)
                .cloned()
                .collect();
            chunks.sort_by_key(|record| record.chunk_id);
            chunks
        }

        fn operations(&self) -> Vec<String> {
            self.operations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VectorIndex for FakeIndex {
        async fn ensure_collection(&self, _dimensions: usize) -> Result<()> {
            Ok(())
        }

        async fn upsert_chunks(&self, chunks: &[ChunkRecord]) -> Result<()> {
            self.operations.lock().unwrap().push("upsert".to_string());
            let mut points = self.points.lock().unwrap();
            for chunk in chunks {
                points.insert(chunk.logical_id(), chunk.clone());
            }
            Ok(())
        }

        async fn delete_file(&self, file_id: &str) -> Result<()> {
            self.operations
                .lock()
                .unwrap()
                .push(format!("delete {file_id}"));
            self.points
                .lock()
                .unwrap()
                .retain(|_, record| record.file_id != file_id);
            Ok(())
        }

        async fn search(
            &self,
            vector: &[f32],
            file_id: &str,
            top_k: usize,
        ) -> Result<Vec<ScoredChunk>> {
            let mut hits: Vec<ScoredChunk> = self
                .stored_for(file_id)
                .into_iter()
                .map(|record| {
                    let score = record
                        .vector
                        .iter()
                        .zip(vector)
                        .map(|(a, b)| f64::from(a * b))
                        .sum();
                    ScoredChunk {
                        file_id: record.file_id,
                        chunk_id: record.chunk_id,
                        text: record.text,
                        score,
                    }
                })
                .collect();
            hits.sort_by(|left, right| right.score.total_cmp(&left.score));
            hits.truncate(top_k);
            Ok(hits)
        }
    }

    struct FakeChat;

    #[async_trait]
    impl ChatModel for FakeChat {
        async fn complete(&self, prompt: &str) -> Result<String> {
            assert!(prompt.contains("CONTEXT:"));
            Ok("The sump holds 4.5 litres of oil.".to_string())
        }
    }

    /// Embedder that always fails, for abandoned-embed tests.
    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn dimensions(&self) -> usize {
            256
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(PipelineError::collaborator("embedding", "unreachable"))
        }
    }

    async fn pipeline_with(
        extractor: FakeExtractor,
        dir: &tempfile::TempDir,
    ) -> Pipeline<FakeExtractor, HashEmbedder, FakeIndex, FakeChat> {
        let meta = MetaDb::connect_in_memory().await.expect("meta");
        meta.init_schema().await.expect("schema");
        let storage = FileStorage::new(dir.path()).await.expect("storage");
        Pipeline::new(
            extractor,
            HashEmbedder::default(),
            FakeIndex::default(),
            FakeChat,
            meta,
            storage,
        )
    }

    fn long_text(sentences: usize) -> String {
        "The oil sump of the auxiliary pump holds four and a half litres. "
            .repeat(sentences)
    }

    #[tokio::test]
    async fn upload_extract_embed_query_happy_path() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline_with(FakeExtractor::with_text(&long_text(40)), &dir).await;

        let record = pipeline.upload("manual.pdf", b"%PDF-bytes").await.unwrap();
        assert_eq!(record.num_pages, 2);
        assert!(!record.embedding_status);

        let extraction = pipeline.extract(&record.file_id).await.unwrap();
        assert!(extraction.text_length > 0);
        assert!(!extraction.preview_text.is_empty());

        let report = pipeline.embed_file(&record.file_id).await.unwrap();
        assert!(report.total_chunks > 0);

        let updated = pipeline.list_files().await.unwrap();
        assert!(updated[0].embedding_status);

        let answer = pipeline
            .answer("How much oil does the sump hold?", &record.file_id)
            .await
            .unwrap();
        assert!(!answer.answer.is_empty());
        assert!(answer.sources.len() <= TOP_K);
        assert!(answer
            .sources
            .iter()
            .all(|source| source.file_id == record.file_id));
    }

    #[tokio::test]
    async fn empty_upload_is_rejected_before_any_record() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline_with(FakeExtractor::with_text("x"), &dir).await;

        let result = pipeline.upload("empty.pdf", b"").await;
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
        assert!(pipeline.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_upload_by_name_returns_the_existing_record() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline_with(FakeExtractor::with_text("x"), &dir).await;

        let first = pipeline.upload("manual.pdf", b"aaa").await.unwrap();
        let second = pipeline.upload("manual.pdf", b"bbb").await.unwrap();

        assert_eq!(first.file_id, second.file_id);
        assert_eq!(pipeline.list_files().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn querying_before_embedding_reports_no_embeddings() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline_with(FakeExtractor::with_text(&long_text(10)), &dir).await;

        let record = pipeline.upload("manual.pdf", b"pdf").await.unwrap();
        pipeline.extract(&record.file_id).await.unwrap();

        let result = pipeline.answer("anything?", &record.file_id).await;
        assert!(matches!(result, Err(PipelineError::NoEmbeddings(_))));
    }

    #[tokio::test]
    async fn embedding_requires_extracted_text() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline_with(FakeExtractor::with_text("x"), &dir).await;

        let record = pipeline.upload("manual.pdf", b"pdf").await.unwrap();
        let result = pipeline.embed_file(&record.file_id).await;
        assert!(matches!(result, Err(PipelineError::NotFound(_))));
    }

    #[tokio::test]
    async fn deleting_a_file_removes_every_artifact() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline_with(FakeExtractor::with_text(&long_text(40)), &dir).await;

        let record = pipeline.upload("manual.pdf", b"pdf").await.unwrap();
        pipeline.extract(&record.file_id).await.unwrap();
        pipeline.embed_file(&record.file_id).await.unwrap();

        pipeline.delete_file(&record.file_id).await.unwrap();

        assert!(pipeline.index.stored_for(&record.file_id).is_empty());
        let result = pipeline.answer("anything?", &record.file_id).await;
        assert!(matches!(result, Err(PipelineError::NotFound(_))));

        // Deleting again is a no-op.
        pipeline.delete_file(&record.file_id).await.unwrap();
    }

    #[tokio::test]
    async fn reembedding_shorter_text_leaves_no_orphaned_chunks() {
        let dir = tempdir().unwrap();
        let extractor = FakeExtractor::with_text(&long_text(60));
        let pipeline = pipeline_with(extractor, &dir).await;

        let record = pipeline.upload("manual.pdf", b"pdf").await.unwrap();
        pipeline.extract(&record.file_id).await.unwrap();
        let first = pipeline.embed_file(&record.file_id).await.unwrap();
        assert!(first.total_chunks > 1);

        pipeline.extractor.set_text("A much shorter document.");
        pipeline.extract(&record.file_id).await.unwrap();
        let second = pipeline.embed_file(&record.file_id).await.unwrap();
        assert_eq!(second.total_chunks, 1);

        let stored = pipeline.index.stored_for(&record.file_id);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].chunk_id, 0);

        // The old group is dropped before the new batch is written.
        let operations = pipeline.index.operations();
        let expected = format!("delete {}", record.file_id);
        assert_eq!(
            operations,
            vec![expected.clone(), "upsert".into(), expected, "upsert".into()]
        );
    }

    #[tokio::test]
    async fn failed_embedding_leaves_the_status_unflipped() {
        let dir = tempdir().unwrap();
        let meta = MetaDb::connect_in_memory().await.expect("meta");
        meta.init_schema().await.expect("schema");
        let storage = FileStorage::new(dir.path()).await.expect("storage");
        let pipeline = Pipeline::new(
            FakeExtractor::with_text(&long_text(10)),
            FailingEmbedder,
            FakeIndex::default(),
            FakeChat,
            meta,
            storage,
        );

        let record = pipeline.upload("manual.pdf", b"pdf").await.unwrap();
        pipeline.extract(&record.file_id).await.unwrap();

        let result = pipeline.embed_file(&record.file_id).await;
        assert!(matches!(result, Err(PipelineError::Collaborator { .. })));

        let records = pipeline.list_files().await.unwrap();
        assert!(!records[0].embedding_status);
    }

    #[tokio::test]
    async fn deleting_a_file_releases_its_embed_lock() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline_with(FakeExtractor::with_text(&long_text(20)), &dir).await;

        let record = pipeline.upload("manual.pdf", b"pdf").await.unwrap();
        pipeline.extract(&record.file_id).await.unwrap();
        pipeline.embed_file(&record.file_id).await.unwrap();
        assert!(pipeline
            .embed_locks
            .lock()
            .await
            .contains_key(&record.file_id));

        pipeline.delete_file(&record.file_id).await.unwrap();
        assert!(pipeline.embed_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn extraction_report_counts_characters_not_bytes() {
        let dir = tempdir().unwrap();
        let text = "Ölstand prüfen: 4,5 l";
        let pipeline = pipeline_with(FakeExtractor::with_text(text), &dir).await;

        let record = pipeline.upload("manual.pdf", b"pdf").await.unwrap();
        let report = pipeline.extract(&record.file_id).await.unwrap();

        assert_eq!(report.text_length, text.chars().count());
        assert!(report.text_length < text.len());
    }

    #[tokio::test]
    async fn extracted_text_is_reclaimed_after_embedding() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline_with(FakeExtractor::with_text(&long_text(20)), &dir).await;

        let record = pipeline.upload("manual.pdf", b"pdf").await.unwrap();
        pipeline.extract(&record.file_id).await.unwrap();
        pipeline.embed_file(&record.file_id).await.unwrap();

        let result = pipeline
            .preview_chunks(&record.file_id, ChunkPolicy::PREVIEW)
            .await;
        assert!(matches!(result, Err(PipelineError::NotFound(_))));
    }

    #[tokio::test]
    async fn chunk_preview_reports_totals_and_a_sample() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline_with(FakeExtractor::with_text(&long_text(100)), &dir).await;

        let record = pipeline.upload("manual.pdf", b"pdf").await.unwrap();
        pipeline.extract(&record.file_id).await.unwrap();

        let preview = pipeline
            .preview_chunks(&record.file_id, ChunkPolicy::PREVIEW)
            .await
            .unwrap();
        assert!(preview.total_chunks > 5);
        assert_eq!(preview.chunks.len(), 5);
        assert_eq!(preview.chunk_size, 500);
        assert_eq!(preview.overlap, 50);
    }

    #[test]
    fn prompt_embeds_context_question_and_refusal_rule() {
        let prompt = compose_prompt("some context", "what is it?");
        assert!(prompt.contains("some context"));
        assert!(prompt.contains("what is it?"));
        assert!(prompt.contains("not available in the document"));
    }
}
