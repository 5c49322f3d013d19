use pdf_chat_core::{HttpChatModel, HttpEmbedder, LopdfExtractor, Pipeline, QdrantStore};
use std::sync::Arc;

/// The pipeline with its production collaborators wired in.
pub type AppPipeline = Pipeline<LopdfExtractor, HttpEmbedder, QdrantStore, HttpChatModel>;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AppPipeline>,
}

impl AppState {
    pub fn new(pipeline: AppPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}
