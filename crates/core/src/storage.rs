use crate::error::{PipelineError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Filesystem layout for per-file artifacts: the original upload under
/// `uploads/{file_id}.pdf` and the transient extraction under
/// `extracted/{file_id}.txt`. Extracted text is disposable once the
/// vector index holds the content.
#[derive(Debug, Clone)]
pub struct FileStorage {
    upload_dir: PathBuf,
    extract_dir: PathBuf,
}

impl FileStorage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let upload_dir = data_dir.join("uploads");
        let extract_dir = data_dir.join("extracted");
        fs::create_dir_all(&upload_dir).await?;
        fs::create_dir_all(&extract_dir).await?;
        Ok(Self {
            upload_dir,
            extract_dir,
        })
    }

    fn upload_path(&self, file_id: &str) -> PathBuf {
        self.upload_dir.join(format!("{file_id}.pdf"))
    }

    fn extract_path(&self, file_id: &str) -> PathBuf {
        self.extract_dir.join(format!("{file_id}.txt"))
    }

    pub async fn save_upload(&self, file_id: &str, bytes: &[u8]) -> Result<()> {
        fs::write(self.upload_path(file_id), bytes).await?;
        Ok(())
    }

    pub async fn read_upload(&self, file_id: &str) -> Result<Vec<u8>> {
        let path = self.upload_path(file_id);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Err(
                PipelineError::NotFound(format!("uploaded file not found: {file_id}")),
            ),
            Err(error) => Err(error.into()),
        }
    }

    /// Overwrites any prior extraction for the id; re-extraction is
    /// idempotent.
    pub async fn save_extracted_text(&self, file_id: &str, text: &str) -> Result<()> {
        fs::write(self.extract_path(file_id), text).await?;
        Ok(())
    }

    pub async fn read_extracted_text(&self, file_id: &str) -> Result<String> {
        let path = self.extract_path(file_id);
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Err(
                PipelineError::NotFound(format!("extracted text not found: {file_id}")),
            ),
            Err(error) => Err(error.into()),
        }
    }

    /// Removes the extracted text if present. Missing files are fine.
    pub async fn delete_extracted_text(&self, file_id: &str) -> Result<()> {
        remove_if_present(&self.extract_path(file_id)).await
    }

    pub async fn delete_upload(&self, file_id: &str) -> Result<()> {
        remove_if_present(&self.upload_path(file_id)).await
    }
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}
