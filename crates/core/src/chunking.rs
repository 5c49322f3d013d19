use crate::error::{PipelineError, Result};

/// Window size and stride for splitting extracted text.
///
/// Two policies exist on purpose: the preview endpoint shows a caller
/// what chunking would look like, while embedding uses a larger window
/// tuned for retrieval granularity. They must not be unified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl ChunkPolicy {
    /// Policy used when embedding chunks for retrieval.
    pub const EMBED: ChunkPolicy = ChunkPolicy {
        chunk_size: 700,
        overlap: 100,
    };

    /// Policy used by the read-only chunk preview.
    pub const PREVIEW: ChunkPolicy = ChunkPolicy {
        chunk_size: 500,
        overlap: 50,
    };

    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let policy = Self {
            chunk_size,
            overlap,
        };
        policy.validate()?;
        Ok(policy)
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size <= self.overlap {
            return Err(PipelineError::InvalidInput(format!(
                "chunk_size {} must be greater than overlap {}",
                self.chunk_size, self.overlap
            )));
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Splits `text` into overlapping windows of `policy.chunk_size` scalar
/// values, each window starting `chunk_size - overlap` after the last.
/// The final window may be shorter. Deterministic for fixed inputs.
pub fn chunk_text(text: &str, policy: ChunkPolicy) -> Result<Vec<String>> {
    policy.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + policy.chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        start += policy.stride();
    }

    Ok(chunks)
}
