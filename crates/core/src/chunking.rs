use crate::error::RagError;
use crate::models::IngestionOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
}

impl ChunkingConfig {
    pub fn new(size: usize, overlap: usize) -> Result<Self, RagError> {
        if size == 0 {
            return Err(RagError::Validation("chunk size must be positive".to_string()));
        }
        if overlap >= size {
            return Err(RagError::Validation(format!(
                "chunk overlap {overlap} must be smaller than chunk size {size}"
            )));
        }
        Ok(Self { size, overlap })
    }

    fn step(&self) -> usize {
        self.size.saturating_sub(self.overlap).max(1)
    }
}

impl TryFrom<&IngestionOptions> for ChunkingConfig {
    type Error = RagError;

    fn try_from(value: &IngestionOptions) -> Result<Self, Self::Error> {
        Self::new(value.chunk_size, value.chunk_overlap)
    }
}

/// Splits `text` into overlapping character windows. Whitespace-only windows are dropped.
pub fn split_into_chunks(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    if chars.is_empty() || config.size == 0 {
        return chunks;
    }

    let mut cursor = 0;
    while cursor < chars.len() {
        let end = (cursor + config.size).min(chars.len());
        let piece: String = chars[cursor..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        cursor = cursor.saturating_add(config.step());
    }

    chunks
}
