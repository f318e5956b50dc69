use crate::embeddings::Embedder;
use crate::error::RagError;
use crate::models::{ChatAnswer, CompletionRequest, QueryOptions, RankedChunk, Source};
use crate::ranking::rank_by_similarity;
use crate::traits::{CompletionModel, DocumentRepository};
use tracing::{debug, warn};

pub const SYSTEM_INSTRUCTION: &str = "You are an assistant that gives accurate, helpful answers \
to questions, drawing on the context provided.";

const UNKNOWN_FILENAME: &str = "unknown";

pub struct AnswerCoordinator<R, E, C>
where
    R: DocumentRepository,
    E: Embedder,
    C: CompletionModel,
{
    repository: R,
    embedder: E,
    completion: C,
    options: QueryOptions,
}

impl<R, E, C> AnswerCoordinator<R, E, C>
where
    R: DocumentRepository,
    E: Embedder,
    C: CompletionModel,
{
    pub fn new(repository: R, embedder: E, completion: C) -> Self {
        Self::with_options(repository, embedder, completion, QueryOptions::default())
    }

    pub fn with_options(repository: R, embedder: E, completion: C, options: QueryOptions) -> Self {
        Self {
            repository,
            embedder,
            completion,
            options,
        }
    }

    pub async fn ask(&self, question: &str) -> Result<ChatAnswer, RagError> {
        if question.trim().is_empty() {
            return Err(RagError::Validation("question is empty".to_string()));
        }

        let query_vector = self
            .embedder
            .embed(question)
            .await
            .map_err(|error| RagError::Embedding(error.to_string()))?;

        let corpus = self
            .repository
            .load_corpus()
            .await
            .map_err(|error| RagError::Query(format!("failed to load chunks: {error}")))?;
        let corpus_size = corpus.len();

        let ranked = rank_by_similarity(&query_vector, corpus, self.options.top_k)?;
        debug!(
            corpus_size,
            selected = ranked.len(),
            best = ranked[0].similarity,
            "ranked corpus"
        );

        let request = CompletionRequest {
            system: SYSTEM_INSTRUCTION.to_string(),
            user: build_prompt(question, &ranked),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };
        let answer = self
            .completion
            .complete(&request)
            .await
            .map_err(|error| RagError::Query(format!("completion failed: {error}")))?;

        let mut sources = Vec::with_capacity(ranked.len());
        for hit in &ranked {
            sources.push(Source {
                file_id: hit.chunk.file_id.clone(),
                filename: self.resolve_filename(hit).await,
                chunk_id: hit.chunk.id.clone(),
                content: preview(&hit.chunk.content, self.options.preview_chars),
            });
        }

        Ok(ChatAnswer { answer, sources })
    }

    async fn resolve_filename(&self, hit: &RankedChunk) -> String {
        if let Some(filename) = hit.chunk.filename.as_ref().filter(|name| !name.is_empty()) {
            return filename.clone();
        }

        match self.repository.filename_for(&hit.chunk.file_id).await {
            Ok(Some(filename)) => filename,
            Ok(None) => UNKNOWN_FILENAME.to_string(),
            Err(error) => {
                warn!(file_id = %hit.chunk.file_id, %error, "filename lookup failed");
                UNKNOWN_FILENAME.to_string()
            }
        }
    }
}

/// Numbered context blocks in ranked order, followed by the literal question.
pub fn build_prompt(question: &str, ranked: &[RankedChunk]) -> String {
    let context = ranked
        .iter()
        .enumerate()
        .map(|(index, hit)| format!("[Chunk {}]\n{}", index + 1, hit.chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Answer the question using the context below.\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}

pub fn preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}
