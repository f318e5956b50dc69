pub mod auth;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod ranking;
pub mod store;
pub mod stores;
pub mod traits;

pub use auth::{authenticate, authorize_admin, login, AdminPolicy};
pub use chunking::{split_into_chunks, ChunkingConfig};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{BackendError, RagError};
pub use extractor::{extract_text, DocumentFormat};
pub use ingest::{Compensation, IngestionService, Saga};
pub use models::{
    AuthenticatedUser, ChatAnswer, CompletionRequest, DeleteReceipt, Document, IngestionOptions,
    LoginSession, NewChunk, NewDocument, QueryOptions, RankedChunk, Source, StoredChunk,
    UploadReceipt,
};
pub use orchestrator::{build_prompt, AnswerCoordinator, SYSTEM_INSTRUCTION};
pub use ranking::{cosine_similarity, rank_by_similarity};
pub use store::SupabaseConfig;
pub use stores::{
    InMemoryIdentityProvider, InMemoryObjectStore, InMemoryRepository, OpenAiClient, OpenAiConfig,
    SupabaseAuth, SupabaseRestStore, SupabaseStorage,
};
pub use traits::{CompletionModel, DocumentRepository, IdentityProvider, ObjectStore};
