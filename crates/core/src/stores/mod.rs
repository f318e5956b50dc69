pub mod memory;
pub mod openai;
pub mod supabase_auth;
pub mod supabase_rest;
pub mod supabase_storage;

pub use memory::{InMemoryIdentityProvider, InMemoryObjectStore, InMemoryRepository};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use supabase_auth::SupabaseAuth;
pub use supabase_rest::SupabaseRestStore;
pub use supabase_storage::SupabaseStorage;
