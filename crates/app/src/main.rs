mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use docqa_core::{
    AdminPolicy, CharacterNgramEmbedder, Embedder, OpenAiClient, OpenAiConfig, SupabaseAuth,
    SupabaseConfig, SupabaseRestStore, SupabaseStorage,
};
use server::{AppState, Backends, ServerConfig};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Args)]
struct BackendArgs {
    /// Supabase project URL
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: String,

    /// Supabase anon key, used for login and token checks
    #[arg(long, env = "SUPABASE_KEY", default_value = "", hide_env_values = true)]
    supabase_key: String,

    /// Supabase service role key, used for tables and storage
    #[arg(long, env = "SUPABASE_SERVICE_KEY", hide_env_values = true)]
    supabase_service_key: String,

    /// Storage bucket that holds raw uploads
    #[arg(long, env = "SUPABASE_BUCKET", default_value = "files")]
    bucket: String,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: String,

    /// OpenAI-compatible base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    openai_base_url: String,

    /// Which embedder produces chunk and question vectors
    #[arg(long, env = "EMBEDDER", value_enum, default_value_t = EmbedderKind::Openai)]
    embedder: EmbedderKind,

    /// Embedding model
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-ada-002")]
    embedding_model: String,

    /// Embedding width of the model
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value = "1536")]
    embedding_dimensions: usize,

    /// Chat completion model
    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-4o-mini")]
    chat_model: String,

    /// Request timeout for provider calls, in seconds
    #[arg(long, default_value = "60")]
    timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
    /// Offline trigram hashing embedder. Vectors are not comparable with OpenAI ones.
    Local,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
        /// Comma separated list of allowed CORS origins.
        #[arg(
            long,
            env = "CORS_ORIGINS",
            value_delimiter = ',',
            default_value = "http://localhost:3000,http://localhost:8080"
        )]
        cors_origins: Vec<String>,
        /// Maximum upload size in megabytes.
        #[arg(long, default_value = "50")]
        max_upload_mb: usize,
        /// Restrict the admin routes to users with this role. Empty means any authenticated user.
        #[arg(long, env = "ADMIN_ROLE")]
        admin_role: Option<String>,
    },
    /// Upload a pdf, docx or txt file.
    Upload {
        #[arg(long)]
        file: String,
    },
    /// List uploaded files, newest first.
    Files,
    /// Delete a file and its chunks.
    Delete {
        #[arg(long)]
        id: String,
    },
    /// Ask a question against the uploaded files.
    Ask {
        #[arg(long)]
        question: String,
    },
}

impl BackendArgs {
    fn connect(&self) -> anyhow::Result<Backends> {
        let supabase = SupabaseConfig::new(
            &self.supabase_url,
            self.supabase_key.clone(),
            self.supabase_service_key.clone(),
            self.bucket.clone(),
        )
        .context("invalid Supabase configuration")?;

        let openai = OpenAiClient::new(OpenAiConfig {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.clone(),
            embedding_model: self.embedding_model.clone(),
            embedding_dimensions: self.embedding_dimensions,
            chat_model: self.chat_model.clone(),
            timeout_secs: self.timeout_secs,
        })
        .context("invalid OpenAI configuration")?;
        let openai = Arc::new(openai);

        let embedder: Arc<dyn Embedder> = match self.embedder {
            EmbedderKind::Openai => openai.clone(),
            EmbedderKind::Local => Arc::new(CharacterNgramEmbedder::default()),
        };

        Ok(Backends {
            repository: Arc::new(SupabaseRestStore::new(supabase.clone())),
            objects: Arc::new(SupabaseStorage::new(supabase.clone())),
            embedder,
            completion: openai,
            identity: Arc::new(SupabaseAuth::new(supabase)),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let backends = cli.backend.connect()?;
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "docqa boot"
    );

    match cli.command {
        Command::Serve {
            bind,
            cors_origins,
            max_upload_mb,
            admin_role,
        } => {
            let state = AppState::new(backends, AdminPolicy::from_role(admin_role));
            let config = ServerConfig {
                bind,
                cors_origins,
                max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            };
            server::serve(state, config).await?;
        }
        Command::Upload { file } => {
            let state = AppState::new(backends, AdminPolicy::default());
            let (filename, bytes) = read_upload(Path::new(&file)).await?;
            let receipt = state.ingestion.upload(&filename, &bytes).await?;
            println!("{} uploaded as {} ({})", receipt.filename, receipt.id, receipt.status);
        }
        Command::Files => {
            let state = AppState::new(backends, AdminPolicy::default());
            let documents = state.ingestion.list_documents().await?;
            if documents.is_empty() {
                println!("no files uploaded");
            }
            for document in documents {
                println!(
                    "{}  {}  {}",
                    document.id,
                    document.created_at.to_rfc3339(),
                    document.filename
                );
            }
        }
        Command::Delete { id } => {
            let state = AppState::new(backends, AdminPolicy::default());
            let receipt = state.ingestion.delete(&id).await?;
            println!("{} {}", receipt.status, receipt.id);
        }
        Command::Ask { question } => {
            let state = AppState::new(backends, AdminPolicy::default());
            let answer = state.answers.ask(&question).await?;
            println!("{}", answer.answer);
            for (index, source) in answer.sources.iter().enumerate() {
                println!(
                    "[{}] {} (file={} chunk={})",
                    index + 1,
                    source.filename,
                    source.file_id,
                    source.chunk_id
                );
                println!("  {}", source.content);
            }
        }
    }

    Ok(())
}

async fn read_upload(path: &Path) -> anyhow::Result<(String, Vec<u8>)> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("path has no file name: {}", path.display()))?
        .to_string();
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok((filename, bytes))
}
