use clap::{ Parser, Subcommand };
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::llm::GeminiConfig;
use crate::models::store::CustomMetadata;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Gemini API Args ---
    /// API key for the Gemini API
    #[arg(long, global = true, env = "GEMINI_API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    /// Base URL for the Gemini API (defaults to https://generativelanguage.googleapis.com)
    #[arg(long, global = true, env = "GEMINI_BASE_URL")]
    pub base_url: Option<String>,

    /// Model used for answers (defaults to gemini-2.5-flash)
    #[arg(long, global = true, env = "GEMINI_MODEL")]
    pub model: Option<String>,

    // --- Retrieval Args ---
    /// File search store to answer from (e.g., fileSearchStores/abc123)
    #[arg(long, visible_alias = "store", global = true, env = "STORE_NAME")]
    pub store_name: Option<String>,

    /// Metadata filter applied to retrieval (e.g., category="support")
    #[arg(long, visible_alias = "filter", global = true, env = "METADATA_FILTER")]
    pub metadata_filter: Option<String>,

    // --- Session Args ---
    /// Optional JSON persona file with `system_instruction` and `greeting`.
    #[arg(long, global = true, env = "PERSONA_PATH")]
    pub persona_path: Option<String>,

    /// Give up on a chat turn after this many seconds. Unset means wait for the service.
    #[arg(long, global = true, env = "DEADLINE_SECS")]
    pub deadline_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Manage file search stores
    #[command(subcommand)]
    Store(StoreCommand),

    /// Upload one file into the store
    Upload {
        file: PathBuf,

        /// Display name for the document (defaults to the file name)
        #[arg(long)]
        display_name: Option<String>,

        /// Maximum tokens per chunk (default 200 when chunking is configured)
        #[arg(long)]
        max_tokens_per_chunk: Option<u32>,

        /// Maximum overlap tokens between chunks (default 20 when chunking is configured)
        #[arg(long)]
        max_overlap_tokens: Option<u32>,

        /// Custom document metadata; numbers are sent as numeric values
        #[arg(long = "metadata", value_name = "KEY=VALUE")]
        metadata: Vec<CustomMetadata>,

        /// Wait until the document has been indexed
        #[arg(long)]
        wait: bool,
    },

    /// Upload every matching file in a directory into the store
    UploadDir {
        dir: PathBuf,

        #[arg(long, default_value = "pdf")]
        extension: String,

        #[arg(long)]
        wait: bool,
    },

    /// Ask a single question against the store, without history or persona
    Ask {
        query: String,
    },

    /// Line-oriented console over a conversation session (/reset, /history, /quit)
    Chat,
}

#[derive(Subcommand, Debug, Clone)]
pub enum StoreCommand {
    Create {
        display_name: String,
    },
    List,
    Get {
        name: String,
    },
    Delete {
        name: String,

        /// Refuse to delete a store that still holds documents
        #[arg(long)]
        no_force: bool,
    },
    /// Force-delete every store
    Cleanup {
        /// Confirm deleting all stores
        #[arg(long)]
        yes: bool,
    },
}

impl Args {
    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            api_key: Some(self.api_key.clone()).filter(|k| !k.trim().is_empty()),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
        }
    }

    pub fn require_store(&self) -> Result<String, ConfigError> {
        self.store_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(ConfigError::MissingStore)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }
}
