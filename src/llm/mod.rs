pub mod gemini;
pub mod grounding;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::models::chat::ChatMessage;
use crate::rag::tool::FileSearchTool;
use self::grounding::Grounding;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone, Default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl GeminiConfig {
    pub fn model_or_default(&self) -> String {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MODEL)
            .to_string()
    }
}

/// Everything the remote model needs for one retrieval-augmented generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub contents: Vec<ChatMessage>,
    pub system_instruction: Option<String>,
    pub tool: FileSearchTool,
}

/// Generated text plus whatever grounding came with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub grounding: Grounding,
}

/// Hosted model endpoint that performs retrieval against a remote store.
#[async_trait]
pub trait KnowledgeService: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ServiceError>;
}
