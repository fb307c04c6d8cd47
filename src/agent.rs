use log::{ error, info };
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::prompt::PersonaConfig;
use crate::error::{ ConfigError, ServiceError };
use crate::history::History;
use crate::llm::{ GenerateRequest, KnowledgeService, DEFAULT_MODEL };
use crate::models::chat::{ ChatMessage, ChatResponse };
use crate::rag::citations::{ extract_citations, GroundingTrace, LogTrace };
use crate::rag::tool::FileSearchTool;

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Remote store to retrieve from. Required; blank counts as missing.
    pub store_name: Option<String>,
    pub model: Option<String>,
    pub metadata_filter: Option<String>,
    pub persona: Arc<PersonaConfig>,
}

impl SessionConfig {
    pub fn for_store(store_name: impl Into<String>) -> Self {
        Self {
            store_name: Some(store_name.into()),
            ..Default::default()
        }
    }
}

/// Multi-turn conversation grounded on one remote document store.
///
/// A session is owned by exactly one conversation. `send` takes `&mut self`, so a caller that
/// shares a session across tasks has to serialise access itself (for example behind a
/// `tokio::sync::Mutex`).
pub struct ConversationSession {
    id: Uuid,
    service: Arc<dyn KnowledgeService>,
    store_name: String,
    model: String,
    tool: FileSearchTool,
    system_instruction: String,
    history: History,
    trace: Arc<dyn GroundingTrace>,
}

impl ConversationSession {
    pub fn new(service: Arc<dyn KnowledgeService>, config: SessionConfig) -> Result<Self, ConfigError> {
        let store_name = config.store_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingStore)?;
        let model = config.model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let tool = FileSearchTool::for_store(store_name.clone()).with_metadata_filter(
            config.metadata_filter
        );
        let id = Uuid::new_v4();
        info!("Session {} opened on store {} with model {}", id, store_name, model);

        Ok(Self {
            id,
            service,
            store_name,
            model,
            tool,
            system_instruction: config.persona.system_instruction.clone(),
            history: History::new(),
            trace: Arc::new(LogTrace),
        })
    }

    /// Replaces the default `log`-backed retrieval diagnostics.
    pub fn with_trace(mut self, trace: Arc<dyn GroundingTrace>) -> Self {
        self.trace = trace;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Runs one turn. History gains the user and assistant messages only when the remote call
    /// succeeds; on error it is left exactly as it was.
    pub async fn send(&mut self, utterance: &str) -> Result<ChatResponse, ServiceError> {
        let user = ChatMessage::user(utterance);
        let mut contents = Vec::with_capacity(self.history.len() + 1);
        contents.extend(self.history.iter().cloned());
        contents.push(user.clone());

        let request = GenerateRequest {
            model: self.model.clone(),
            contents,
            system_instruction: Some(self.system_instruction.clone()),
            tool: self.tool.clone(),
        };

        let generation = self.service.generate(&request).await.map_err(|e| {
            error!("Session {} turn failed: {}", self.id, e);
            e
        })?;

        let citations = extract_citations(&generation.grounding, self.trace.as_ref());
        self.history.push_turn(user, ChatMessage::assistant(generation.text.clone()));

        Ok(ChatResponse {
            text: generation.text,
            citations,
        })
    }

    /// `send` bounded by an external deadline. Expiry is reported like a transport failure and,
    /// since the in-flight turn is dropped, leaves history untouched.
    pub async fn send_with_deadline(
        &mut self,
        utterance: &str,
        deadline: Duration
    ) -> Result<ChatResponse, ServiceError> {
        match tokio::time::timeout(deadline, self.send(utterance)).await {
            Ok(result) => result,
            Err(_) => {
                error!("Session {} turn exceeded {:?}", self.id, deadline);
                Err(ServiceError::DeadlineExceeded(deadline))
            }
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
