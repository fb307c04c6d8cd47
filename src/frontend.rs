//! Presentation boundary: one entry point per new user session and one per inbound message.
//!
//! Nothing here renders anything; callers get plain text plus side-panel citations and decide
//! how to display them.

use log::{ error, warn };
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{ ConversationSession, SessionConfig };
use crate::llm::KnowledgeService;
use crate::models::chat::ChatResponse;

pub const NOT_INITIALIZED_NOTICE: &str = "Agent not initialized. Please refresh the page.";
pub const SERVICE_FAILURE_NOTICE: &str =
    "Sorry, the assistant could not answer right now. Please try sending your message again.";

/// Outcome of opening a session for a new user.
pub enum SessionStart {
    Ready {
        session: ConversationSession,
        greeting: String,
    },
    /// Shown to the user instead of crashing when no store is configured.
    Misconfigured {
        notice: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationPanel {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub text: String,
    pub panels: Vec<CitationPanel>,
    /// True when `text` is a failure notice rather than an answer.
    pub failed: bool,
}

impl Reply {
    fn notice(text: &str) -> Self {
        Self {
            text: text.to_string(),
            panels: Vec::new(),
            failed: true,
        }
    }
}

impl From<ChatResponse> for Reply {
    fn from(response: ChatResponse) -> Self {
        let panels = response.citations
            .into_iter()
            .enumerate()
            .map(|(i, citation)| CitationPanel {
                name: format!("Source {}", i + 1),
                content: citation,
            })
            .collect();
        Self {
            text: response.text,
            panels,
            failed: false,
        }
    }
}

pub struct ChatFrontend {
    service: Arc<dyn KnowledgeService>,
    template: SessionConfig,
    deadline: Option<Duration>,
}

impl ChatFrontend {
    /// `template.store_name` is the process-wide default store, typically from `STORE_NAME`.
    pub fn new(service: Arc<dyn KnowledgeService>, template: SessionConfig) -> Self {
        Self {
            service,
            template,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline.filter(|d| !d.is_zero());
        self
    }

    pub fn start_session(&self) -> SessionStart {
        match ConversationSession::new(Arc::clone(&self.service), self.template.clone()) {
            Ok(session) =>
                SessionStart::Ready {
                    session,
                    greeting: self.template.persona.greeting.clone(),
                },
            Err(e) => {
                warn!("Session not started: {}", e);
                SessionStart::Misconfigured {
                    notice: format!(
                        "⚠️ Configuration Error: {}\n\nPlease set the STORE_NAME environment variable.",
                        e
                    ),
                }
            }
        }
    }

    pub async fn handle_message(&self, session: Option<&mut ConversationSession>, text: &str) -> Reply {
        let Some(session) = session else {
            return Reply::notice(NOT_INITIALIZED_NOTICE);
        };

        let result = match self.deadline {
            Some(deadline) => session.send_with_deadline(text, deadline).await,
            None => session.send(text).await,
        };

        match result {
            Ok(response) => Reply::from(response),
            Err(e) => {
                error!("Session {} could not answer: {}", session.id(), e);
                Reply::notice(SERVICE_FAILURE_NOTICE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::llm::grounding::{ Grounding, GroundingChunk, GroundingMetadata, RetrievedContext };
    use crate::llm::{ GenerateRequest, Generation };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct Scripted {
        fail: bool,
    }

    #[async_trait]
    impl KnowledgeService for Scripted {
        async fn generate(&self, _request: &GenerateRequest) -> Result<Generation, ServiceError> {
            if self.fail {
                return Err(ServiceError::Api {
                    endpoint: "test".into(),
                    status: 503,
                    message: "UNAVAILABLE".into(),
                });
            }
            let chunk = |title: &str| GroundingChunk {
                retrieved_context: Some(RetrievedContext {
                    title: Some(title.into()),
                    ..Default::default()
                }),
            };
            Ok(Generation {
                text: "Article 12 applies.".into(),
                grounding: Grounding::Present(GroundingMetadata {
                    grounding_chunks: Some(vec![chunk("Rule B"), chunk("Rule A")]),
                    ..Default::default()
                }),
            })
        }
    }

    fn frontend(fail: bool, store: Option<&str>) -> ChatFrontend {
        ChatFrontend::new(Arc::new(Scripted { fail }), SessionConfig {
            store_name: store.map(String::from),
            ..Default::default()
        })
    }

    #[test]
    fn missing_store_becomes_a_notice() {
        match frontend(false, None).start_session() {
            SessionStart::Misconfigured { notice } => {
                assert!(notice.contains("Configuration Error"));
                assert!(notice.contains("STORE_NAME"));
            }
            SessionStart::Ready { .. } => panic!("session should not start without a store"),
        }
    }

    #[tokio::test]
    async fn answers_come_with_numbered_panels() {
        let frontend = frontend(false, Some("stores/abc"));
        let SessionStart::Ready { mut session, greeting } = frontend.start_session() else {
            panic!("session should start");
        };
        assert!(!greeting.is_empty());

        let reply = frontend.handle_message(Some(&mut session), "Which article?").await;
        assert_eq!(reply, Reply {
            text: "Article 12 applies.".into(),
            panels: vec![
                CitationPanel { name: "Source 1".into(), content: "Source: Rule A".into() },
                CitationPanel { name: "Source 2".into(), content: "Source: Rule B".into() }
            ],
            failed: false,
        });
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn service_failure_is_a_generic_notice() {
        let frontend = frontend(true, Some("stores/abc"));
        let SessionStart::Ready { mut session, .. } = frontend.start_session() else {
            panic!("session should start");
        };

        let reply = frontend.handle_message(Some(&mut session), "Hello?").await;
        assert!(reply.failed);
        assert_eq!(reply.text, SERVICE_FAILURE_NOTICE);
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn message_without_session_is_rejected() {
        let reply = frontend(false, Some("stores/abc")).handle_message(None, "Hello?").await;
        assert_eq!(reply.text, NOT_INITIALIZED_NOTICE);
        assert!(reply.failed);
    }
}
