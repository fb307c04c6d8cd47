use crate::models::chat::{ ChatMessage, Role };

/// Ordered turn log owned by a single conversation session.
///
/// Messages are only ever appended as a completed user/assistant pair, so the log always
/// alternates `user, assistant, user, assistant, ...`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct History {
    messages: Vec<ChatMessage>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_turn(&mut self, user: ChatMessage, assistant: ChatMessage) {
        debug_assert_eq!(user.role(), Role::User);
        debug_assert_eq!(assistant.role(), Role::Assistant);
        self.messages.reserve(2);
        self.messages.push(user);
        self.messages.push(assistant);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn transcript(&self) -> String {
        let mut result = String::new();
        for msg in &self.messages {
            result.push_str(&format!("{}: {}\n", msg.role(), msg.text()));
        }
        result
    }
}
