//! Chat completion request and response types

use serde::{Deserialize, Serialize};

use super::usage::UsageRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// A chat completion request
///
/// `model: None` uses the client's configured chat model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Retrieved context items folded into the prompt; drives the adaptive
    /// timeout and is never sent to the provider
    #[serde(default, skip_serializing)]
    pub context_items: usize,
}

impl ChatCompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { model: None, messages, max_tokens: None, temperature: None, context_items: 0 }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_context_items(mut self, context_items: usize) -> Self {
        self.context_items = context_items;
        self
    }

    /// Content of the last user message, the query the complexity heuristic
    /// looks at
    pub fn query(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map_or("", |m| m.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub content: String,
    pub finish_reason: Option<String>,
    pub model: String,
    pub usage: UsageRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_last_user_message() {
        let request = ChatCompletionRequest::new(vec![
            ChatMessage::system("answer briefly"),
            ChatMessage::user("first"),
            ChatMessage::assistant("ok"),
            ChatMessage::user("how many VMs?"),
        ]);

        assert_eq!(request.query(), "how many VMs?");
        assert_eq!(ChatCompletionRequest::new(vec![ChatMessage::system("x")]).query(), "");
    }

    #[test]
    fn context_items_are_not_serialized() {
        let request = ChatCompletionRequest::new(vec![ChatMessage::user("hi")])
            .with_context_items(12)
            .with_max_tokens(256);

        let json = serde_json::to_value(&request).expect("serializes");

        assert!(json.get("context_items").is_none());
        assert!(json.get("model").is_none());
        assert_eq!(json["max_tokens"], 256);
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
