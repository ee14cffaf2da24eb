/// Wire types for the OpenAI embeddings and chat completions APIs
use lumen_domain::ChatMessage;
use serde::{Deserialize, Serialize};

use crate::llm::transport::{ChatChoice, ChatCompletion, EmbeddingBatch, IndexedEmbedding};

#[derive(Debug, Serialize)]
pub(crate) struct EmbeddingRequest<'a> {
    pub model: &'a str,
    pub input: &'a [String],
    pub encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbeddingResponse {
    pub data: Vec<EmbeddingData>,
    #[serde(default)]
    pub usage: EmbeddingUsage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbeddingData {
    pub index: usize,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EmbeddingUsage {
    #[serde(default)]
    pub total_tokens: u64,
}

impl From<EmbeddingResponse> for EmbeddingBatch {
    fn from(response: EmbeddingResponse) -> Self {
        Self {
            data: response
                .data
                .into_iter()
                .map(|d| IndexedEmbedding { index: d.index, embedding: d.embedding })
                .collect(),
            total_tokens: response.usage.total_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: Message,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Message {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChatUsage {
    #[serde(default)]
    pub total_tokens: u64,
}

impl From<ChatResponse> for ChatCompletion {
    fn from(response: ChatResponse) -> Self {
        Self {
            model: response.model,
            choices: response
                .choices
                .into_iter()
                .map(|c| ChatChoice {
                    content: c.message.content.unwrap_or_default(),
                    finish_reason: c.finish_reason,
                })
                .collect(),
            total_tokens: response.usage.total_tokens,
        }
    }
}

/// Error envelope: `{"error": {"message": ..., "type": ...}}`
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_response_keeps_indices() {
        let json = r#"{
            "object": "list",
            "data": [
                { "object": "embedding", "index": 1, "embedding": [0.4, 0.5] },
                { "object": "embedding", "index": 0, "embedding": [0.1, 0.2] }
            ],
            "model": "text-embedding-3-small",
            "usage": { "prompt_tokens": 8, "total_tokens": 8 }
        }"#;

        let batch: EmbeddingBatch =
            serde_json::from_str::<EmbeddingResponse>(json).expect("should deserialize").into();

        assert_eq!(batch.total_tokens, 8);
        assert_eq!(batch.data[0].index, 1);
        assert_eq!(batch.data[1].embedding, vec![0.1, 0.2]);
    }

    #[test]
    fn chat_response_tolerates_null_content() {
        let json = r#"{
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": null },
                "finish_reason": "length"
            }]
        }"#;

        let completion: ChatCompletion =
            serde_json::from_str::<ChatResponse>(json).expect("should deserialize").into();

        assert_eq!(completion.choices[0].content, "");
        assert_eq!(completion.choices[0].finish_reason.as_deref(), Some("length"));
        assert_eq!(completion.total_tokens, 0);
    }

    #[test]
    fn chat_request_omits_unset_options() {
        let messages = vec![ChatMessage::user("hello")];
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            max_tokens: None,
            temperature: Some(0.2),
        };

        let json = serde_json::to_value(&request).expect("should serialize");

        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["messages"][0]["content"], "hello");
    }

    #[test]
    fn parses_error_envelope() {
        let json = r#"{
            "error": {
                "message": "Incorrect API key provided",
                "type": "invalid_request_error",
                "code": "invalid_api_key"
            }
        }"#;

        let body: ApiErrorBody = serde_json::from_str(json).expect("should deserialize");

        assert_eq!(body.error.message, "Incorrect API key provided");
        assert_eq!(body.error.kind.as_deref(), Some("invalid_request_error"));
    }
}
