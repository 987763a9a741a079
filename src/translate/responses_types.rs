//! Type definitions for the OpenAI Responses API, the canonical schema of the
//! multi-turn responses family.
//!
//! Conversation items are modelled loosely: known item shapes are typed, bare
//! `{role, content}` messages are accepted as input, and anything else is kept
//! as raw JSON so items round-trip through the context store unchanged.

use crate::billing::{Metered, Usage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseCreateRequest {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<ResponseInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ResponseTool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseInput {
    Text(String),
    Items(Vec<ConversationItem>),
}

impl ResponseInput {
    /// Input as conversation turns: a bare string becomes one user message,
    /// a structured sequence is kept as-is.
    pub fn into_items(self) -> Vec<ConversationItem> {
        match self {
            ResponseInput::Text(text) => vec![ConversationItem::user_text(text)],
            ResponseInput::Items(items) => items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConversationItem {
    Typed(ResponseItem),
    Message(EasyMessage),
    Other(serde_json::Value),
}

impl ConversationItem {
    pub fn user_text(text: impl Into<String>) -> Self {
        ConversationItem::Typed(ResponseItem::Message {
            id: None,
            role: "user".to_string(),
            content: ItemContent::Text(text.into()),
            status: None,
        })
    }
}

/// Shorthand input message without a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EasyMessage {
    pub role: String,
    pub content: ItemContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseItem {
    Message {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        role: String,
        content: ItemContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
    FunctionCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        call_id: String,
        name: String,
        arguments: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText {
        text: String,
    },
    OutputText {
        text: String,
        #[serde(default)]
        annotations: Vec<serde_json::Value>,
    },
    InputImage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Refusal {
        refusal: String,
    },
}

/// Function tools are typed; built-in tools (`web_search_preview`,
/// `file_search`, `mcp`, ...) are kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseTool {
    Function(FunctionTool),
    #[serde(untagged)]
    BuiltIn(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default = "response_object")]
    pub object: String,
    #[serde(default)]
    pub created_at: u64,
    pub model: String,
    #[serde(default = "completed_status")]
    pub status: String,
    #[serde(default)]
    pub output: Vec<ConversationItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResponseUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn response_object() -> String {
    "response".to_string()
}

fn completed_status() -> String {
    "completed".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

// ---------------------------------------------------------------------------
// Streaming event types
// ---------------------------------------------------------------------------

/// Events the gateway itself synthesizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseEvent {
    #[serde(rename = "response.created")]
    Created { response: Response },
    #[serde(rename = "response.in_progress")]
    InProgress { response: Response },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        output_index: usize,
        item: ConversationItem,
    },
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        item_id: String,
        output_index: usize,
        content_index: usize,
        part: ContentPart,
    },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        item_id: String,
        output_index: usize,
        content_index: usize,
        delta: String,
    },
    #[serde(rename = "response.output_text.done")]
    OutputTextDone {
        item_id: String,
        output_index: usize,
        content_index: usize,
        text: String,
    },
    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        item_id: String,
        output_index: usize,
        content_index: usize,
        part: ContentPart,
    },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        item_id: String,
        output_index: usize,
        delta: String,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        item_id: String,
        output_index: usize,
        arguments: String,
    },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        output_index: usize,
        item: ConversationItem,
    },
    #[serde(rename = "response.completed")]
    Completed { response: Response },
    #[serde(rename = "response.failed")]
    Failed { response: Response },
    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

/// A canonical responses stream event: one the gateway understands, or a
/// provider event forwarded verbatim. Both serialize as `{type, ...payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseStreamEvent {
    Known(ResponseEvent),
    Passthrough(serde_json::Value),
}

impl ResponseEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            ResponseEvent::Created { .. } => "response.created",
            ResponseEvent::InProgress { .. } => "response.in_progress",
            ResponseEvent::OutputItemAdded { .. } => "response.output_item.added",
            ResponseEvent::ContentPartAdded { .. } => "response.content_part.added",
            ResponseEvent::OutputTextDelta { .. } => "response.output_text.delta",
            ResponseEvent::OutputTextDone { .. } => "response.output_text.done",
            ResponseEvent::ContentPartDone { .. } => "response.content_part.done",
            ResponseEvent::FunctionCallArgumentsDelta { .. } => {
                "response.function_call_arguments.delta"
            }
            ResponseEvent::FunctionCallArgumentsDone { .. } => {
                "response.function_call_arguments.done"
            }
            ResponseEvent::OutputItemDone { .. } => "response.output_item.done",
            ResponseEvent::Completed { .. } => "response.completed",
            ResponseEvent::Failed { .. } => "response.failed",
            ResponseEvent::Error { .. } => "error",
        }
    }
}

impl ResponseStreamEvent {
    pub fn event_name(&self) -> String {
        match self {
            ResponseStreamEvent::Known(event) => event.event_name().to_string(),
            ResponseStreamEvent::Passthrough(value) => value
                .get("type")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("message")
                .to_string(),
        }
    }

    /// The finished response carried by a `response.completed` event.
    pub fn completed_response(&self) -> Option<Response> {
        match self {
            ResponseStreamEvent::Known(ResponseEvent::Completed { response }) => {
                Some(response.clone())
            }
            ResponseStreamEvent::Passthrough(value)
                if value.get("type").and_then(serde_json::Value::as_str)
                    == Some("response.completed") =>
            {
                value
                    .get("response")
                    .cloned()
                    .and_then(|r| serde_json::from_value(r).ok())
            }
            _ => None,
        }
    }
}

impl Metered for Response {
    fn usage(&self) -> Option<Usage> {
        self.usage
            .as_ref()
            .map(|u| Usage::tokens(u.input_tokens, u.output_tokens))
    }
}

impl Metered for ResponseStreamEvent {
    fn usage(&self) -> Option<Usage> {
        self.completed_response().as_ref().and_then(Metered::usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_items_accept_typed_bare_and_unknown_shapes() {
        let input: ResponseInput = serde_json::from_value(serde_json::json!([
            {"role": "user", "content": "hello"},
            {"type": "function_call_output", "call_id": "c1", "output": "42"},
            {"type": "reasoning", "id": "rs_1", "summary": []}
        ]))
        .unwrap();
        let items = input.into_items();
        assert!(matches!(items[0], ConversationItem::Message(_)));
        assert!(matches!(
            items[1],
            ConversationItem::Typed(ResponseItem::FunctionCallOutput { .. })
        ));
        assert!(matches!(items[2], ConversationItem::Other(_)));
    }

    #[test]
    fn built_in_tools_are_kept_verbatim() {
        let body = serde_json::json!({
            "model": "gpt-4.1",
            "input": "news?",
            "tools": [
                {"type": "web_search_preview", "search_context_size": "low"},
                {"type": "function", "name": "lookup", "parameters": {"type": "object"}, "strict": true}
            ]
        });
        let req: ResponseCreateRequest = serde_json::from_value(body.clone()).unwrap();
        let tools = req.tools.as_ref().unwrap();
        assert!(matches!(tools[0], ResponseTool::BuiltIn(_)));
        assert!(matches!(&tools[1], ResponseTool::Function(t) if t.name == "lookup"));
        assert_eq!(serde_json::to_value(&req).unwrap()["tools"], body["tools"]);
    }

    #[test]
    fn string_input_normalizes_to_single_user_turn() {
        let items = ResponseInput::Text("hi".to_string()).into_items();
        assert_eq!(items, vec![ConversationItem::user_text("hi")]);
        let json = serde_json::to_value(&items[0]).unwrap();
        assert_eq!(json, serde_json::json!({"type": "message", "role": "user", "content": "hi"}));
    }

    #[test]
    fn unknown_provider_events_pass_through() {
        let event: ResponseStreamEvent = serde_json::from_value(serde_json::json!({
            "type": "response.reasoning_summary_text.delta",
            "delta": "thinking",
            "sequence_number": 4
        }))
        .unwrap();
        assert_eq!(event.event_name(), "response.reasoning_summary_text.delta");
        assert!(event.completed_response().is_none());
    }

    #[test]
    fn passthrough_completed_event_exposes_response_and_usage() {
        let event = ResponseStreamEvent::Passthrough(serde_json::json!({
            "type": "response.completed",
            "sequence_number": 9,
            "response": {
                "id": "resp_1", "object": "response", "created_at": 1, "model": "gpt-4o",
                "status": "completed", "output": [],
                "usage": {"input_tokens": 3, "output_tokens": 4, "total_tokens": 7}
            }
        }));
        assert_eq!(event.completed_response().unwrap().id, "resp_1");
        assert_eq!(event.usage().unwrap().output, 4);
    }
}
