//! Request translation between the Messages and Chat Completions schemas.
//!
//! `messages_to_chat` serves Messages callers routed to an OpenAI-compatible
//! provider. One Messages turn can expand into several chat messages (a user
//! turn carrying `tool_result` blocks becomes separate `tool`-role messages).
//!
//! `chat_to_messages` goes the other way for chat callers routed to Anthropic.
//! System messages are hoisted into `system`, consecutive `tool` messages fold
//! into a single user turn of `tool_result` blocks.

use super::anthropic_types::{
    ContentBlock, ImageSource, Message, MessageContent, MessagesRequest, Metadata, Role,
    SystemContent, Tool, ToolChoice, ToolChoiceAuto, ToolChoiceSpecific, ToolResultContent,
};
use super::openai_types::{
    ChatCompletionRequest, ChatContent, ChatFunction, ChatMessage, ChatTool, ChatToolCall,
    ChatToolCallFunction, ChatToolChoice, ChatToolChoiceFunction, ChatToolChoiceSpecific,
    ContentPart, ImageUrlDetail, StopSequences, StreamOptions,
};
use std::collections::HashMap;

/// `max_tokens` is mandatory on the Messages API; chat callers may omit it.
pub const DEFAULT_MAX_TOKENS: u64 = 4096;

pub fn messages_to_chat(req: &MessagesRequest) -> ChatCompletionRequest {
    let mut messages = Vec::new();

    if let Some(ref system) = req.system {
        messages.push(ChatMessage::text("system", system.as_text()));
    }

    for msg in &req.messages {
        messages.append(&mut translate_message(msg));
    }

    // Server tools run on Anthropic's side and cannot be offered to a chat model
    let tools = req
        .tools
        .as_ref()
        .map(|tools| {
            tools
                .iter()
                .filter(|t| t.is_client_tool())
                .map(|t| ChatTool {
                    tool_type: "function".to_string(),
                    function: ChatFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone().unwrap_or_default(),
                    },
                })
                .collect::<Vec<_>>()
        })
        .filter(|tools| !tools.is_empty());
    let tool_choice = tools
        .as_ref()
        .and(req.tool_choice.as_ref())
        .map(translate_tool_choice);

    let stream_options = req.stream.filter(|s| *s).map(|_| StreamOptions {
        include_usage: true,
    });

    ChatCompletionRequest {
        model: req.model.clone(),
        messages,
        max_tokens: Some(req.max_tokens),
        max_completion_tokens: None,
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        stream_options,
        tools,
        tool_choice,
        stop: req.stop_sequences.clone().map(StopSequences::Many),
        user: req.metadata.as_ref().and_then(|m| m.user_id.clone()),
        extra: HashMap::new(),
    }
}

fn translate_message(msg: &Message) -> Vec<ChatMessage> {
    let blocks = msg.content.blocks();

    match msg.role {
        Role::User => translate_user_message(&blocks),
        Role::Assistant => translate_assistant_message(&blocks),
    }
}

fn translate_user_message(blocks: &[ContentBlock]) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    let mut content_parts: Vec<ContentPart> = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => {
                content_parts.push(ContentPart::Text { text: text.clone() });
            }
            ContentBlock::Image { source } => {
                if let Some(url) = image_source_url(source) {
                    content_parts.push(ContentPart::ImageUrl {
                        image_url: ImageUrlDetail { url, detail: None },
                    });
                }
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                // Text that preceded the result stays ahead of it
                if !content_parts.is_empty() {
                    messages.push(user_message(&content_parts));
                    content_parts.clear();
                }

                messages.push(ChatMessage {
                    role: "tool".to_string(),
                    content: Some(ChatContent::Text(tool_result_to_string(
                        content.as_ref(),
                        *is_error,
                    ))),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id.clone()),
                    name: None,
                });
            }
            ContentBlock::Thinking { .. } | ContentBlock::ToolUse { .. } => {}
            ContentBlock::Other(block) => {
                tracing::debug!(block_type = ?block.get("type"), "dropping block with no chat form");
            }
        }
    }

    if !content_parts.is_empty() {
        messages.push(user_message(&content_parts));
    }

    if messages.is_empty() {
        messages.push(ChatMessage::text("user", String::new()));
    }

    messages
}

fn user_message(parts: &[ContentPart]) -> ChatMessage {
    let content = match parts {
        [ContentPart::Text { text }] => ChatContent::Text(text.clone()),
        _ => ChatContent::Parts(parts.to_vec()),
    };
    ChatMessage {
        role: "user".to_string(),
        content: Some(content),
        tool_calls: None,
        tool_call_id: None,
        name: None,
    }
}

fn image_source_url(source: &ImageSource) -> Option<String> {
    if let Some(ref url) = source.url {
        return Some(url.clone());
    }
    let data = source.data.as_ref()?;
    let media_type = source.media_type.as_deref().unwrap_or("image/png");
    Some(format!("data:{media_type};base64,{data}"))
}

fn translate_assistant_message(blocks: &[ContentBlock]) -> Vec<ChatMessage> {
    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls: Vec<ChatToolCall> = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => text_parts.push(text),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ChatToolCall {
                    id: id.clone(),
                    call_type: "function".to_string(),
                    function: ChatToolCallFunction {
                        name: name.clone(),
                        arguments: input.to_string(),
                    },
                });
            }
            ContentBlock::Thinking { .. }
            | ContentBlock::Image { .. }
            | ContentBlock::ToolResult { .. }
            | ContentBlock::Other(_) => {}
        }
    }

    vec![ChatMessage {
        role: "assistant".to_string(),
        content: (!text_parts.is_empty()).then(|| ChatContent::Text(text_parts.concat())),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
        name: None,
    }]
}

fn tool_result_to_string(content: Option<&ToolResultContent>, is_error: Option<bool>) -> String {
    let prefix = if is_error == Some(true) { "ERROR: " } else { "" };

    match content {
        Some(ToolResultContent::Text(t)) => format!("{prefix}{t}"),
        Some(ToolResultContent::Blocks(blocks)) => {
            let text = blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            format!("{prefix}{text}")
        }
        None => format!("{prefix}(no content)"),
    }
}

fn translate_tool_choice(tc: &ToolChoice) -> ChatToolChoice {
    match tc {
        ToolChoice::Auto(ToolChoiceAuto { choice_type }) => match choice_type.as_str() {
            "any" => ChatToolChoice::String("required".to_string()),
            "none" => ChatToolChoice::String("none".to_string()),
            _ => ChatToolChoice::String("auto".to_string()),
        },
        ToolChoice::Specific(ToolChoiceSpecific { name, .. }) => {
            ChatToolChoice::Specific(ChatToolChoiceSpecific {
                choice_type: "function".to_string(),
                function: ChatToolChoiceFunction { name: name.clone() },
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Chat Completions -> Messages
// ---------------------------------------------------------------------------

pub fn chat_to_messages(req: &ChatCompletionRequest) -> MessagesRequest {
    let mut system_parts: Vec<String> = Vec::new();
    let mut messages: Vec<Message> = Vec::new();

    for msg in &req.messages {
        match msg.role.as_str() {
            "system" | "developer" => {
                if let Some(ref content) = msg.content {
                    system_parts.push(content.as_text());
                }
            }
            "assistant" => push_turn(&mut messages, Role::Assistant, assistant_blocks(msg)),
            "tool" => {
                let block = ContentBlock::ToolResult {
                    tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                    content: msg
                        .content
                        .as_ref()
                        .map(|c| ToolResultContent::Text(c.as_text())),
                    is_error: None,
                };
                push_turn(&mut messages, Role::User, vec![block]);
            }
            _ => push_turn(&mut messages, Role::User, user_blocks(msg.content.as_ref())),
        }
    }

    let tools = req.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|t| Tool {
                tool_type: None,
                name: t.function.name.clone(),
                description: t.function.description.clone(),
                input_schema: Some(if t.function.parameters.is_null() {
                    serde_json::json!({"type": "object", "properties": {}})
                } else {
                    t.function.parameters.clone()
                }),
                extra: HashMap::new(),
            })
            .collect()
    });

    MessagesRequest {
        model: req.model.clone(),
        max_tokens: req
            .max_completion_tokens
            .or(req.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS),
        messages,
        system: (!system_parts.is_empty()).then(|| SystemContent::Text(system_parts.join("\n"))),
        stream: req.stream,
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: None,
        tools,
        tool_choice: req.tool_choice.as_ref().and_then(reverse_tool_choice),
        metadata: req.user.as_ref().map(|user| Metadata {
            user_id: Some(user.clone()),
            extra: HashMap::new(),
        }),
        stop_sequences: req.stop.as_ref().map(StopSequences::to_vec),
        thinking: None,
        extra: HashMap::new(),
    }
}

/// Messages requires alternating roles, so same-role neighbours are merged.
fn push_turn(messages: &mut Vec<Message>, role: Role, mut blocks: Vec<ContentBlock>) {
    if let Some(last) = messages.last_mut() {
        if last.role == role {
            let mut merged = last.content.blocks();
            merged.append(&mut blocks);
            last.content = MessageContent::Blocks(merged);
            return;
        }
    }
    messages.push(Message {
        role,
        content: MessageContent::Blocks(blocks),
    });
}

fn user_blocks(content: Option<&ChatContent>) -> Vec<ContentBlock> {
    match content {
        None => vec![ContentBlock::Text {
            text: String::new(),
        }],
        Some(ChatContent::Text(text)) => vec![ContentBlock::Text { text: text.clone() }],
        Some(ChatContent::Parts(parts)) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => ContentBlock::Text { text: text.clone() },
                ContentPart::ImageUrl { image_url } => ContentBlock::Image {
                    source: image_url_source(&image_url.url),
                },
            })
            .collect(),
    }
}

fn image_url_source(url: &str) -> ImageSource {
    // data:<media>;base64,<payload>
    if let Some((meta, data)) = url.strip_prefix("data:").and_then(|r| r.split_once(',')) {
        return ImageSource {
            source_type: "base64".to_string(),
            media_type: Some(meta.trim_end_matches(";base64").to_string()),
            data: Some(data.to_string()),
            url: None,
        };
    }
    ImageSource {
        source_type: "url".to_string(),
        media_type: None,
        data: None,
        url: Some(url.to_string()),
    }
}

fn assistant_blocks(msg: &ChatMessage) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    if let Some(ref content) = msg.content {
        let text = content.as_text();
        if !text.is_empty() {
            blocks.push(ContentBlock::Text { text });
        }
    }
    for call in msg.tool_calls.iter().flatten() {
        let input = serde_json::from_str(&call.function.arguments)
            .unwrap_or_else(|_| serde_json::json!({}));
        blocks.push(ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.function.name.clone(),
            input,
        });
    }
    blocks
}

/// `none` has no Messages equivalent short of dropping the tools, so it is
/// left unset.
fn reverse_tool_choice(tc: &ChatToolChoice) -> Option<ToolChoice> {
    match tc {
        ChatToolChoice::String(s) => match s.as_str() {
            "required" => Some(ToolChoice::Auto(ToolChoiceAuto {
                choice_type: "any".to_string(),
            })),
            "auto" => Some(ToolChoice::Auto(ToolChoiceAuto {
                choice_type: "auto".to_string(),
            })),
            _ => None,
        },
        ChatToolChoice::Specific(specific) => Some(ToolChoice::Specific(ToolChoiceSpecific {
            choice_type: "tool".to_string(),
            name: specific.function.name.clone(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::anthropic_types::*;

    fn messages_request(messages: Vec<Message>, system: Option<SystemContent>) -> MessagesRequest {
        MessagesRequest {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 1024,
            messages,
            system,
            stream: None,
            temperature: None,
            top_p: None,
            top_k: None,
            tools: None,
            tool_choice: None,
            metadata: None,
            stop_sequences: None,
            thinking: None,
            extra: HashMap::default(),
        }
    }

    fn chat_request(messages: Vec<ChatMessage>) -> ChatCompletionRequest {
        serde_json::from_value(serde_json::json!({"model": "claude-3-5-haiku", "messages": []}))
            .map(|mut req: ChatCompletionRequest| {
                req.messages = messages;
                req
            })
            .unwrap()
    }

    #[test]
    fn server_tools_and_documents_have_no_chat_form() {
        let mut req: MessagesRequest = serde_json::from_value(serde_json::json!({
            "model": "claude",
            "max_tokens": 64,
            "messages": [{"role": "user", "content": [
                {"type": "document", "source": {"type": "text", "media_type": "text/plain", "data": "x"}},
                {"type": "text", "text": "Summarize"}
            ]}],
            "tools": [{"type": "web_search_20250305", "name": "web_search"}],
            "tool_choice": {"type": "any"}
        }))
        .unwrap();

        let chat = messages_to_chat(&req);
        assert!(chat.tools.is_none());
        assert!(chat.tool_choice.is_none());
        let user = chat.messages.last().unwrap();
        assert!(matches!(
            user.content,
            Some(ChatContent::Text(ref text)) if text == "Summarize"
        ));

        req.tools.as_mut().unwrap().push(Tool {
            tool_type: None,
            name: "lookup".to_string(),
            description: None,
            input_schema: Some(serde_json::json!({"type": "object"})),
            extra: HashMap::new(),
        });
        let chat = messages_to_chat(&req);
        assert_eq!(chat.tools.as_ref().unwrap().len(), 1);
        assert_eq!(chat.tools.unwrap()[0].function.name, "lookup");
        assert!(chat.tool_choice.is_some());
    }

    #[test]
    fn test_simple_text_request() {
        let req = messages_request(
            vec![Message {
                role: Role::User,
                content: MessageContent::Text("Hello".to_string()),
            }],
            Some(SystemContent::Text("You are helpful".to_string())),
        );

        let result = messages_to_chat(&req);

        assert_eq!(result.model, "claude-sonnet-4-20250514");
        assert_eq!(result.max_tokens, Some(1024));
        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[0].role, "system");
        assert_eq!(result.messages[1].role, "user");
    }

    #[test]
    fn test_tool_result_splits_into_tool_messages() {
        let req = messages_request(
            vec![Message {
                role: Role::User,
                content: MessageContent::Blocks(vec![
                    ContentBlock::ToolResult {
                        tool_use_id: "toolu_1".to_string(),
                        content: Some(ToolResultContent::Text("result 1".to_string())),
                        is_error: Some(true),
                    },
                    ContentBlock::Text {
                        text: "Now continue".to_string(),
                    },
                ]),
            }],
            None,
        );

        let result = messages_to_chat(&req);

        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[0].role, "tool");
        assert_eq!(result.messages[0].tool_call_id.as_deref(), Some("toolu_1"));
        assert_eq!(
            result.messages[0].content.as_ref().unwrap().as_text(),
            "ERROR: result 1"
        );
        assert_eq!(result.messages[1].role, "user");
    }

    #[test]
    fn test_base64_image_becomes_data_uri() {
        let req = messages_request(
            vec![Message {
                role: Role::User,
                content: MessageContent::Blocks(vec![ContentBlock::Image {
                    source: ImageSource {
                        source_type: "base64".to_string(),
                        media_type: Some("image/jpeg".to_string()),
                        data: Some("AAAA".to_string()),
                        url: None,
                    },
                }]),
            }],
            None,
        );

        let result = messages_to_chat(&req);
        let json = serde_json::to_value(&result.messages[0]).unwrap();
        assert_eq!(json["content"][0]["image_url"]["url"], "data:image/jpeg;base64,AAAA");
    }

    #[test]
    fn test_chat_system_messages_are_hoisted() {
        let req = chat_request(vec![
            ChatMessage::text("system", "Be terse."),
            ChatMessage::text("user", "hi"),
        ]);

        let result = chat_to_messages(&req);

        assert_eq!(result.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(result.system.unwrap().as_text(), "Be terse.");
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].role, Role::User);
    }

    #[test]
    fn test_chat_tool_round_trip_folds_tool_messages() {
        let mut assistant = ChatMessage::text("assistant", "");
        assistant.content = None;
        assistant.tool_calls = Some(vec![ChatToolCall {
            id: "call_1".to_string(),
            call_type: "function".to_string(),
            function: ChatToolCallFunction {
                name: "lookup".to_string(),
                arguments: r#"{"q":"rust"}"#.to_string(),
            },
        }]);
        let mut tool = ChatMessage::text("tool", "found it");
        tool.tool_call_id = Some("call_1".to_string());

        let req = chat_request(vec![ChatMessage::text("user", "search"), assistant, tool]);
        let result = chat_to_messages(&req);

        assert_eq!(result.messages.len(), 3);
        let blocks = result.messages[1].content.blocks();
        assert!(matches!(&blocks[0], ContentBlock::ToolUse { input, .. } if input["q"] == "rust"));
        let blocks = result.messages[2].content.blocks();
        assert!(
            matches!(&blocks[0], ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "call_1")
        );
    }

    #[test]
    fn test_chat_limits_prefer_max_completion_tokens() {
        let mut req = chat_request(vec![ChatMessage::text("user", "hi")]);
        req.max_tokens = Some(100);
        req.max_completion_tokens = Some(50);
        req.stop = Some(StopSequences::One("END".to_string()));

        let result = chat_to_messages(&req);
        assert_eq!(result.max_tokens, 50);
        assert_eq!(result.stop_sequences, Some(vec!["END".to_string()]));
    }
}
