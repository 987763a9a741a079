use super::anthropic_types::{MessagesResponse, ResponseContentBlock, Usage};
use super::openai_types::{
    ChatCompletionResponse, ChatToolCall, ChatToolCallFunction, ChatUsage, Choice, ChoiceMessage,
    PromptTokensDetails,
};

/// Translate a Chat Completion response into a Messages response.
pub fn chat_response_to_messages(resp: &ChatCompletionResponse) -> MessagesResponse {
    let choice = resp.choices.first();

    let mut content: Vec<ResponseContentBlock> = Vec::new();

    if let Some(c) = choice {
        if let Some(ref text) = c.message.content {
            if !text.is_empty() {
                content.push(ResponseContentBlock::Text { text: text.clone() });
            }
        }

        for tc in c.message.tool_calls.iter().flatten() {
            let input: serde_json::Value =
                serde_json::from_str(&tc.function.arguments).unwrap_or(serde_json::Value::Null);

            content.push(ResponseContentBlock::ToolUse {
                id: tc.id.clone(),
                name: tc.function.name.clone(),
                input,
            });
        }
    }

    // Messages clients expect at least one block
    if content.is_empty() {
        content.push(ResponseContentBlock::Text {
            text: String::new(),
        });
    }

    let stop_reason = choice
        .and_then(|c| c.finish_reason.as_deref())
        .map_or_else(|| "end_turn".to_string(), map_finish_reason);

    let usage = resp.usage.as_ref().map_or_else(Usage::default, |u| {
        let cached = u.prompt_tokens_details.as_ref().map(|d| d.cached_tokens);
        Usage {
            input_tokens: u.prompt_tokens.saturating_sub(cached.unwrap_or(0)),
            output_tokens: u.completion_tokens,
            cache_creation_input_tokens: None,
            cache_read_input_tokens: cached.filter(|c| *c > 0),
        }
    });

    MessagesResponse {
        id: format!("msg_{}", resp.id.trim_start_matches("chatcmpl-")),
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: resp.model.clone(),
        stop_reason: Some(stop_reason),
        stop_sequence: None,
        usage,
    }
}

/// Translate a Messages response into a Chat Completion response. Thinking
/// blocks surface as `reasoning_content`; redacted thinking is dropped.
pub fn messages_response_to_chat(resp: &MessagesResponse) -> ChatCompletionResponse {
    let mut text = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();

    for block in &resp.content {
        match block {
            ResponseContentBlock::Text { text: t } => text.push_str(t),
            ResponseContentBlock::Thinking { thinking, .. } => reasoning.push_str(thinking),
            ResponseContentBlock::ToolUse { id, name, input } => tool_calls.push(ChatToolCall {
                id: id.clone(),
                call_type: "function".to_string(),
                function: ChatToolCallFunction {
                    name: name.clone(),
                    arguments: input.to_string(),
                },
            }),
            ResponseContentBlock::RedactedThinking { .. } | ResponseContentBlock::Other(_) => {}
        }
    }

    ChatCompletionResponse {
        id: format!("chatcmpl-{}", resp.id.trim_start_matches("msg_")),
        object: "chat.completion".to_string(),
        created: unix_now(),
        model: resp.model.clone(),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: "assistant".to_string(),
                content: (!text.is_empty() || tool_calls.is_empty()).then_some(text),
                reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            finish_reason: Some(
                resp.stop_reason
                    .as_deref()
                    .map_or_else(|| "stop".to_string(), map_stop_reason),
            ),
        }],
        usage: Some(messages_usage_to_chat(&resp.usage)),
    }
}

/// Cache reads and writes both count toward the prompt; reads are also
/// reported as cached tokens.
pub fn messages_usage_to_chat(usage: &Usage) -> ChatUsage {
    let reads = usage.cache_read_input_tokens.unwrap_or(0);
    let writes = usage.cache_creation_input_tokens.unwrap_or(0);
    let mut out = ChatUsage::new(usage.input_tokens + reads + writes, usage.output_tokens);
    if reads > 0 {
        out.prompt_tokens_details = Some(PromptTokensDetails {
            cached_tokens: reads,
        });
    }
    out
}

/// Map a chat `finish_reason` to a Messages `stop_reason`.
pub fn map_finish_reason(reason: &str) -> String {
    match reason {
        "stop" | "content_filter" => "end_turn".to_string(),
        "length" => "max_tokens".to_string(),
        "tool_calls" | "function_call" => "tool_use".to_string(),
        other => other.to_string(),
    }
}

/// Map a Messages `stop_reason` to a chat `finish_reason`.
pub fn map_stop_reason(reason: &str) -> String {
    match reason {
        "end_turn" | "stop_sequence" | "pause_turn" => "stop".to_string(),
        "max_tokens" => "length".to_string(),
        "tool_use" => "tool_calls".to_string(),
        "refusal" => "content_filter".to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}
