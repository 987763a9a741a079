//! Translation between the Responses API and Chat Completions, used when a
//! provider has no native `/responses` endpoint.
//!
//! The request side flattens conversation items into chat messages. The
//! response side rebuilds output items from the single chat choice and
//! synthesizes `resp_*`/`msg_*`/`fc_*` ids. [`ChatToResponsesStream`] does
//! the same incrementally, emitting the Responses event sequence.

use super::openai_types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatContent, ChatFunction,
    ChatMessage, ChatTool, ChatToolCall, ChatToolCallFunction, ChatUsage,
    ContentPart as ChatPart, ImageUrlDetail, StreamOptions,
};
use super::response::unix_now;
use super::responses_types::{
    ContentPart, ConversationItem, EasyMessage, ItemContent, Response, ResponseCreateRequest,
    ResponseEvent, ResponseItem, ResponseStreamEvent, ResponseTool, ResponseUsage,
};
use std::collections::HashMap;

fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

pub fn responses_to_chat(req: &ResponseCreateRequest) -> ChatCompletionRequest {
    let mut messages: Vec<ChatMessage> = Vec::new();

    if let Some(ref instructions) = req.instructions {
        messages.push(ChatMessage::text("system", instructions.clone()));
    }

    let items = req.input.clone().map(|i| i.into_items()).unwrap_or_default();
    for item in &items {
        match item {
            ConversationItem::Typed(ResponseItem::Message { role, content, .. })
            | ConversationItem::Message(EasyMessage { role, content }) => {
                messages.push(ChatMessage {
                    role: chat_role(role).to_string(),
                    content: Some(item_content_to_chat(content)),
                    tool_calls: None,
                    tool_call_id: None,
                    name: None,
                });
            }
            ConversationItem::Typed(ResponseItem::FunctionCall {
                call_id,
                name,
                arguments,
                ..
            }) => push_tool_call(
                &mut messages,
                ChatToolCall {
                    id: call_id.clone(),
                    call_type: "function".to_string(),
                    function: ChatToolCallFunction {
                        name: name.clone(),
                        arguments: arguments.clone(),
                    },
                },
            ),
            ConversationItem::Typed(ResponseItem::FunctionCallOutput { call_id, output }) => {
                messages.push(ChatMessage {
                    role: "tool".to_string(),
                    content: Some(ChatContent::Text(output.clone())),
                    tool_calls: None,
                    tool_call_id: Some(call_id.clone()),
                    name: None,
                });
            }
            // Reasoning and other provider-specific items have no chat form
            ConversationItem::Other(_) => {}
        }
    }

    // Built-in tools are hosted by the Responses API itself
    let tools = req
        .tools
        .as_ref()
        .map(|tools| {
            tools
                .iter()
                .filter_map(|tool| match tool {
                    ResponseTool::Function(t) => Some(ChatTool {
                        tool_type: "function".to_string(),
                        function: ChatFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.parameters.clone(),
                        },
                    }),
                    ResponseTool::BuiltIn(_) => None,
                })
                .collect::<Vec<_>>()
        })
        .filter(|tools| !tools.is_empty());

    ChatCompletionRequest {
        model: req.model.clone(),
        messages,
        max_tokens: req.max_output_tokens,
        max_completion_tokens: None,
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        stream_options: req.stream.filter(|s| *s).map(|_| StreamOptions {
            include_usage: true,
        }),
        tools,
        tool_choice: None,
        stop: None,
        user: req.user.clone(),
        extra: HashMap::new(),
    }
}

fn chat_role(role: &str) -> &str {
    match role {
        "developer" => "system",
        other => other,
    }
}

fn item_content_to_chat(content: &ItemContent) -> ChatContent {
    match content {
        ItemContent::Text(text) => ChatContent::Text(text.clone()),
        ItemContent::Parts(parts) => {
            let converted: Vec<ChatPart> = parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::InputText { text } | ContentPart::OutputText { text, .. } => {
                        Some(ChatPart::Text { text: text.clone() })
                    }
                    ContentPart::Refusal { refusal } => Some(ChatPart::Text {
                        text: refusal.clone(),
                    }),
                    ContentPart::InputImage { image_url, detail } => {
                        image_url.as_ref().map(|url| ChatPart::ImageUrl {
                            image_url: ImageUrlDetail {
                                url: url.clone(),
                                detail: detail.clone(),
                            },
                        })
                    }
                })
                .collect();
            if converted.iter().all(|p| matches!(p, ChatPart::Text { .. })) {
                ChatContent::Text(ChatContent::Parts(converted).as_text())
            } else {
                ChatContent::Parts(converted)
            }
        }
    }
}

/// Consecutive function calls belong to one assistant turn.
fn push_tool_call(messages: &mut Vec<ChatMessage>, call: ChatToolCall) {
    if let Some(last) = messages.last_mut() {
        if last.role == "assistant" {
            last.tool_calls.get_or_insert_with(Vec::new).push(call);
            return;
        }
    }
    messages.push(ChatMessage {
        role: "assistant".to_string(),
        content: None,
        tool_calls: Some(vec![call]),
        tool_call_id: None,
        name: None,
    });
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

pub fn chat_to_response(resp: &ChatCompletionResponse) -> Response {
    let mut output = Vec::new();

    if let Some(choice) = resp.choices.first() {
        if let Some(text) = choice.message.content.as_deref().filter(|t| !t.is_empty()) {
            output.push(message_item(new_id("msg"), text.to_string(), "completed"));
        }
        for call in choice.message.tool_calls.iter().flatten() {
            output.push(function_call_item(
                new_id("fc"),
                call.id.clone(),
                call.function.name.clone(),
                call.function.arguments.clone(),
                "completed",
            ));
        }
    }

    Response {
        id: new_id("resp"),
        object: "response".to_string(),
        created_at: if resp.created > 0 { resp.created } else { unix_now() },
        model: resp.model.clone(),
        status: "completed".to_string(),
        output,
        usage: resp.usage.as_ref().map(response_usage),
        previous_response_id: None,
        extra: HashMap::new(),
    }
}

fn response_usage(usage: &ChatUsage) -> ResponseUsage {
    ResponseUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        total_tokens: usage.prompt_tokens + usage.completion_tokens,
    }
}

fn message_item(id: String, text: String, status: &str) -> ConversationItem {
    let content = if text.is_empty() && status != "completed" {
        ItemContent::Parts(Vec::new())
    } else {
        ItemContent::Parts(vec![ContentPart::OutputText {
            text,
            annotations: Vec::new(),
        }])
    };
    ConversationItem::Typed(ResponseItem::Message {
        id: Some(id),
        role: "assistant".to_string(),
        content,
        status: Some(status.to_string()),
    })
}

fn function_call_item(
    id: String,
    call_id: String,
    name: String,
    arguments: String,
    status: &str,
) -> ConversationItem {
    ConversationItem::Typed(ResponseItem::FunctionCall {
        id: Some(id),
        call_id,
        name,
        arguments,
        status: Some(status.to_string()),
    })
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct OpenText {
    output_index: usize,
    item_id: String,
    text: String,
}

#[derive(Debug)]
struct OpenCall {
    output_index: usize,
    item_id: String,
    call_id: String,
    name: String,
    arguments: String,
}

/// Chat chunks in, Responses events out. `finish()` closes open items and
/// emits `response.completed` carrying the assembled output.
#[derive(Debug)]
pub struct ChatToResponsesStream {
    response_id: String,
    model: String,
    created_at: u64,
    started: bool,
    finished: bool,
    next_output_index: usize,
    text: Option<OpenText>,
    calls: Vec<Option<OpenCall>>,
    done: Vec<(usize, ConversationItem)>,
    usage: Option<ResponseUsage>,
}

impl ChatToResponsesStream {
    pub fn new(model: &str) -> Self {
        Self {
            response_id: new_id("resp"),
            model: model.to_string(),
            created_at: unix_now(),
            started: false,
            finished: false,
            next_output_index: 0,
            text: None,
            calls: Vec::new(),
            done: Vec::new(),
            usage: None,
        }
    }

    pub fn process_chunk(&mut self, chunk: &ChatCompletionChunk) -> Vec<ResponseStreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();

        if !self.started {
            self.started = true;
            if !chunk.model.is_empty() {
                self.model = chunk.model.clone();
            }
            let response = self.snapshot("in_progress", Vec::new());
            events.push(ResponseEvent::Created {
                response: response.clone(),
            });
            events.push(ResponseEvent::InProgress { response });
        }

        if let Some(ref usage) = chunk.usage {
            self.usage = Some(response_usage(usage));
        }

        if let Some(choice) = chunk.choices.first() {
            if let Some(delta) = choice.delta.content.as_deref().filter(|d| !d.is_empty()) {
                self.push_text(delta, &mut events);
            }

            for tc in choice.delta.tool_calls.iter().flatten() {
                let slot = usize::try_from(tc.index).unwrap_or(0);

                if let Some(ref call_id) = tc.id {
                    self.close_text(&mut events);
                    let output_index = self.next_output_index;
                    self.next_output_index += 1;
                    let call = OpenCall {
                        output_index,
                        item_id: new_id("fc"),
                        call_id: call_id.clone(),
                        name: tc
                            .function
                            .as_ref()
                            .and_then(|f| f.name.clone())
                            .unwrap_or_default(),
                        arguments: String::new(),
                    };
                    events.push(ResponseEvent::OutputItemAdded {
                        output_index,
                        item: function_call_item(
                            call.item_id.clone(),
                            call.call_id.clone(),
                            call.name.clone(),
                            String::new(),
                            "in_progress",
                        ),
                    });
                    if self.calls.len() <= slot {
                        self.calls.resize_with(slot + 1, || None);
                    }
                    self.calls[slot] = Some(call);
                }

                let args = tc
                    .function
                    .as_ref()
                    .and_then(|f| f.arguments.as_deref())
                    .filter(|a| !a.is_empty());
                if let (Some(args), Some(Some(call))) = (args, self.calls.get_mut(slot)) {
                    call.arguments.push_str(args);
                    events.push(ResponseEvent::FunctionCallArgumentsDelta {
                        item_id: call.item_id.clone(),
                        output_index: call.output_index,
                        delta: args.to_string(),
                    });
                }
            }
        }

        events.into_iter().map(ResponseStreamEvent::Known).collect()
    }

    pub fn finish(&mut self) -> Vec<ResponseStreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut events = Vec::new();
        if !self.started {
            self.started = true;
            events.push(ResponseEvent::Created {
                response: self.snapshot("in_progress", Vec::new()),
            });
        }

        self.close_text(&mut events);
        for call in std::mem::take(&mut self.calls).into_iter().flatten() {
            events.push(ResponseEvent::FunctionCallArgumentsDone {
                item_id: call.item_id.clone(),
                output_index: call.output_index,
                arguments: call.arguments.clone(),
            });
            let item = function_call_item(
                call.item_id,
                call.call_id,
                call.name,
                call.arguments,
                "completed",
            );
            events.push(ResponseEvent::OutputItemDone {
                output_index: call.output_index,
                item: item.clone(),
            });
            self.done.push((call.output_index, item));
        }

        self.done.sort_by_key(|(index, _)| *index);
        let output = self.done.drain(..).map(|(_, item)| item).collect();
        events.push(ResponseEvent::Completed {
            response: self.snapshot("completed", output),
        });

        events.into_iter().map(ResponseStreamEvent::Known).collect()
    }

    fn push_text(&mut self, delta: &str, events: &mut Vec<ResponseEvent>) {
        if self.text.is_none() {
            let output_index = self.next_output_index;
            self.next_output_index += 1;
            let item_id = new_id("msg");
            events.push(ResponseEvent::OutputItemAdded {
                output_index,
                item: message_item(item_id.clone(), String::new(), "in_progress"),
            });
            events.push(ResponseEvent::ContentPartAdded {
                item_id: item_id.clone(),
                output_index,
                content_index: 0,
                part: ContentPart::OutputText {
                    text: String::new(),
                    annotations: Vec::new(),
                },
            });
            self.text = Some(OpenText {
                output_index,
                item_id,
                text: String::new(),
            });
        }

        if let Some(ref mut open) = self.text {
            open.text.push_str(delta);
            events.push(ResponseEvent::OutputTextDelta {
                item_id: open.item_id.clone(),
                output_index: open.output_index,
                content_index: 0,
                delta: delta.to_string(),
            });
        }
    }

    fn close_text(&mut self, events: &mut Vec<ResponseEvent>) {
        let Some(open) = self.text.take() else {
            return;
        };
        events.push(ResponseEvent::OutputTextDone {
            item_id: open.item_id.clone(),
            output_index: open.output_index,
            content_index: 0,
            text: open.text.clone(),
        });
        events.push(ResponseEvent::ContentPartDone {
            item_id: open.item_id.clone(),
            output_index: open.output_index,
            content_index: 0,
            part: ContentPart::OutputText {
                text: open.text.clone(),
                annotations: Vec::new(),
            },
        });
        let item = message_item(open.item_id, open.text, "completed");
        events.push(ResponseEvent::OutputItemDone {
            output_index: open.output_index,
            item: item.clone(),
        });
        self.done.push((open.output_index, item));
    }

    fn snapshot(&self, status: &str, output: Vec<ConversationItem>) -> Response {
        Response {
            id: self.response_id.clone(),
            object: "response".to_string(),
            created_at: self.created_at,
            model: self.model.clone(),
            status: status.to_string(),
            output,
            usage: if status == "completed" {
                self.usage.clone()
            } else {
                None
            },
            previous_response_id: None,
            extra: HashMap::new(),
        }
    }
}
