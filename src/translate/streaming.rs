//! State machines for translating streams between the chat and messages
//! event schemas.
//!
//! [`ChatToMessagesStream`] consumes `ChatCompletionChunk`s and emits the
//! Messages event sequence (`message_start`, `content_block_*`,
//! `message_delta`, `message_stop`). [`MessagesToChatStream`] does the
//! reverse. Both are fed one upstream event at a time and flushed with
//! `finish()` when the upstream stream ends.

use super::anthropic_types::{
    Delta, DeltaUsage, MessageDeltaBody, MessagesResponse, ResponseContentBlock, StreamEvent, Usage,
};
use super::openai_types::{
    ChatCompletionChunk, ChatUsage, ChunkChoice, ChunkDelta, ChunkToolCall, ChunkToolCallFunction,
};
use super::response::{map_finish_reason, map_stop_reason, messages_usage_to_chat, unix_now};

#[derive(Debug, Clone, Copy)]
struct ActiveToolCall {
    block_index: usize,
}

/// Chat chunks in, Messages events out.
///
/// The terminal `message_delta` is held back until `finish()` so usage from
/// a trailing usage-only chunk still lands in it.
#[derive(Debug)]
pub struct ChatToMessagesStream {
    model: String,
    msg_id: String,
    started: bool,
    finished: bool,
    next_block_index: usize,
    text_block: Option<usize>,
    active_tool_calls: Vec<Option<ActiveToolCall>>,
    stop_reason: Option<String>,
    input_tokens: u64,
    output_tokens: u64,
}

impl ChatToMessagesStream {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            msg_id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            started: false,
            finished: false,
            next_block_index: 0,
            text_block: None,
            active_tool_calls: Vec::new(),
            stop_reason: None,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    pub fn process_chunk(&mut self, chunk: &ChatCompletionChunk) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();

        if let Some(ref usage) = chunk.usage {
            self.input_tokens = usage.prompt_tokens;
            self.output_tokens = usage.completion_tokens;
        }

        if !self.started {
            events.push(self.make_message_start());
            events.push(StreamEvent::Ping);
            self.started = true;
        }

        let Some(choice) = chunk.choices.first() else {
            return events;
        };

        // Reasoning models stream chain-of-thought in `reasoning_content`
        let text = choice
            .delta
            .content
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| {
                choice
                    .delta
                    .reasoning_content
                    .as_deref()
                    .filter(|s| !s.is_empty())
            });

        if let Some(text) = text {
            let index = match self.text_block {
                Some(index) => index,
                None => {
                    // Blocks are sequential: tool input is complete once text resumes
                    events.append(&mut self.close_tool_blocks());
                    let index = self.open_block();
                    events.push(StreamEvent::ContentBlockStart {
                        index,
                        content_block: ResponseContentBlock::Text {
                            text: String::new(),
                        },
                    });
                    self.text_block = Some(index);
                    index
                }
            };

            events.push(StreamEvent::ContentBlockDelta {
                index,
                delta: Delta::TextDelta {
                    text: text.to_string(),
                },
            });
        }

        for tc in choice.delta.tool_calls.iter().flatten() {
            let slot = usize::try_from(tc.index).unwrap_or(usize::MAX);

            if let Some(ref id) = tc.id {
                if let Some(index) = self.text_block.take() {
                    events.push(StreamEvent::ContentBlockStop { index });
                }

                let block_index = self.open_block();
                events.push(StreamEvent::ContentBlockStart {
                    index: block_index,
                    content_block: ResponseContentBlock::ToolUse {
                        id: id.clone(),
                        name: tc
                            .function
                            .as_ref()
                            .and_then(|f| f.name.clone())
                            .unwrap_or_default(),
                        input: serde_json::Value::Object(serde_json::Map::new()),
                    },
                });

                if slot != usize::MAX {
                    if self.active_tool_calls.len() <= slot {
                        self.active_tool_calls.resize(slot + 1, None);
                    }
                    self.active_tool_calls[slot] = Some(ActiveToolCall { block_index });
                }
            }

            let args = tc
                .function
                .as_ref()
                .and_then(|f| f.arguments.as_deref())
                .filter(|a| !a.is_empty());

            if let Some(args) = args {
                let active = self.active_tool_calls.get(slot).copied().flatten();
                if let Some(active) = active {
                    events.push(StreamEvent::ContentBlockDelta {
                        index: active.block_index,
                        delta: Delta::InputJsonDelta {
                            partial_json: args.to_string(),
                        },
                    });
                }
            }
        }

        if let Some(ref reason) = choice.finish_reason {
            self.stop_reason = Some(map_finish_reason(reason));
            events.append(&mut self.close_blocks());
        }

        events
    }

    /// Flush when the upstream stream ends.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut events = Vec::new();
        if !self.started {
            events.push(self.make_message_start());
            self.started = true;
        }
        events.append(&mut self.close_blocks());

        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(
                    self.stop_reason
                        .take()
                        .unwrap_or_else(|| "end_turn".to_string()),
                ),
                stop_sequence: None,
            },
            usage: DeltaUsage {
                output_tokens: self.output_tokens,
                input_tokens: Some(self.input_tokens),
            },
        });
        events.push(StreamEvent::MessageStop);

        events
    }

    fn open_block(&mut self) -> usize {
        let index = self.next_block_index;
        self.next_block_index += 1;
        index
    }

    fn close_blocks(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if let Some(index) = self.text_block.take() {
            events.push(StreamEvent::ContentBlockStop { index });
        }
        events.append(&mut self.close_tool_blocks());
        events
    }

    fn close_tool_blocks(&mut self) -> Vec<StreamEvent> {
        self.active_tool_calls
            .drain(..)
            .flatten()
            .map(|active| StreamEvent::ContentBlockStop {
                index: active.block_index,
            })
            .collect()
    }

    fn make_message_start(&self) -> StreamEvent {
        StreamEvent::MessageStart {
            message: MessagesResponse {
                id: self.msg_id.clone(),
                response_type: "message".to_string(),
                role: "assistant".to_string(),
                content: Vec::new(),
                model: self.model.clone(),
                stop_reason: None,
                stop_sequence: None,
                usage: Usage {
                    input_tokens: self.input_tokens,
                    output_tokens: 0,
                    cache_creation_input_tokens: None,
                    cache_read_input_tokens: None,
                },
            },
        }
    }
}

/// Messages events in, chat chunks out.
#[derive(Debug)]
pub struct MessagesToChatStream {
    id: String,
    model: String,
    created: u64,
    role_sent: bool,
    finished: bool,
    /// Messages block index -> chat tool call index
    tool_blocks: Vec<(usize, u64)>,
    next_tool_index: u64,
    usage: Usage,
    stop_reason: Option<String>,
}

impl MessagesToChatStream {
    pub fn new(model: &str) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            model: model.to_string(),
            created: unix_now(),
            role_sent: false,
            finished: false,
            tool_blocks: Vec::new(),
            next_tool_index: 0,
            usage: Usage::default(),
            stop_reason: None,
        }
    }

    pub fn process_event(&mut self, event: &StreamEvent) -> Vec<ChatCompletionChunk> {
        if self.finished {
            return Vec::new();
        }

        match event {
            StreamEvent::MessageStart { message } => {
                self.id = format!("chatcmpl-{}", message.id.trim_start_matches("msg_"));
                if !message.model.is_empty() {
                    self.model = message.model.clone();
                }
                self.usage = message.usage.clone();
                self.role_sent = true;
                vec![self.chunk(
                    ChunkDelta {
                        role: Some("assistant".to_string()),
                        content: Some(String::new()),
                        ..ChunkDelta::default()
                    },
                    None,
                )]
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block: ResponseContentBlock::ToolUse { id, name, .. },
            } => {
                let tool_index = self.next_tool_index;
                self.next_tool_index += 1;
                self.tool_blocks.push((*index, tool_index));
                vec![self.tool_chunk(ChunkToolCall {
                    index: tool_index,
                    id: Some(id.clone()),
                    call_type: Some("function".to_string()),
                    function: Some(ChunkToolCallFunction {
                        name: Some(name.clone()),
                        arguments: Some(String::new()),
                    }),
                })]
            }
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                Delta::TextDelta { text } => vec![self.chunk(
                    ChunkDelta {
                        content: Some(text.clone()),
                        ..ChunkDelta::default()
                    },
                    None,
                )],
                Delta::ThinkingDelta { thinking } => vec![self.chunk(
                    ChunkDelta {
                        reasoning_content: Some(thinking.clone()),
                        ..ChunkDelta::default()
                    },
                    None,
                )],
                Delta::InputJsonDelta { partial_json } => {
                    let Some(&(_, tool_index)) =
                        self.tool_blocks.iter().find(|(block, _)| block == index)
                    else {
                        return Vec::new();
                    };
                    vec![self.tool_chunk(ChunkToolCall {
                        index: tool_index,
                        id: None,
                        call_type: None,
                        function: Some(ChunkToolCallFunction {
                            name: None,
                            arguments: Some(partial_json.clone()),
                        }),
                    })]
                }
                Delta::SignatureDelta { .. } | Delta::Other(_) => Vec::new(),
            },
            StreamEvent::MessageDelta { delta, usage } => {
                self.usage.output_tokens = usage.output_tokens;
                if let Some(input) = usage.input_tokens {
                    self.usage.input_tokens = input;
                }
                self.stop_reason = delta.stop_reason.clone();
                Vec::new()
            }
            StreamEvent::MessageStop => self.finish(),
            StreamEvent::ContentBlockStart { .. }
            | StreamEvent::ContentBlockStop { .. }
            | StreamEvent::Ping
            | StreamEvent::Error { .. }
            | StreamEvent::Other(_) => Vec::new(),
        }
    }

    /// Emit the final chunk carrying `finish_reason`, then a usage-only chunk.
    pub fn finish(&mut self) -> Vec<ChatCompletionChunk> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let reason = self
            .stop_reason
            .as_deref()
            .map_or_else(|| "stop".to_string(), map_stop_reason);

        let mut last = self.chunk(ChunkDelta::default(), Some(reason));
        if !self.role_sent {
            last.choices[0].delta.role = Some("assistant".to_string());
        }

        let mut usage_chunk = self.chunk(ChunkDelta::default(), None);
        usage_chunk.choices.clear();
        usage_chunk.usage = Some(self.chat_usage());

        vec![last, usage_chunk]
    }

    fn chat_usage(&self) -> ChatUsage {
        messages_usage_to_chat(&self.usage)
    }

    fn tool_chunk(&self, call: ChunkToolCall) -> ChatCompletionChunk {
        self.chunk(
            ChunkDelta {
                tool_calls: Some(vec![call]),
                ..ChunkDelta::default()
            },
            None,
        )
    }

    fn chunk(&self, delta: ChunkDelta, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage: None,
        }
    }
}
