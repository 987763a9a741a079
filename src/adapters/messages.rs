//! Messages family.

use super::http::{post_json, read_json, reject_error_event, sse_stream};
use super::{adapter_family, Adapter, AdapterFactory, AdapterOptions, EventStream};
use crate::error::Result;
use crate::providers::{Provider, ProviderKind};
use crate::translate::anthropic_types::{MessagesRequest, MessagesResponse, StreamEvent};
use crate::translate::openai_types::{ChatCompletionChunk, ChatCompletionResponse};
use crate::translate::request::messages_to_chat;
use crate::translate::response::chat_response_to_messages;
use crate::translate::streaming::ChatToMessagesStream;
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;

adapter_family! {
    #[derive(Debug)]
    pub enum MessagesAdapter {
        Anthropic(AnthropicMessages),
        OpenAi(OpenAiMessages),
    }
    request = MessagesRequest,
    response = MessagesResponse,
    event = StreamEvent,
}

impl AdapterFactory for MessagesAdapter {
    fn for_provider(provider: &Provider, client: Client) -> Self {
        match provider.kind {
            ProviderKind::Anthropic => Self::Anthropic(AnthropicMessages { client }),
            _ => Self::OpenAi(OpenAiMessages { client }),
        }
    }
}

fn cap_max_tokens(request: &mut MessagesRequest, options: AdapterOptions) {
    request.max_tokens = options
        .cap(Some(request.max_tokens))
        .unwrap_or(request.max_tokens);
}

/// Forwards to `/v1/messages` unchanged apart from model and token cap.
#[derive(Debug)]
pub struct AnthropicMessages {
    client: Client,
}

#[async_trait]
impl Adapter for AnthropicMessages {
    type Request = MessagesRequest;
    type Response = MessagesResponse;
    type Event = StreamEvent;

    async fn send_request(
        &self,
        provider: &Provider,
        mut request: MessagesRequest,
        options: AdapterOptions,
    ) -> Result<MessagesResponse> {
        cap_max_tokens(&mut request, options);
        request.stream = None;

        let response = post_json(&self.client, provider, "v1/messages", &request).await?;
        read_json(response).await
    }

    async fn send_request_streaming(
        &self,
        provider: &Provider,
        mut request: MessagesRequest,
        options: AdapterOptions,
    ) -> Result<EventStream<StreamEvent>> {
        cap_max_tokens(&mut request, options);
        request.stream = Some(true);

        let response = post_json(&self.client, provider, "v1/messages", &request).await?;
        let upstream = sse_stream::<StreamEvent>(response);
        Ok(Box::pin(upstream.map(|event| event.and_then(reject_error_event))))
    }
}

/// Serves Messages callers from an OpenAI-compatible `/chat/completions`.
#[derive(Debug)]
pub struct OpenAiMessages {
    client: Client,
}

#[async_trait]
impl Adapter for OpenAiMessages {
    type Request = MessagesRequest;
    type Response = MessagesResponse;
    type Event = StreamEvent;

    async fn send_request(
        &self,
        provider: &Provider,
        mut request: MessagesRequest,
        options: AdapterOptions,
    ) -> Result<MessagesResponse> {
        cap_max_tokens(&mut request, options);
        request.stream = None;

        let chat = messages_to_chat(&request);
        tracing::debug!(provider = %provider.name, model = %chat.model, "messages via chat completions");

        let response = post_json(&self.client, provider, "chat/completions", &chat).await?;
        let completion: ChatCompletionResponse = read_json(response).await?;
        Ok(chat_response_to_messages(&completion))
    }

    async fn send_request_streaming(
        &self,
        provider: &Provider,
        mut request: MessagesRequest,
        options: AdapterOptions,
    ) -> Result<EventStream<StreamEvent>> {
        cap_max_tokens(&mut request, options);
        request.stream = Some(true);

        let chat = messages_to_chat(&request);
        let response = post_json(&self.client, provider, "chat/completions", &chat).await?;
        let mut upstream = Box::pin(sse_stream::<ChatCompletionChunk>(response));
        let mut translator = ChatToMessagesStream::new(&request.model);

        Ok(Box::pin(try_stream! {
            while let Some(chunk) = upstream.next().await {
                for event in translator.process_chunk(&chunk?) {
                    yield event;
                }
            }
            for event in translator.finish() {
                yield event;
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::{provider, spawn_mock, sse_body};
    use crate::billing::Metered;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    fn messages_request() -> MessagesRequest {
        serde_json::from_value(json!({
            "model": "kimi-k2",
            "max_tokens": 8192,
            "system": "You are terse.",
            "messages": [{"role": "user", "content": "Ping"}],
            "anthropic_beta_field": {"kept": true}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn anthropic_passthrough_forwards_unknown_fields() {
        let seen = Arc::new(Mutex::new(Value::Null));
        let captured = seen.clone();
        let router = Router::new().route(
            "/v1/messages",
            post(move |Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = body;
                    Json(json!({
                        "id": "msg_1", "type": "message", "role": "assistant", "model": "claude",
                        "content": [{"type": "text", "text": "Pong"}],
                        "stop_reason": "end_turn",
                        "usage": {"input_tokens": 4, "output_tokens": 1}
                    }))
                }
            }),
        );
        let base = spawn_mock(router).await;
        let upstream = provider(ProviderKind::Anthropic, &base);

        let adapter = MessagesAdapter::for_provider(&upstream, Client::new());
        let response = adapter
            .send_request(&upstream, messages_request(), AdapterOptions { max_tokens: Some(1024) })
            .await
            .unwrap();

        let body = seen.lock().unwrap().clone();
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["anthropic_beta_field"]["kept"], true);
        assert_eq!(response.usage().unwrap().input, 4);
    }

    #[tokio::test]
    async fn anthropic_passthrough_keeps_server_tool_blocks() {
        let server_tool = json!({"type": "server_tool_use", "id": "srvtoolu_1",
                                 "name": "web_search", "input": {"query": "rust"}});
        let result_block = json!({"type": "web_search_tool_result", "tool_use_id": "srvtoolu_1",
                                  "content": []});
        let complete = json!({
            "id": "msg_1", "type": "message", "role": "assistant", "model": "claude",
            "content": [server_tool.clone(), {"type": "text", "text": "Found it"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 9, "output_tokens": 3}
        });
        let stream = sse_body(&[
            ("content_block_start", json!({"type": "content_block_start", "index": 0,
                                           "content_block": result_block.clone()})),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
            ("message_stop", json!({"type": "message_stop"})),
        ]);
        let router = Router::new().route(
            "/v1/messages",
            post(move |Json(body): Json<Value>| {
                let (complete, stream) = (complete.clone(), stream.clone());
                async move {
                    if body["stream"] == true {
                        stream.into_response()
                    } else {
                        Json(complete).into_response()
                    }
                }
            }),
        );
        let base = spawn_mock(router).await;
        let upstream = provider(ProviderKind::Anthropic, &base);
        let adapter = MessagesAdapter::for_provider(&upstream, Client::new());

        let response = adapter
            .send_request(&upstream, messages_request(), AdapterOptions::default())
            .await
            .unwrap();
        assert_eq!(response.content.len(), 2);
        assert_eq!(serde_json::to_value(&response.content[0]).unwrap(), server_tool);

        let events: Vec<StreamEvent> = adapter
            .send_request_streaming(&upstream, messages_request(), AdapterOptions::default())
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            StreamEvent::ContentBlockStart { content_block, .. }
                if serde_json::to_value(content_block).unwrap() == result_block
        ));
    }

    #[tokio::test]
    async fn compatible_provider_stream_becomes_messages_events() {
        let chunk = |content: Option<&str>, finish: Option<&str>| {
            json!({"id": "c1", "object": "chat.completion.chunk", "created": 0, "model": "kimi-k2",
                   "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": finish}]})
        };
        let body = sse_body(&[
            ("", chunk(Some("Po"), None)),
            ("", chunk(Some("ng"), None)),
            ("", chunk(None, Some("stop"))),
            ("", json!({"id": "c1", "choices": [],
                        "usage": {"prompt_tokens": 6, "completion_tokens": 2, "total_tokens": 8}})),
        ]) + "data: [DONE]\n\n";
        let router = Router::new().route("/chat/completions", post(move || async move { body }));
        let base = spawn_mock(router).await;
        let upstream = provider(ProviderKind::Fireworks, &base);

        let adapter = MessagesAdapter::for_provider(&upstream, Client::new());
        let events: Vec<StreamEvent> = adapter
            .send_request_streaming(&upstream, messages_request(), AdapterOptions::default())
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;

        let names: Vec<&str> = events.iter().map(StreamEvent::event_name).collect();
        assert_eq!(
            names,
            vec![
                "message_start",
                "ping",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop"
            ]
        );
        let usage = events[6].usage().unwrap();
        assert_eq!((usage.input, usage.output), (6, 2));
    }
}
