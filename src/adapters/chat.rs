//! Chat Completions family.

use super::http::{post_json, read_json, reject_error_event, sse_stream};
use super::{adapter_family, Adapter, AdapterFactory, AdapterOptions, EventStream};
use crate::error::Result;
use crate::providers::{Provider, ProviderKind};
use crate::translate::anthropic_types::{MessagesResponse, StreamEvent};
use crate::translate::openai_types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, StreamOptions,
};
use crate::translate::request::chat_to_messages;
use crate::translate::response::messages_response_to_chat;
use crate::translate::streaming::MessagesToChatStream;
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;

adapter_family! {
    #[derive(Debug)]
    pub enum ChatAdapter {
        OpenAi(OpenAiChat),
        Anthropic(AnthropicChat),
    }
    request = ChatCompletionRequest,
    response = ChatCompletionResponse,
    event = ChatCompletionChunk,
}

impl AdapterFactory for ChatAdapter {
    fn for_provider(provider: &Provider, client: Client) -> Self {
        match provider.kind {
            ProviderKind::Anthropic => Self::Anthropic(AnthropicChat { client }),
            _ => Self::OpenAi(OpenAiChat { client }),
        }
    }
}

/// Forwards the canonical request to `/chat/completions`.
#[derive(Debug)]
pub struct OpenAiChat {
    client: Client,
}

fn cap_chat_request(request: &mut ChatCompletionRequest, options: AdapterOptions) {
    if request.max_completion_tokens.is_some() {
        request.max_completion_tokens = options.cap(request.max_completion_tokens);
    } else {
        request.max_tokens = options.cap(request.max_tokens);
    }
}

#[async_trait]
impl Adapter for OpenAiChat {
    type Request = ChatCompletionRequest;
    type Response = ChatCompletionResponse;
    type Event = ChatCompletionChunk;

    async fn send_request(
        &self,
        provider: &Provider,
        mut request: ChatCompletionRequest,
        options: AdapterOptions,
    ) -> Result<ChatCompletionResponse> {
        cap_chat_request(&mut request, options);
        request.stream = None;
        request.stream_options = None;

        let response = post_json(&self.client, provider, "chat/completions", &request).await?;
        read_json(response).await
    }

    async fn send_request_streaming(
        &self,
        provider: &Provider,
        mut request: ChatCompletionRequest,
        options: AdapterOptions,
    ) -> Result<EventStream<ChatCompletionChunk>> {
        cap_chat_request(&mut request, options);
        request.stream = Some(true);
        request.stream_options = Some(StreamOptions {
            include_usage: true,
        });

        let response = post_json(&self.client, provider, "chat/completions", &request).await?;
        Ok(Box::pin(sse_stream(response)))
    }
}

/// Translates chat to the Messages API and back.
#[derive(Debug)]
pub struct AnthropicChat {
    client: Client,
}

#[async_trait]
impl Adapter for AnthropicChat {
    type Request = ChatCompletionRequest;
    type Response = ChatCompletionResponse;
    type Event = ChatCompletionChunk;

    async fn send_request(
        &self,
        provider: &Provider,
        request: ChatCompletionRequest,
        options: AdapterOptions,
    ) -> Result<ChatCompletionResponse> {
        let mut native = chat_to_messages(&request);
        native.max_tokens = options.cap(Some(native.max_tokens)).unwrap_or(native.max_tokens);
        native.stream = None;

        let response = post_json(&self.client, provider, "v1/messages", &native).await?;
        let message: MessagesResponse = read_json(response).await?;
        Ok(messages_response_to_chat(&message))
    }

    async fn send_request_streaming(
        &self,
        provider: &Provider,
        request: ChatCompletionRequest,
        options: AdapterOptions,
    ) -> Result<EventStream<ChatCompletionChunk>> {
        let mut native = chat_to_messages(&request);
        native.max_tokens = options.cap(Some(native.max_tokens)).unwrap_or(native.max_tokens);
        native.stream = Some(true);

        let response = post_json(&self.client, provider, "v1/messages", &native).await?;
        let mut upstream = Box::pin(sse_stream::<StreamEvent>(response));
        let mut translator = MessagesToChatStream::new(&request.model);

        Ok(Box::pin(try_stream! {
            while let Some(event) = upstream.next().await {
                let event = reject_error_event(event?)?;
                for chunk in translator.process_event(&event) {
                    yield chunk;
                }
            }
            for chunk in translator.finish() {
                yield chunk;
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::{provider, spawn_mock, sse_body};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    fn chat_request(stream: bool) -> ChatCompletionRequest {
        serde_json::from_value(json!({
            "model": "claude-sonnet-4",
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Hello"}
            ],
            "max_tokens": 4000,
            "stream": stream
        }))
        .unwrap()
    }

    #[test]
    fn factory_falls_back_to_openai_compatible() {
        let client = Client::new();
        let others = provider(ProviderKind::Others, "http://localhost");
        assert!(matches!(ChatAdapter::for_provider(&others, client.clone()), ChatAdapter::OpenAi(_)));
        let google = provider(ProviderKind::Google, "http://localhost");
        assert!(matches!(ChatAdapter::for_provider(&google, client.clone()), ChatAdapter::OpenAi(_)));
        let anthropic = provider(ProviderKind::Anthropic, "http://localhost");
        assert!(matches!(ChatAdapter::for_provider(&anthropic, client), ChatAdapter::Anthropic(_)));
    }

    #[tokio::test]
    async fn openai_passthrough_caps_tokens_and_keeps_extra_fields() {
        let seen = Arc::new(Mutex::new(Value::Null));
        let captured = seen.clone();
        let router = Router::new().route(
            "/chat/completions",
            post(move |Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = body;
                    Json(json!({
                        "id": "chatcmpl-1", "object": "chat.completion", "created": 1,
                        "model": "gpt-4o-mini",
                        "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi"},
                                     "finish_reason": "stop"}],
                        "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
                    }))
                }
            }),
        );
        let base = spawn_mock(router).await;
        let upstream = provider(ProviderKind::OpenAi, &base);

        let mut request = chat_request(false);
        request.model = "gpt-4o-mini".to_string();
        request.extra.insert("seed".to_string(), json!(42));

        let adapter = ChatAdapter::for_provider(&upstream, Client::new());
        let response = adapter
            .send_request(&upstream, request, AdapterOptions { max_tokens: Some(256) })
            .await
            .unwrap();

        assert_eq!(response.choices[0].message.content.as_deref(), Some("Hi"));
        let body = seen.lock().unwrap().clone();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["seed"], 42);
        assert!(body.get("stream").is_none());
    }

    #[tokio::test]
    async fn anthropic_variant_translates_both_ways() {
        let seen = Arc::new(Mutex::new(Value::Null));
        let captured = seen.clone();
        let router = Router::new().route(
            "/v1/messages",
            post(move |Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = body;
                    Json(json!({
                        "id": "msg_abc", "type": "message", "role": "assistant",
                        "model": "claude-sonnet-4",
                        "content": [{"type": "text", "text": "Hello back"}],
                        "stop_reason": "end_turn",
                        "usage": {"input_tokens": 9, "output_tokens": 2}
                    }))
                }
            }),
        );
        let base = spawn_mock(router).await;
        let upstream = provider(ProviderKind::Anthropic, &base);

        let adapter = ChatAdapter::for_provider(&upstream, Client::new());
        let response = adapter
            .send_request(&upstream, chat_request(false), AdapterOptions::default())
            .await
            .unwrap();

        let body = seen.lock().unwrap().clone();
        assert_eq!(body["system"], "Be brief.");
        assert_eq!(body["max_tokens"], 4000);
        assert_eq!(body["messages"][0]["role"], "user");

        assert_eq!(response.id, "chatcmpl-abc");
        assert_eq!(response.choices[0].message.content.as_deref(), Some("Hello back"));
        assert_eq!(response.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(response.usage.unwrap().total_tokens, 11);
    }

    #[tokio::test]
    async fn anthropic_stream_becomes_chat_chunks() {
        let body = sse_body(&[
            ("message_start", json!({"type": "message_start", "message": {
                "id": "msg_s", "type": "message", "role": "assistant", "content": [],
                "model": "claude-sonnet-4", "usage": {"input_tokens": 5, "output_tokens": 1}}})),
            ("content_block_start", json!({"type": "content_block_start", "index": 0,
                "content_block": {"type": "text", "text": ""}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 0,
                "delta": {"type": "text_delta", "text": "Yo"}})),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
            ("message_delta", json!({"type": "message_delta",
                "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 3}})),
            ("message_stop", json!({"type": "message_stop"})),
        ]);
        let router = Router::new().route("/v1/messages", post(move || async move { body }));
        let base = spawn_mock(router).await;
        let upstream = provider(ProviderKind::Anthropic, &base);

        let adapter = ChatAdapter::for_provider(&upstream, Client::new());
        let chunks: Vec<ChatCompletionChunk> = adapter
            .send_request_streaming(&upstream, chat_request(true), AdapterOptions::default())
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        let text: String = chunks
            .iter()
            .filter_map(|c| c.choices.first()?.delta.content.clone())
            .collect();
        assert_eq!(text, "Yo");
        let finish = chunks.iter().find_map(|c| c.choices.first()?.finish_reason.clone());
        assert_eq!(finish.as_deref(), Some("stop"));
        assert_eq!(chunks.last().unwrap().usage.as_ref().unwrap().completion_tokens, 3);
    }

    #[tokio::test]
    async fn anthropic_error_event_fails_the_stream() {
        let body = sse_body(&[(
            "error",
            json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
        )]);
        let router = Router::new().route("/v1/messages", post(move || async move { body }));
        let base = spawn_mock(router).await;
        let upstream = provider(ProviderKind::Anthropic, &base);

        let adapter = ChatAdapter::for_provider(&upstream, Client::new());
        let mut stream = adapter
            .send_request_streaming(&upstream, chat_request(true), AdapterOptions::default())
            .await
            .unwrap();
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.normalized().1, "Overloaded");
    }

    #[tokio::test]
    async fn streaming_disabled_provider_fails_before_sending() {
        let mut upstream = provider(ProviderKind::OpenAi, "http://127.0.0.1:9");
        upstream.streaming = false;

        let adapter = ChatAdapter::for_provider(&upstream, Client::new());
        let result = adapter
            .send_request_streaming(&upstream, chat_request(true), AdapterOptions::default())
            .await;
        assert!(matches!(
            result,
            Err(crate::error::GatewayError::Unsupported { capability: "streaming", .. })
        ));
    }
}
