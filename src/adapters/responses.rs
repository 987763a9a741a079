//! Responses family. Requests reaching an adapter are already hydrated, so no
//! variant ever sees an unresolved `previous_response_id`.

use super::http::{post_json, read_json, sse_stream};
use super::{adapter_family, Adapter, AdapterFactory, AdapterOptions, EventStream};
use crate::error::Result;
use crate::providers::{Provider, ProviderKind};
use crate::translate::openai_types::{ChatCompletionChunk, ChatCompletionResponse};
use crate::translate::responses::{chat_to_response, responses_to_chat, ChatToResponsesStream};
use crate::translate::responses_types::{Response, ResponseCreateRequest, ResponseStreamEvent};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;

adapter_family! {
    #[derive(Debug)]
    pub enum ResponsesAdapter {
        Native(NativeResponses),
        ChatCompletions(ChatCompletionsResponses),
    }
    request = ResponseCreateRequest,
    response = Response,
    event = ResponseStreamEvent,
}

impl AdapterFactory for ResponsesAdapter {
    /// Native `/responses` for providers that implement it and have not
    /// opted out; chat completions otherwise.
    fn for_provider(provider: &Provider, client: Client) -> Self {
        match provider.kind {
            ProviderKind::OpenAi | ProviderKind::Fireworks if provider.responses => {
                Self::Native(NativeResponses { client })
            }
            _ => Self::ChatCompletions(ChatCompletionsResponses { client }),
        }
    }
}

#[derive(Debug)]
pub struct NativeResponses {
    client: Client,
}

#[async_trait]
impl Adapter for NativeResponses {
    type Request = ResponseCreateRequest;
    type Response = Response;
    type Event = ResponseStreamEvent;

    async fn send_request(
        &self,
        provider: &Provider,
        mut request: ResponseCreateRequest,
        options: AdapterOptions,
    ) -> Result<Response> {
        request.max_output_tokens = options.cap(request.max_output_tokens);
        request.stream = None;

        let response = post_json(&self.client, provider, "responses", &request).await?;
        read_json(response).await
    }

    async fn send_request_streaming(
        &self,
        provider: &Provider,
        mut request: ResponseCreateRequest,
        options: AdapterOptions,
    ) -> Result<EventStream<ResponseStreamEvent>> {
        request.max_output_tokens = options.cap(request.max_output_tokens);
        request.stream = Some(true);

        let response = post_json(&self.client, provider, "responses", &request).await?;
        // Forwarded verbatim so provider-specific fields survive
        let events = sse_stream::<serde_json::Value>(response)
            .map(|event| event.map(ResponseStreamEvent::Passthrough));
        Ok(Box::pin(events))
    }
}

#[derive(Debug)]
pub struct ChatCompletionsResponses {
    client: Client,
}

#[async_trait]
impl Adapter for ChatCompletionsResponses {
    type Request = ResponseCreateRequest;
    type Response = Response;
    type Event = ResponseStreamEvent;

    async fn send_request(
        &self,
        provider: &Provider,
        mut request: ResponseCreateRequest,
        options: AdapterOptions,
    ) -> Result<Response> {
        request.max_output_tokens = options.cap(request.max_output_tokens);
        request.stream = None;

        let chat = responses_to_chat(&request);
        let response = post_json(&self.client, provider, "chat/completions", &chat).await?;
        let completion: ChatCompletionResponse = read_json(response).await?;
        Ok(chat_to_response(&completion))
    }

    async fn send_request_streaming(
        &self,
        provider: &Provider,
        mut request: ResponseCreateRequest,
        options: AdapterOptions,
    ) -> Result<EventStream<ResponseStreamEvent>> {
        request.max_output_tokens = options.cap(request.max_output_tokens);
        request.stream = Some(true);

        let chat = responses_to_chat(&request);
        let response = post_json(&self.client, provider, "chat/completions", &chat).await?;
        let mut upstream = Box::pin(sse_stream::<ChatCompletionChunk>(response));
        let mut translator = ChatToResponsesStream::new(&request.model);

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
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    fn request() -> ResponseCreateRequest {
        serde_json::from_value(json!({
            "model": "gpt-4.1",
            "input": "Tell me a joke",
            "max_output_tokens": 900,
            "reasoning": {"effort": "low"}
        }))
        .unwrap()
    }

    #[test]
    fn opt_out_selects_chat_fallback() {
        let client = Client::new();
        let mut openai = provider(ProviderKind::OpenAi, "http://localhost");
        assert!(matches!(
            ResponsesAdapter::for_provider(&openai, client.clone()),
            ResponsesAdapter::Native(_)
        ));
        openai.responses = false;
        assert!(matches!(
            ResponsesAdapter::for_provider(&openai, client.clone()),
            ResponsesAdapter::ChatCompletions(_)
        ));
        let anthropic = provider(ProviderKind::Anthropic, "http://localhost");
        assert!(matches!(
            ResponsesAdapter::for_provider(&anthropic, client),
            ResponsesAdapter::ChatCompletions(_)
        ));
    }

    #[tokio::test]
    async fn native_stream_events_pass_through_untouched() {
        let body = sse_body(&[
            ("response.created", json!({"type": "response.created", "sequence_number": 0,
                "response": {"id": "resp_1", "model": "gpt-4.1", "status": "in_progress", "output": []}})),
            ("response.output_text.delta", json!({"type": "response.output_text.delta",
                "sequence_number": 1, "item_id": "msg_1", "output_index": 0, "content_index": 0,
                "delta": "Knock", "logprobs": []})),
            ("response.completed", json!({"type": "response.completed", "sequence_number": 2,
                "response": {"id": "resp_1", "model": "gpt-4.1", "status": "completed", "output": [],
                             "usage": {"input_tokens": 5, "output_tokens": 1, "total_tokens": 6}}})),
        ]);
        let seen = Arc::new(Mutex::new(Value::Null));
        let captured = seen.clone();
        let router = Router::new().route(
            "/responses",
            post(move |Json(req): Json<Value>| {
                let captured = captured.clone();
                let body = body.clone();
                async move {
                    *captured.lock().unwrap() = req;
                    body
                }
            }),
        );
        let base = spawn_mock(router).await;
        let upstream = provider(ProviderKind::OpenAi, &base);

        let adapter = ResponsesAdapter::for_provider(&upstream, Client::new());
        let events: Vec<ResponseStreamEvent> = adapter
            .send_request_streaming(&upstream, request(), AdapterOptions { max_tokens: Some(300) })
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;

        let sent = seen.lock().unwrap().clone();
        assert_eq!(sent["max_output_tokens"], 300);
        assert_eq!(sent["reasoning"]["effort"], "low");
        assert_eq!(sent["stream"], true);

        assert_eq!(events.len(), 3);
        let delta = serde_json::to_value(&events[1]).unwrap();
        assert_eq!(delta["sequence_number"], 1);
        assert!(delta.get("logprobs").is_some());
        assert_eq!(events[2].completed_response().unwrap().id, "resp_1");
    }

    #[tokio::test]
    async fn chat_fallback_builds_a_response() {
        let router = Router::new().route(
            "/chat/completions",
            post(|Json(req): Json<Value>| async move {
                assert_eq!(req["messages"][0]["content"], "Tell me a joke");
                assert!(req.get("reasoning").is_none());
                Json(json!({
                    "id": "chatcmpl-9", "created": 5, "model": "llama",
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "No."},
                                 "finish_reason": "stop"}],
                    "usage": {"prompt_tokens": 4, "completion_tokens": 1, "total_tokens": 5}
                }))
            }),
        );
        let base = spawn_mock(router).await;
        let upstream = provider(ProviderKind::Others, &base);

        let adapter = ResponsesAdapter::for_provider(&upstream, Client::new());
        let response = adapter
            .send_request(&upstream, request(), AdapterOptions::default())
            .await
            .unwrap();

        assert!(response.id.starts_with("resp_"));
        assert_eq!(response.output.len(), 1);
        assert_eq!(response.usage.unwrap().total_tokens, 5);
    }
}
