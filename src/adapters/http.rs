//! Upstream HTTP plumbing shared by all adapters: per-kind auth headers,
//! status checking and SSE decoding.

use crate::error::{truncate, GatewayError, Result};
use crate::providers::{Provider, ProviderKind};
use crate::translate::anthropic_types::StreamEvent;
use async_stream::try_stream;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Attach the credential the way each provider family expects it.
pub fn authorize(builder: RequestBuilder, provider: &Provider) -> RequestBuilder {
    match provider.kind {
        ProviderKind::Anthropic => builder
            .header("x-api-key", &provider.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION),
        ProviderKind::Google => builder.header("x-goog-api-key", &provider.api_key),
        ProviderKind::OpenAi | ProviderKind::Fireworks | ProviderKind::Others => {
            builder.bearer_auth(&provider.api_key)
        }
    }
}

/// POST a JSON body to `path` under the provider's base URL. Non-success
/// statuses come back as [`GatewayError::Upstream`].
pub async fn post_json<B>(
    client: &Client,
    provider: &Provider,
    path: &str,
    body: &B,
) -> Result<Response>
where
    B: Serialize + ?Sized + Sync,
{
    let url = provider.url(path);
    tracing::debug!(provider = %provider.name, %url, "upstream request");

    let builder = client.post(&url).json(body);
    let response = authorize(builder, provider).send().await?;
    check_status(response).await
}

pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status, body = %truncate(&body, 300), "upstream error");
    Err(GatewayError::upstream(status, &body))
}

/// Read the whole body and decode it, reporting a malformed body as a
/// translation error.
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        GatewayError::translation(format!(
            "Failed to parse provider response: {e}. Body: {}",
            truncate(&body, 300)
        ))
    })
}

/// Decode an SSE body into typed events, stopping at `[DONE]`.
///
/// A JSON body sent in place of a stream, or a first frame that does not
/// parse as `T`, is an upstream error. Unparseable frames after that are
/// skipped. Transport failures end the stream with an error.
pub fn sse_stream<T>(response: Response) -> impl Stream<Item = Result<T>> + Send + 'static
where
    T: DeserializeOwned + Send + 'static,
{
    let json_body = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    try_stream! {
        if json_body {
            let body = response.text().await.map_err(GatewayError::from)?;
            Err::<(), _>(GatewayError::upstream(502, &body))?;
        } else {
            let mut events = response.bytes_stream().eventsource();
            let mut yielded = false;

            while let Some(event) = events.next().await {
                let event = event
                    .map_err(|e| GatewayError::translation(format!("Upstream stream error: {e}")))?;

                let data = event.data.trim();
                if data.is_empty() {
                    continue;
                }
                if data == "[DONE]" {
                    break;
                }

                match serde_json::from_str::<T>(data) {
                    Ok(parsed) => {
                        yielded = true;
                        yield parsed;
                    }
                    Err(e) if !yielded => {
                        tracing::debug!(error = %e, "first stream frame is not a valid event");
                        Err::<(), _>(GatewayError::upstream(502, data))?;
                    }
                    Err(e) => {
                        tracing::debug!(event = %event.event, error = %e, "skipping unparseable frame");
                    }
                }
            }
        }
    }
}

/// Build the error for an `error` event a provider sent inside a 200 stream.
pub fn stream_error(error: &impl Serialize) -> GatewayError {
    let body = serde_json::json!({ "error": error }).to_string();
    GatewayError::upstream(502, &body)
}

/// Turn a Messages `error` event into an `Err` so it ends the stream like
/// any other upstream failure.
pub fn reject_error_event(event: StreamEvent) -> Result<StreamEvent> {
    match event {
        StreamEvent::Error { error } => Err(stream_error(&error)),
        other => Ok(other),
    }
}
