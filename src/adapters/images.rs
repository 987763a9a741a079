//! Image generation family.

use super::http::{post_json, read_json, sse_stream};
use super::{adapter_family, Adapter, AdapterFactory, AdapterOptions, EventStream};
use crate::error::{GatewayError, Result};
use crate::providers::{Provider, ProviderKind};
use crate::translate::google_types::{GenerateContentResponse, ImagenPredictResponse};
use crate::translate::image_types::{ImageGenerateRequest, ImageStreamEvent, ImagesResponse};
use crate::translate::images::{
    gemini_to_images_response, image_request_to_gemini, image_request_to_imagen,
    imagen_to_images_response,
};
use async_trait::async_trait;
use reqwest::Client;

/// Models with this prefix go to the Imagen `:predict` backend; everything
/// else is served by Gemini `:generateContent`.
const IMAGEN_PREFIX: &str = "imagen";

adapter_family! {
    #[derive(Debug)]
    pub enum ImageGenerationAdapter {
        OpenAi(OpenAiImages),
        Google(GoogleImages),
    }
    request = ImageGenerateRequest,
    response = ImagesResponse,
    event = ImageStreamEvent,
}

impl AdapterFactory for ImageGenerationAdapter {
    fn for_provider(provider: &Provider, client: Client) -> Self {
        match provider.kind {
            ProviderKind::Google => Self::Google(GoogleImages { client }),
            _ => Self::OpenAi(OpenAiImages { client }),
        }
    }
}

#[derive(Debug)]
pub struct OpenAiImages {
    client: Client,
}

#[async_trait]
impl Adapter for OpenAiImages {
    type Request = ImageGenerateRequest;
    type Response = ImagesResponse;
    type Event = ImageStreamEvent;

    async fn send_request(
        &self,
        provider: &Provider,
        mut request: ImageGenerateRequest,
        _options: AdapterOptions,
    ) -> Result<ImagesResponse> {
        request.stream = None;
        let response = post_json(&self.client, provider, "images/generations", &request).await?;
        read_json(response).await
    }

    async fn send_request_streaming(
        &self,
        provider: &Provider,
        mut request: ImageGenerateRequest,
        _options: AdapterOptions,
    ) -> Result<EventStream<ImageStreamEvent>> {
        request.stream = Some(true);
        let response = post_json(&self.client, provider, "images/generations", &request).await?;
        Ok(Box::pin(sse_stream(response)))
    }
}

/// Google image models, split between the Imagen and Gemini backends.
#[derive(Debug)]
pub struct GoogleImages {
    client: Client,
}

#[async_trait]
impl Adapter for GoogleImages {
    type Request = ImageGenerateRequest;
    type Response = ImagesResponse;
    type Event = ImageStreamEvent;

    fn supports_streaming(&self) -> bool {
        false
    }

    async fn send_request(
        &self,
        provider: &Provider,
        request: ImageGenerateRequest,
        _options: AdapterOptions,
    ) -> Result<ImagesResponse> {
        let model = request
            .model
            .as_deref()
            .ok_or_else(|| GatewayError::bad_request("Image generation requires a model"))?;

        if model.starts_with(IMAGEN_PREFIX) {
            let body = image_request_to_imagen(&request);
            let path = format!("models/{model}:predict");
            let response = post_json(&self.client, provider, &path, &body).await?;
            let predicted: ImagenPredictResponse = read_json(response).await?;
            Ok(imagen_to_images_response(predicted))
        } else {
            let body = image_request_to_gemini(&request);
            let path = format!("models/{model}:generateContent");
            let response = post_json(&self.client, provider, &path, &body).await?;
            let generated: GenerateContentResponse = read_json(response).await?;
            Ok(gemini_to_images_response(generated))
        }
    }

    async fn send_request_streaming(
        &self,
        provider: &Provider,
        _request: ImageGenerateRequest,
        _options: AdapterOptions,
    ) -> Result<EventStream<ImageStreamEvent>> {
        Err(GatewayError::unsupported(provider.name.clone(), "streaming"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::{provider, spawn_mock, sse_body};
    use axum::extract::Path;
    use axum::routing::post;
    use axum::{Json, Router};
    use futures::StreamExt;
    use serde_json::{json, Value};

    fn request(model: &str, quality: &str) -> ImageGenerateRequest {
        ImageGenerateRequest {
            prompt: "a red kite".to_string(),
            model: Some(model.to_string()),
            n: Some(1),
            quality: Some(quality.to_string()),
            ..ImageGenerateRequest::default()
        }
    }

    fn google_router() -> Router {
        Router::new().route(
            "/models/:call",
            post(|Path(call): Path<String>, Json(body): Json<Value>| async move {
                if call.ends_with(":predict") {
                    assert_eq!(body["parameters"]["sampleImageSize"], "2K");
                    Json(json!({"predictions": [{"bytesBase64Encoded": "SU1H", "mimeType": "image/png"}]}))
                } else {
                    assert_eq!(body["generationConfig"]["mediaResolution"], "MEDIA_RESOLUTION_LOW");
                    Json(json!({
                        "candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "R0VN"}}]}}],
                        "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 1290, "totalTokenCount": 1297}
                    }))
                }
            }),
        )
    }

    #[tokio::test]
    async fn google_dispatches_on_model_prefix() {
        let base = spawn_mock(google_router()).await;
        let upstream = provider(ProviderKind::Google, &base);
        let adapter = ImageGenerationAdapter::for_provider(&upstream, Client::new());

        let imagen = adapter
            .send_request(&upstream, request("imagen-4.0-generate-001", "hd"), AdapterOptions::default())
            .await
            .unwrap();
        assert_eq!(imagen.data[0].b64_json.as_deref(), Some("SU1H"));
        assert_eq!(imagen.created, 0);
        assert_eq!(imagen.output_format, "png");

        let gemini = adapter
            .send_request(&upstream, request("gemini-2.5-flash-image", "low"), AdapterOptions::default())
            .await
            .unwrap();
        assert_eq!(gemini.data[0].b64_json.as_deref(), Some("R0VN"));
        assert_eq!(gemini.usage.unwrap().output_tokens, 1290);
    }

    #[tokio::test]
    async fn google_streaming_is_refused_up_front() {
        let upstream = provider(ProviderKind::Google, "http://127.0.0.1:9");
        let adapter = ImageGenerationAdapter::for_provider(&upstream, Client::new());
        assert!(!adapter.supports_streaming());

        let result = adapter
            .send_request_streaming(&upstream, request("imagen-4.0", "hd"), AdapterOptions::default())
            .await;
        assert!(matches!(result, Err(GatewayError::Unsupported { .. })));
    }

    #[tokio::test]
    async fn google_without_model_is_a_bad_request() {
        let upstream = provider(ProviderKind::Google, "http://127.0.0.1:9");
        let adapter = ImageGenerationAdapter::for_provider(&upstream, Client::new());
        let mut req = request("x", "hd");
        req.model = None;

        let err = adapter
            .send_request(&upstream, req, AdapterOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn openai_stream_yields_typed_image_events() {
        let body = sse_body(&[
            ("image_generation.partial_image", json!({"type": "image_generation.partial_image",
                "b64_json": "AA", "partial_image_index": 0})),
            ("image_generation.completed", json!({"type": "image_generation.completed",
                "b64_json": "AAAA", "created_at": 9,
                "usage": {"input_tokens": 10, "output_tokens": 200, "total_tokens": 210}})),
        ]);
        let router = Router::new().route(
            "/images/generations",
            post(move |Json(req): Json<Value>| {
                let body = body.clone();
                async move {
                    assert_eq!(req["stream"], true);
                    body
                }
            }),
        );
        let base = spawn_mock(router).await;
        let upstream = provider(ProviderKind::OpenAi, &base);

        let adapter = ImageGenerationAdapter::for_provider(&upstream, Client::new());
        let events: Vec<ImageStreamEvent> = adapter
            .send_request_streaming(&upstream, request("gpt-image-1", "high"), AdapterOptions::default())
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_name(), "image_generation.completed");
        assert!(matches!(&events[1], ImageStreamEvent::GenerationCompleted(p) if p.created_at == 9));
    }
}
