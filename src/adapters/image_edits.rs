//! Image edit family. Requests arrive as multipart and are re-sent as
//! multipart; only the OpenAI-compatible shape is supported.

use super::http::{authorize, check_status, read_json, sse_stream};
use super::{adapter_family, Adapter, AdapterFactory, AdapterOptions, EventStream};
use crate::error::Result;
use crate::providers::Provider;
use crate::translate::image_types::{ImageEditRequest, ImageStreamEvent, ImageUpload, ImagesResponse};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};

adapter_family! {
    #[derive(Debug)]
    pub enum ImageEditAdapter {
        OpenAi(OpenAiImageEdits),
    }
    request = ImageEditRequest,
    response = ImagesResponse,
    event = ImageStreamEvent,
}

impl AdapterFactory for ImageEditAdapter {
    fn for_provider(_provider: &Provider, client: Client) -> Self {
        Self::OpenAi(OpenAiImageEdits { client })
    }
}

#[derive(Debug)]
pub struct OpenAiImageEdits {
    client: Client,
}

fn file_part(upload: &ImageUpload) -> Result<Part> {
    let part = Part::bytes(upload.data.to_vec()).file_name(upload.file_name.clone());
    match upload.content_type.as_deref() {
        Some(content_type) => Ok(part.mime_str(content_type)?),
        None => Ok(part),
    }
}

/// One file goes out as `image`, several as repeated `image[]`.
fn build_form(request: &ImageEditRequest, stream: bool) -> Result<Form> {
    let image_field = if request.images.len() > 1 { "image[]" } else { "image" };

    let mut form = Form::new().text("prompt", request.prompt.clone());
    if let Some(ref model) = request.model {
        form = form.text("model", model.clone());
    }
    for image in &request.images {
        form = form.part(image_field, file_part(image)?);
    }
    if let Some(ref mask) = request.mask {
        form = form.part("mask", file_part(mask)?);
    }
    for (name, value) in &request.fields {
        form = form.text(name.clone(), value.clone());
    }
    if stream {
        form = form.text("stream", "true");
    }
    Ok(form)
}

impl OpenAiImageEdits {
    async fn post_form(&self, provider: &Provider, form: Form) -> Result<Response> {
        let url = provider.url("images/edits");
        tracing::debug!(provider = %provider.name, %url, "upstream multipart request");

        let builder = self.client.post(&url).multipart(form);
        let response = authorize(builder, provider).send().await?;
        check_status(response).await
    }
}

#[async_trait]
impl Adapter for OpenAiImageEdits {
    type Request = ImageEditRequest;
    type Response = ImagesResponse;
    type Event = ImageStreamEvent;

    async fn send_request(
        &self,
        provider: &Provider,
        request: ImageEditRequest,
        _options: AdapterOptions,
    ) -> Result<ImagesResponse> {
        let form = build_form(&request, false)?;
        let response = self.post_form(provider, form).await?;
        read_json(response).await
    }

    async fn send_request_streaming(
        &self,
        provider: &Provider,
        request: ImageEditRequest,
        _options: AdapterOptions,
    ) -> Result<EventStream<ImageStreamEvent>> {
        let form = build_form(&request, true)?;
        let response = self.post_form(provider, form).await?;
        Ok(Box::pin(sse_stream(response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::{provider, spawn_mock};
    use crate::providers::ProviderKind;
    use axum::extract::Multipart;
    use axum::routing::post;
    use axum::{Json, Router};
    use bytes::Bytes;
    use serde_json::{json, Value};

    fn upload(name: &str) -> ImageUpload {
        ImageUpload {
            file_name: name.to_string(),
            content_type: Some("image/png".to_string()),
            data: Bytes::from_static(b"\x89PNG"),
        }
    }

    async fn describe(mut multipart: Multipart) -> Json<Value> {
        let mut fields = Vec::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            let file = field.file_name().map(str::to_string);
            let text = field.text().await.unwrap_or_default();
            fields.push(json!({"name": name, "file": file, "text": text}));
        }
        Json(json!({"created": 3, "data": [{"b64_json": "RURJVA=="}], "fields": fields}))
    }

    #[tokio::test]
    async fn edit_response_is_decoded() {
        let base = spawn_mock(Router::new().route("/images/edits", post(describe))).await;
        let upstream = provider(ProviderKind::OpenAi, &base);

        let request = ImageEditRequest {
            model: Some("gpt-image-1".to_string()),
            prompt: "add a hat".to_string(),
            images: vec![upload("a.png")],
            ..ImageEditRequest::default()
        };

        let adapter = ImageEditAdapter::for_provider(&upstream, Client::new());
        let response = adapter
            .send_request(&upstream, request, AdapterOptions::default())
            .await
            .unwrap();
        assert_eq!(response.created, 3);
        assert_eq!(response.data[0].b64_json.as_deref(), Some("RURJVA=="));
    }

    #[tokio::test]
    async fn multiple_images_use_array_field_name() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::<(String, Option<String>)>::new()));
        let captured = seen.clone();
        let router = Router::new().route(
            "/images/edits",
            post(move |mut multipart: Multipart| {
                let captured = captured.clone();
                async move {
                    while let Some(field) = multipart.next_field().await.unwrap() {
                        let name = field.name().unwrap_or_default().to_string();
                        let file = field.file_name().map(str::to_string);
                        captured.lock().unwrap().push((name, file));
                    }
                    Json(json!({"data": []}))
                }
            }),
        );
        let base = spawn_mock(router).await;
        let upstream = provider(ProviderKind::Others, &base);

        let request = ImageEditRequest {
            model: Some("gpt-image-1".to_string()),
            prompt: "add a hat".to_string(),
            images: vec![upload("a.png"), upload("b.png")],
            mask: Some(upload("mask.png")),
            stream: None,
            fields: vec![("size".to_string(), "1024x1024".to_string())],
        };
        let adapter = ImageEditAdapter::for_provider(&upstream, Client::new());
        adapter
            .send_request(&upstream, request, AdapterOptions::default())
            .await
            .unwrap();

        let fields = seen.lock().unwrap().clone();
        let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["prompt", "model", "image[]", "image[]", "mask", "size"]);
        assert_eq!(fields[2].1.as_deref(), Some("a.png"));
        assert_eq!(fields[4].1.as_deref(), Some("mask.png"));
    }
}
