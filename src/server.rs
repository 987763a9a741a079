use crate::auth::AuthContext;
use crate::config::LoggingMode;
use crate::error::{GatewayError, Result};
use crate::gateway::Gateway;
use crate::models;
use crate::translate::anthropic_types::MessagesRequest;
use crate::translate::image_types::{ImageEditRequest, ImageGenerateRequest, ImageUpload};
use crate::translate::openai_types::ChatCompletionRequest;
use crate::translate::responses_types::ResponseCreateRequest;

use axum::extract::{FromRequestParts, Multipart, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub gateway: Gateway,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            started_at: Instant::now(),
        }
    }

    fn error(&self, error: GatewayError) -> ApiError {
        ApiError {
            dev: self.gateway.config().server.logging == LoggingMode::Dev,
            error,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/openai/v1/chat/completions", post(handle_chat))
        .route("/openai/v1/responses", post(handle_responses))
        .route("/openai/v1/images/generations", post(handle_image_generations))
        .route("/openai/v1/images/edits", post(handle_image_edits))
        .route("/anthropic/v1/messages", post(handle_messages))
        .route("/v1/models", get(handle_list_models))
        .route("/v1/models/*id", get(handle_get_model))
        .route("/v1/providers", get(handle_list_providers))
        .route("/v1/providers/*id", get(handle_get_provider))
        .fallback(handle_not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error body sent to clients: `{"error": {...}}`, with the debug rendering
/// attached as `detail` in dev mode.
pub struct ApiError {
    error: GatewayError,
    dev: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.error.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut error = self.error.error_object();
        if self.dev {
            if let Some(object) = error.as_object_mut() {
                object.insert("detail".to_string(), json!(format!("{:?}", self.error)));
            }
        }
        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// The authenticated caller of a gateway endpoint.
pub struct Caller(pub AuthContext);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        AuthContext::from_headers(&parts.headers, &state.gateway.config().auth)
            .map(Caller)
            .map_err(|e| state.error(e))
    }
}

type HandlerResult = std::result::Result<Response, ApiError>;

fn parse_body<T: DeserializeOwned>(state: &AppState, body: &Bytes) -> std::result::Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::error!(error = %e, "failed to parse request");
        state.error(GatewayError::bad_request(format!("Invalid request body: {e}")))
    })
}

/// Encode canonical events as SSE. Each event is sent as JSON, named when
/// `event_name` gives a name. A mid-stream failure becomes one terminal
/// `error` event; otherwise `[DONE]` is appended when requested.
fn sse_response<S, T, F>(events: S, event_name: F, done_marker: bool) -> Response
where
    S: Stream<Item = Result<T>> + Send + 'static,
    T: Serialize + Send + 'static,
    F: Fn(&T) -> Option<String> + Send + 'static,
{
    let frames = async_stream::stream! {
        tokio::pin!(events);
        let mut failed = false;

        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    let frame = match event_name(&event) {
                        Some(name) => Event::default().event(name),
                        None => Event::default(),
                    };
                    match serde_json::to_string(&event) {
                        Ok(data) => yield Ok::<Event, Infallible>(frame.data(data)),
                        Err(e) => tracing::warn!(error = %e, "dropping unserializable event"),
                    }
                }
                Err(err) => {
                    let body = json!({ "error": err.error_object() });
                    yield Ok(Event::default().event("error").data(body.to_string()));
                    failed = true;
                    break;
                }
            }
        }

        if done_marker && !failed {
            yield Ok(Event::default().data("[DONE]"));
        }
    };

    Sse::new(frames)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn handle_chat(
    State(state): State<Arc<AppState>>,
    Caller(auth): Caller,
    body: Bytes,
) -> HandlerResult {
    let req: ChatCompletionRequest = parse_body(&state, &body)?;
    let streaming = req.stream.unwrap_or(false);
    tracing::info!(model = %req.model, streaming, messages = req.messages.len(), "chat completion request");

    if streaming {
        let stream = state
            .gateway
            .chat_stream(&auth, req)
            .await
            .map_err(|e| state.error(e))?;
        Ok(sse_response(stream, |_| None, true))
    } else {
        let completion = state.gateway.chat(&auth, req).await.map_err(|e| state.error(e))?;
        Ok(Json(completion).into_response())
    }
}

async fn handle_responses(
    State(state): State<Arc<AppState>>,
    Caller(auth): Caller,
    body: Bytes,
) -> HandlerResult {
    let req: ResponseCreateRequest = parse_body(&state, &body)?;
    let streaming = req.stream.unwrap_or(false);
    tracing::info!(
        model = %req.model,
        streaming,
        previous_response_id = req.previous_response_id.as_deref().unwrap_or("-"),
        "responses request"
    );

    if streaming {
        let stream = state
            .gateway
            .create_response_stream(&auth, req)
            .await
            .map_err(|e| state.error(e))?;
        Ok(sse_response(stream, |e| Some(e.event_name()), false))
    } else {
        let response = state
            .gateway
            .create_response(&auth, req)
            .await
            .map_err(|e| state.error(e))?;
        Ok(Json(response).into_response())
    }
}

async fn handle_messages(
    State(state): State<Arc<AppState>>,
    Caller(auth): Caller,
    body: Bytes,
) -> HandlerResult {
    let req: MessagesRequest = parse_body(&state, &body)?;
    let streaming = req.stream.unwrap_or(false);
    tracing::info!(model = %req.model, streaming, messages = req.messages.len(), "messages request");

    if streaming {
        let stream = state
            .gateway
            .messages_stream(&auth, req)
            .await
            .map_err(|e| state.error(e))?;
        Ok(sse_response(stream, |e| Some(e.event_name().to_string()), false))
    } else {
        let message = state
            .gateway
            .messages(&auth, req)
            .await
            .map_err(|e| state.error(e))?;
        Ok(Json(message).into_response())
    }
}

async fn handle_image_generations(
    State(state): State<Arc<AppState>>,
    Caller(auth): Caller,
    body: Bytes,
) -> HandlerResult {
    let req: ImageGenerateRequest = parse_body(&state, &body)?;
    let streaming = req.stream.unwrap_or(false);
    tracing::info!(model = req.model.as_deref().unwrap_or("-"), streaming, "image generation request");

    if streaming {
        let stream = state
            .gateway
            .generate_images_stream(&auth, req)
            .await
            .map_err(|e| state.error(e))?;
        Ok(sse_response(stream, |e| Some(e.event_name().to_string()), false))
    } else {
        let images = state
            .gateway
            .generate_images(&auth, req)
            .await
            .map_err(|e| state.error(e))?;
        Ok(Json(images).into_response())
    }
}

async fn read_edit_form(mut multipart: Multipart) -> Result<ImageEditRequest> {
    let bad = |e: axum::extract::multipart::MultipartError| {
        GatewayError::bad_request(format!("Invalid multipart body: {e}"))
    };
    let mut request = ImageEditRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" | "image[]" | "mask" => {
                let upload = ImageUpload {
                    file_name: field.file_name().unwrap_or("image.png").to_string(),
                    content_type: field.content_type().map(str::to_string),
                    data: field.bytes().await.map_err(bad)?,
                };
                if name == "mask" {
                    request.mask = Some(upload);
                } else {
                    request.images.push(upload);
                }
            }
            "prompt" => request.prompt = field.text().await.map_err(bad)?,
            "model" => request.model = Some(field.text().await.map_err(bad)?),
            "stream" => request.stream = Some(field.text().await.map_err(bad)? == "true"),
            _ => {
                let value = field.text().await.map_err(bad)?;
                request.fields.push((name, value));
            }
        }
    }

    if request.images.is_empty() {
        return Err(GatewayError::bad_request("At least one image is required"));
    }
    Ok(request)
}

async fn handle_image_edits(
    State(state): State<Arc<AppState>>,
    Caller(auth): Caller,
    multipart: Multipart,
) -> HandlerResult {
    let req = read_edit_form(multipart).await.map_err(|e| state.error(e))?;
    let streaming = req.stream.unwrap_or(false);
    tracing::info!(
        model = req.model.as_deref().unwrap_or("-"),
        streaming,
        images = req.images.len(),
        "image edit request"
    );

    if streaming {
        let stream = state
            .gateway
            .edit_images_stream(&auth, req)
            .await
            .map_err(|e| state.error(e))?;
        Ok(sse_response(stream, |e| Some(e.event_name().to_string()), false))
    } else {
        let images = state
            .gateway
            .edit_images(&auth, req)
            .await
            .map_err(|e| state.error(e))?;
        Ok(Json(images).into_response())
    }
}

async fn handle_list_models(State(state): State<Arc<AppState>>) -> Response {
    let models = models::list_models(state.gateway.config());
    Json(json!({ "models": models })).into_response()
}

async fn handle_get_model(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match models::get_model(state.gateway.config(), &id) {
        Some(model) => Json(model).into_response(),
        None => not_found("Model not found"),
    }
}

async fn handle_list_providers(State(state): State<Arc<AppState>>) -> Response {
    let providers = models::list_providers(state.gateway.config());
    Json(json!({ "providers": providers })).into_response()
}

async fn handle_get_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match models::get_provider(state.gateway.config(), &id) {
        Some(provider) => Json(provider).into_response(),
        None => not_found("Provider not found"),
    }
}

async fn handle_root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "message": "Welcome to llm-router!",
        "uptime": format_uptime(state.started_at.elapsed()),
        "apis_available": ["v1"],
    }))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_not_found() -> Response {
    not_found("Not Found")
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": { "message": message } })),
    )
        .into_response()
}

fn format_uptime(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;
    format!(
        "{days} days, {} hours, {} minutes, {} seconds",
        hours % 24,
        minutes % 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_broken_into_units() {
        let elapsed = Duration::from_secs(2 * 86_400 + 3 * 3_600 + 4 * 60 + 5);
        assert_eq!(format_uptime(elapsed), "2 days, 3 hours, 4 minutes, 5 seconds");
    }

    #[test]
    fn dev_mode_attaches_detail() {
        let dev = ApiError {
            error: GatewayError::upstream(429, r#"{"error":{"message":"slow","type":"rate_limit"}}"#),
            dev: true,
        }
        .into_response();
        assert_eq!(dev.status(), StatusCode::TOO_MANY_REQUESTS);

        let body = tokio_test::block_on(axum::body::to_bytes(dev.into_body(), usize::MAX)).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "rate_limit");
        assert!(json["error"]["detail"].as_str().unwrap().contains("Upstream"));

        let prod = ApiError {
            error: GatewayError::Exhausted,
            dev: false,
        }
        .into_response();
        let body = tokio_test::block_on(axum::body::to_bytes(prod.into_body(), usize::MAX)).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            json!({"error": {"message": "All providers failed to complete the request"}})
        );
    }
}
