//! Failover orchestration.
//!
//! A request names a logical model. The gateway resolves it to an ordered
//! binding list and tries each binding in turn until one succeeds. Every
//! attempted binding produces exactly one billing record; bindings whose
//! provider is not configured are skipped without a record.
//!
//! Streaming attempts are primed: the first upstream event is pulled before
//! the attempt counts as a success, so a provider that fails before producing
//! output still triggers failover. After that the stream is committed.

use crate::adapters::{
    Adapter, AdapterFactory, AdapterOptions, ChatAdapter, EventStream, ImageEditAdapter,
    ImageGenerationAdapter, MessagesAdapter, ResponsesAdapter,
};
use crate::auth::AuthContext;
use crate::billing::{ApiCallRecord, BillingRecorder, Metered, TimeKeeper, Usage};
use crate::config::{GatewayConfig, LoggingMode, ProviderBinding};
use crate::error::{GatewayError, Result};
use crate::providers::Provider;
use crate::store::{ResponsesStore, ResponsesStoreFactory};
use crate::translate::anthropic_types::{MessagesRequest, MessagesResponse, StreamEvent};
use crate::translate::image_types::{
    ImageEditRequest, ImageGenerateRequest, ImageStreamEvent, ImagesResponse,
};
use crate::translate::openai_types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse,
};
use crate::translate::responses_types::{Response, ResponseCreateRequest, ResponseStreamEvent};
use futures::{Stream, StreamExt};
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A canonical request whose model field the gateway rewrites per binding.
pub trait RoutedRequest: Clone + Send + 'static {
    /// The logical model the caller asked for.
    fn requested_model(&self) -> &str;
    fn set_model(&mut self, model: &str);
}

impl RoutedRequest for ChatCompletionRequest {
    fn requested_model(&self) -> &str {
        &self.model
    }
    fn set_model(&mut self, model: &str) {
        self.model = model.to_string();
    }
}

impl RoutedRequest for MessagesRequest {
    fn requested_model(&self) -> &str {
        &self.model
    }
    fn set_model(&mut self, model: &str) {
        self.model = model.to_string();
    }
}

impl RoutedRequest for ResponseCreateRequest {
    fn requested_model(&self) -> &str {
        &self.model
    }
    fn set_model(&mut self, model: &str) {
        self.model = model.to_string();
    }
}

impl RoutedRequest for ImageGenerateRequest {
    fn requested_model(&self) -> &str {
        self.model.as_deref().unwrap_or_default()
    }
    fn set_model(&mut self, model: &str) {
        self.model = Some(model.to_string());
    }
}

impl RoutedRequest for ImageEditRequest {
    fn requested_model(&self) -> &str {
        self.model.as_deref().unwrap_or_default()
    }
    fn set_model(&mut self, model: &str) {
        self.model = Some(model.to_string());
    }
}

/// One binding being tried: the resolved provider (credential already
/// substituted for BYOK callers), the binding, and its clock.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub provider: Provider,
    pub binding: ProviderBinding,
    timer: TimeKeeper,
}

impl Attempt {
    fn options(&self) -> AdapterOptions {
        AdapterOptions {
            max_tokens: self.binding.max_tokens,
        }
    }

    fn record(
        &mut self,
        billing: &dyn BillingRecorder,
        status: u16,
        usage: Option<Usage>,
        error: Option<String>,
    ) {
        self.timer.record();
        tracing::info!(
            provider = %self.provider.name,
            model = %self.binding.model,
            status,
            latency_ms = self.timer.elapsed_ms(),
            "attempt finished"
        );
        billing.record_api_call(ApiCallRecord::new(
            self.provider.name.clone(),
            status,
            &self.timer,
            usage,
            self.binding.pricing.as_ref(),
            error,
        ));
    }
}

pub struct Gateway {
    config: GatewayConfig,
    client: Client,
    billing: Arc<dyn BillingRecorder>,
    stores: ResponsesStoreFactory,
}

impl Gateway {
    pub fn new(config: GatewayConfig, billing: Arc<dyn BillingRecorder>) -> Self {
        Self {
            config,
            client: Client::new(),
            billing,
            stores: ResponsesStoreFactory::new(),
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn responses_store(&self) -> Arc<dyn ResponsesStore> {
        self.stores.get_store(&self.config.responses_store)
    }

    /// The ordered failover loop shared by every family and mode.
    async fn failover<A, T, F, Fut>(
        &self,
        auth: &AuthContext,
        request: A::Request,
        mut call: F,
    ) -> Result<T>
    where
        A: AdapterFactory,
        A::Request: RoutedRequest,
        F: FnMut(A, Attempt, A::Request) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let requested = request.requested_model().to_string();
        let model = self
            .config
            .resolve_model(&requested, auth)
            .ok_or_else(|| GatewayError::ModelNotFound {
                model: requested.clone(),
            })?;

        let mut last_error = None;

        for binding in &model.providers {
            let Some(provider) = self.config.provider(&binding.provider) else {
                tracing::debug!(provider = %binding.provider, "binding skipped: provider not configured");
                continue;
            };
            let provider = match auth.byok() {
                Some(key) => provider.with_api_key(key),
                None => provider,
            };

            let mut request = request.clone();
            request.set_model(&binding.model);

            let adapter = A::for_provider(&provider, self.client.clone());
            let mut attempt = Attempt {
                provider,
                binding: binding.clone(),
                timer: TimeKeeper::started(),
            };
            tracing::debug!(model = %requested, provider = %attempt.provider.name, "attempting binding");

            match call(adapter, attempt.clone(), request).await {
                Ok(output) => return Ok(output),
                Err(err) => {
                    let (status, message) = err.normalized();
                    attempt.record(self.billing.as_ref(), status, None, Some(message.clone()));
                    tracing::warn!(
                        provider = %attempt.provider.name,
                        status,
                        error = %message,
                        "provider failed, trying next binding"
                    );
                    if self.config.server.logging == LoggingMode::Dev {
                        tracing::error!(error = ?err, "attempt error detail");
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or(GatewayError::Exhausted))
    }

    /// Run a non-streaming request through the binding list.
    pub async fn complete<A>(&self, auth: &AuthContext, request: A::Request) -> Result<A::Response>
    where
        A: AdapterFactory,
        A::Request: RoutedRequest,
        A::Response: Metered,
    {
        let billing = self.billing.clone();
        self.failover::<A, _, _, _>(auth, request, move |adapter, mut attempt, request| {
            let billing = billing.clone();
            async move {
                let response = adapter
                    .send_request(&attempt.provider, request, attempt.options())
                    .await?;
                attempt.record(billing.as_ref(), 200, response.usage(), None);
                Ok(response)
            }
        })
        .await
    }

    /// Open a stream on the first binding that produces an event.
    pub async fn stream<A>(
        &self,
        auth: &AuthContext,
        request: A::Request,
    ) -> Result<MeteredStream<A::Event>>
    where
        A: AdapterFactory,
        A::Request: RoutedRequest,
        A::Event: Metered + Unpin,
    {
        let billing = self.billing.clone();
        self.failover::<A, _, _, _>(auth, request, move |adapter, attempt, request| {
            let billing = billing.clone();
            async move {
                let mut events = adapter
                    .send_request_streaming(&attempt.provider, request, attempt.options())
                    .await?;
                let Some(first) = events.next().await.transpose()? else {
                    return Err(GatewayError::upstream(502, "Provider returned an empty stream"));
                };
                Ok(MeteredStream::new(Some(first), events, attempt, billing))
            }
        })
        .await
    }

    pub async fn chat(
        &self,
        auth: &AuthContext,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        self.complete::<ChatAdapter>(auth, request).await
    }

    pub async fn chat_stream(
        &self,
        auth: &AuthContext,
        request: ChatCompletionRequest,
    ) -> Result<MeteredStream<ChatCompletionChunk>> {
        self.stream::<ChatAdapter>(auth, request).await
    }

    pub async fn messages(
        &self,
        auth: &AuthContext,
        request: MessagesRequest,
    ) -> Result<MessagesResponse> {
        self.complete::<MessagesAdapter>(auth, request).await
    }

    pub async fn messages_stream(
        &self,
        auth: &AuthContext,
        request: MessagesRequest,
    ) -> Result<MeteredStream<StreamEvent>> {
        self.stream::<MessagesAdapter>(auth, request).await
    }

    pub async fn generate_images(
        &self,
        auth: &AuthContext,
        request: ImageGenerateRequest,
    ) -> Result<ImagesResponse> {
        self.complete::<ImageGenerationAdapter>(auth, request).await
    }

    pub async fn generate_images_stream(
        &self,
        auth: &AuthContext,
        request: ImageGenerateRequest,
    ) -> Result<MeteredStream<ImageStreamEvent>> {
        self.stream::<ImageGenerationAdapter>(auth, request).await
    }

    pub async fn edit_images(
        &self,
        auth: &AuthContext,
        request: ImageEditRequest,
    ) -> Result<ImagesResponse> {
        self.complete::<ImageEditAdapter>(auth, request).await
    }

    pub async fn edit_images_stream(
        &self,
        auth: &AuthContext,
        request: ImageEditRequest,
    ) -> Result<MeteredStream<ImageStreamEvent>> {
        self.stream::<ImageEditAdapter>(auth, request).await
    }

    /// Hydrate from the context store, dispatch, then store the new turn
    /// under the original (unhydrated) request.
    pub async fn create_response(
        &self,
        auth: &AuthContext,
        request: ResponseCreateRequest,
    ) -> Result<Response> {
        let store = self.responses_store();
        let hydrated = store.hydrate_request(request.clone()).await?;
        let response = self.complete::<ResponsesAdapter>(auth, hydrated).await?;

        if let Err(e) = store.set(&request, &response).await {
            tracing::warn!(response_id = %response.id, error = %e, "failed to store response");
        }
        Ok(response)
    }

    /// Streaming form of [`create_response`](Self::create_response). The turn
    /// is stored when `response.completed` passes through.
    pub async fn create_response_stream(
        &self,
        auth: &AuthContext,
        request: ResponseCreateRequest,
    ) -> Result<EventStream<ResponseStreamEvent>> {
        let store = self.responses_store();
        let hydrated = store.hydrate_request(request.clone()).await?;
        let mut events = self.stream::<ResponsesAdapter>(auth, hydrated).await?;

        Ok(Box::pin(async_stream::try_stream! {
            while let Some(event) = events.next().await {
                let event = event?;
                if let Some(response) = event.completed_response() {
                    if let Err(e) = store.set(&request, &response).await {
                        tracing::warn!(response_id = %response.id, error = %e, "failed to store response");
                    }
                }
                yield event;
            }
        }))
    }
}

/// A committed upstream stream. Usage is folded in as events pass, and the
/// attempt is billed exactly once: when the stream ends, fails, or is dropped.
pub struct MeteredStream<T> {
    first: Option<T>,
    inner: EventStream<T>,
    meter: Meter,
    done: bool,
}

struct Meter {
    attempt: Attempt,
    billing: Arc<dyn BillingRecorder>,
    usage: Option<Usage>,
    failure: Option<(u16, String)>,
    recorded: bool,
}

impl Meter {
    fn observe(&mut self, event: &impl Metered) {
        if let Some(usage) = event.usage() {
            match self.usage {
                Some(ref mut seen) => seen.merge(&usage),
                None => self.usage = Some(usage),
            }
        }
    }

    fn finish(&mut self) {
        if self.recorded {
            return;
        }
        self.recorded = true;
        let (status, error) = match self.failure.take() {
            Some((status, message)) => (status, Some(message)),
            None => (200, None),
        };
        self.attempt
            .record(self.billing.as_ref(), status, self.usage, error);
    }
}

impl Drop for Meter {
    fn drop(&mut self) {
        self.finish();
    }
}

impl<T> MeteredStream<T> {
    fn new(
        first: Option<T>,
        inner: EventStream<T>,
        attempt: Attempt,
        billing: Arc<dyn BillingRecorder>,
    ) -> Self {
        Self {
            first,
            inner,
            meter: Meter {
                attempt,
                billing,
                usage: None,
                failure: None,
                recorded: false,
            },
            done: false,
        }
    }

    /// Name of the provider serving this stream.
    pub fn provider(&self) -> &str {
        &self.meter.attempt.provider.name
    }
}

impl<T: Metered + Unpin> Stream for MeteredStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        if let Some(event) = this.first.take() {
            this.meter.observe(&event);
            return Poll::Ready(Some(Ok(event)));
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(event))) => {
                this.meter.observe(&event);
                Poll::Ready(Some(Ok(event)))
            }
            Poll::Ready(Some(Err(err))) => {
                tracing::error!(provider = %this.meter.attempt.provider.name, error = %err, "stream failed after commit");
                this.meter.failure = Some(err.normalized());
                this.meter.finish();
                this.done = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                tracing::debug!(provider = %this.meter.attempt.provider.name, "stream completed");
                this.meter.finish();
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
