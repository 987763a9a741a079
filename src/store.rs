//! Conversation context store for the responses family.
//!
//! Each stored item keeps the request, the response, and the full context:
//! every conversation turn up to and including the response's output. A
//! follow-up request naming `previous_response_id` is expanded from that
//! context before it reaches an adapter.

use crate::config::{ResponsesStoreConfig, ResponsesStoreKind};
use crate::error::Result;
use crate::translate::responses_types::{
    ConversationItem, Response, ResponseCreateRequest, ResponseInput,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct ResponsesStoreItem {
    pub request: ResponseCreateRequest,
    pub response: Response,
    pub full_context: Vec<ConversationItem>,
}

#[async_trait]
pub trait ResponsesStore: Send + Sync {
    /// `Ok(None)` for ids never written.
    async fn get(&self, response_id: &str) -> Result<Option<ResponsesStoreItem>>;

    /// Persist under `item.response.id`. Items are never overwritten in place.
    async fn set_item(&self, item: ResponsesStoreItem) -> Result<()>;

    /// Record a finished turn: the referenced context (if it resolves), then
    /// the new input, then the response output.
    async fn set(&self, request: &ResponseCreateRequest, response: &Response) -> Result<()> {
        let mut full_context = self.previous_context(request).await?.unwrap_or_default();
        full_context.extend(normalized_input(request));
        full_context.extend(response.output.iter().cloned());

        tracing::debug!(
            response_id = %response.id,
            turns = full_context.len(),
            "storing response context"
        );
        self.set_item(ResponsesStoreItem {
            request: request.clone(),
            response: response.clone(),
            full_context,
        })
        .await
    }

    /// Expand a back-reference into explicit input. Requests without one, or
    /// whose reference is unknown, come back unchanged.
    async fn hydrate_request(&self, request: ResponseCreateRequest) -> Result<ResponseCreateRequest> {
        let Some(mut items) = self.previous_context(&request).await? else {
            return Ok(request);
        };
        items.extend(normalized_input(&request));

        Ok(ResponseCreateRequest {
            input: Some(ResponseInput::Items(items)),
            previous_response_id: None,
            ..request
        })
    }

    #[doc(hidden)]
    async fn previous_context(
        &self,
        request: &ResponseCreateRequest,
    ) -> Result<Option<Vec<ConversationItem>>> {
        let Some(ref previous_id) = request.previous_response_id else {
            return Ok(None);
        };
        let item = self.get(previous_id).await?;
        if item.is_none() {
            tracing::debug!(%previous_id, "previous response not found");
        }
        Ok(item.map(|item| item.full_context))
    }
}

fn normalized_input(request: &ResponseCreateRequest) -> Vec<ConversationItem> {
    request
        .input
        .clone()
        .map(ResponseInput::into_items)
        .unwrap_or_default()
}

#[derive(Default)]
pub struct InMemoryResponsesStore {
    items: RwLock<HashMap<String, ResponsesStoreItem>>,
}

impl InMemoryResponsesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }
}

#[async_trait]
impl ResponsesStore for InMemoryResponsesStore {
    async fn get(&self, response_id: &str) -> Result<Option<ResponsesStoreItem>> {
        Ok(self.items.read().await.get(response_id).cloned())
    }

    async fn set_item(&self, item: ResponsesStoreItem) -> Result<()> {
        self.items
            .write()
            .await
            .entry(item.response.id.clone())
            .or_insert(item);
        Ok(())
    }
}

/// Selects the configured backend once and hands out the same instance until
/// the configuration changes or [`invalidate`](Self::invalidate) is called.
#[derive(Default)]
pub struct ResponsesStoreFactory {
    cached: Mutex<Option<(ResponsesStoreConfig, Arc<dyn ResponsesStore>)>>,
}

impl ResponsesStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_store(&self, config: &ResponsesStoreConfig) -> Arc<dyn ResponsesStore> {
        let mut cached = match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some((ref built_for, ref store)) = *cached {
            if built_for == config {
                return store.clone();
            }
            tracing::info!(?config, "responses store configuration changed");
        }

        let store: Arc<dyn ResponsesStore> = match config.kind {
            ResponsesStoreKind::InMemory => Arc::new(InMemoryResponsesStore::new()),
        };
        *cached = Some((config.clone(), store.clone()));
        store
    }

    /// Drop the memoized backend so the next call re-derives it.
    pub fn invalidate(&self) {
        if let Ok(mut cached) = self.cached.lock() {
            cached.take();
        }
    }
}
