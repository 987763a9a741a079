//! Protocol adapters: one type per (endpoint family x provider family).
//!
//! Each family has a closed enum whose `for_provider` constructor picks a
//! variant by [`ProviderKind`](crate::providers::ProviderKind), falling back to
//! the OpenAI-compatible variant for anything unregistered. Constructors
//! return a fresh value on every call; adapters hold no per-call state.

use crate::error::Result;
use crate::providers::Provider;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Lazy, single-pass stream of canonical events. Dropping it aborts the
/// upstream request.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Per-binding knobs applied by every adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterOptions {
    /// Upper bound on the family's output-token field.
    pub max_tokens: Option<u64>,
}

impl AdapterOptions {
    /// The caller's limit clamped to the binding cap, or the cap when the
    /// caller set none.
    pub fn cap(&self, requested: Option<u64>) -> Option<u64> {
        match (requested, self.max_tokens) {
            (Some(requested), Some(cap)) => Some(requested.min(cap)),
            (requested, cap) => requested.or(cap),
        }
    }
}

#[async_trait]
pub trait Adapter: Send + Sync {
    type Request: Send + 'static;
    type Response: Send;
    type Event: Send + 'static;

    fn supports_streaming(&self) -> bool {
        true
    }

    /// One round trip; resolves once the full response is available.
    async fn send_request(
        &self,
        provider: &Provider,
        request: Self::Request,
        options: AdapterOptions,
    ) -> Result<Self::Response>;

    /// Open the upstream stream. Variants without streaming support must fail
    /// here, before any request is sent.
    async fn send_request_streaming(
        &self,
        provider: &Provider,
        request: Self::Request,
        options: AdapterOptions,
    ) -> Result<EventStream<Self::Event>>;
}

/// Per-family adapter selection. Every call builds a fresh value.
pub trait AdapterFactory: Adapter + Sized {
    fn for_provider(provider: &Provider, client: reqwest::Client) -> Self;
}

/// Declares a family's adapter enum and forwards [`Adapter`] to its variants.
///
/// The generated `send_request_streaming` rejects providers configured with
/// `streaming = false` and variants that report no streaming support.
macro_rules! adapter_family {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident($inner:ty)),+ $(,)?
        }
        request = $req:ty,
        response = $resp:ty,
        event = $event:ty $(,)?
    ) => {
        $(#[$meta])*
        pub enum $name {
            $($variant($inner)),+
        }

        #[async_trait::async_trait]
        impl $crate::adapters::Adapter for $name {
            type Request = $req;
            type Response = $resp;
            type Event = $event;

            fn supports_streaming(&self) -> bool {
                match self {
                    $(Self::$variant(adapter) => $crate::adapters::Adapter::supports_streaming(adapter)),+
                }
            }

            async fn send_request(
                &self,
                provider: &$crate::providers::Provider,
                request: $req,
                options: $crate::adapters::AdapterOptions,
            ) -> $crate::error::Result<$resp> {
                match self {
                    $(Self::$variant(adapter) => {
                        $crate::adapters::Adapter::send_request(adapter, provider, request, options)
                            .await
                    }),+
                }
            }

            async fn send_request_streaming(
                &self,
                provider: &$crate::providers::Provider,
                request: $req,
                options: $crate::adapters::AdapterOptions,
            ) -> $crate::error::Result<$crate::adapters::EventStream<$event>> {
                if !provider.streaming || !$crate::adapters::Adapter::supports_streaming(self) {
                    return Err($crate::error::GatewayError::unsupported(
                        provider.name.clone(),
                        "streaming",
                    ));
                }
                match self {
                    $(Self::$variant(adapter) => {
                        $crate::adapters::Adapter::send_request_streaming(
                            adapter, provider, request, options,
                        )
                        .await
                    }),+
                }
            }
        }
    };
}

pub(crate) use adapter_family;

pub mod chat;
pub mod http;
pub mod image_edits;
pub mod images;
pub mod messages;
pub mod responses;

pub use chat::ChatAdapter;
pub use image_edits::ImageEditAdapter;
pub use images::ImageGenerationAdapter;
pub use messages::MessagesAdapter;
pub use responses::ResponsesAdapter;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_clamps_or_fills() {
        let capped = AdapterOptions {
            max_tokens: Some(512),
        };
        assert_eq!(capped.cap(Some(4096)), Some(512));
        assert_eq!(capped.cap(Some(100)), Some(100));
        assert_eq!(capped.cap(None), Some(512));
        assert_eq!(AdapterOptions::default().cap(Some(7)), Some(7));
        assert_eq!(AdapterOptions::default().cap(None), None);
    }
}
