//! Type definitions for the OpenAI Images API (generations and edits), the
//! canonical schema of both image families.

use crate::billing::{Metered, Usage};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Output format reported when the provider does not say.
pub const DEFAULT_OUTPUT_FORMAT: &str = "png";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageGenerateRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    // Extensions understood by the Google variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhance_prompt: Option<bool>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// An uploaded file from a multipart edit request.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Image edit request as received over multipart. Text fields the gateway
/// does not interpret are kept in `fields` and forwarded as-is.
#[derive(Debug, Clone, Default)]
pub struct ImageEditRequest {
    pub model: Option<String>,
    pub prompt: String,
    pub images: Vec<ImageUpload>,
    pub mask: Option<ImageUpload>,
    pub stream: Option<bool>,
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesResponse {
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub data: Vec<ImageData>,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ImageUsage>,
}

fn default_output_format() -> String {
    DEFAULT_OUTPUT_FORMAT.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub input_tokens_details: ImageInputTokensDetails,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageInputTokensDetails {
    #[serde(default)]
    pub image_tokens: u64,
    #[serde(default)]
    pub text_tokens: u64,
}

/// Streamed image events for both generation and edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ImageStreamEvent {
    #[serde(rename = "image_generation.partial_image")]
    GenerationPartialImage(ImageEventPayload),
    #[serde(rename = "image_generation.completed")]
    GenerationCompleted(ImageEventPayload),
    #[serde(rename = "image_edit.partial_image")]
    EditPartialImage(ImageEventPayload),
    #[serde(rename = "image_edit.completed")]
    EditCompleted(ImageEventPayload),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageEventPayload {
    pub b64_json: String,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_image_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ImageUsage>,
}

impl ImageStreamEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            ImageStreamEvent::GenerationPartialImage(_) => "image_generation.partial_image",
            ImageStreamEvent::GenerationCompleted(_) => "image_generation.completed",
            ImageStreamEvent::EditPartialImage(_) => "image_edit.partial_image",
            ImageStreamEvent::EditCompleted(_) => "image_edit.completed",
        }
    }
}

impl ImageUsage {
    fn to_metered(&self) -> Usage {
        Usage::tokens(self.input_tokens, self.output_tokens)
    }
}

impl Metered for ImagesResponse {
    fn usage(&self) -> Option<Usage> {
        let mut usage = self.usage.as_ref().map(ImageUsage::to_metered).unwrap_or_default();
        usage.image = self.data.len() as u64;
        usage.request = 1;
        Some(usage)
    }
}

impl Metered for ImageStreamEvent {
    fn usage(&self) -> Option<Usage> {
        match self {
            ImageStreamEvent::GenerationCompleted(payload)
            | ImageStreamEvent::EditCompleted(payload) => {
                let mut usage = payload
                    .usage
                    .as_ref()
                    .map(ImageUsage::to_metered)
                    .unwrap_or_default();
                usage.image = 1;
                usage.request = 1;
                Some(usage)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_output_format_defaults_to_png() {
        let resp: ImagesResponse =
            serde_json::from_str(r#"{"data":[{"url":"https://x/y.png"}]}"#).unwrap();
        assert_eq!(resp.created, 0);
        assert_eq!(resp.output_format, DEFAULT_OUTPUT_FORMAT);
        assert_eq!(resp.usage().unwrap().image, 1);
    }

    #[test]
    fn stream_events_are_type_tagged() {
        let event: ImageStreamEvent = serde_json::from_str(
            r#"{"type":"image_generation.partial_image","b64_json":"AAA","partial_image_index":0}"#,
        )
        .unwrap();
        assert_eq!(event.event_name(), "image_generation.partial_image");
        assert!(event.usage().is_none());

        let json = serde_json::to_value(ImageStreamEvent::EditCompleted(ImageEventPayload {
            b64_json: "BBB".to_string(),
            ..ImageEventPayload::default()
        }))
        .unwrap();
        assert_eq!(json["type"], "image_edit.completed");
        assert_eq!(json["b64_json"], "BBB");
    }
}
