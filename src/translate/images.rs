//! Conversions between canonical image requests/responses and Google's
//! Imagen and Gemini backends. All functions are pure.

use super::google_types::{
    GeminiContent, GeminiPart, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    ImagenInstance, ImagenParameters, ImagenPredictRequest, ImagenPredictResponse,
};
use super::image_types::{
    ImageData, ImageGenerateRequest, ImageInputTokensDetails, ImageUsage, ImagesResponse,
    DEFAULT_OUTPUT_FORMAT,
};

/// Discrete output resolution tiers exposed by tiered image backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    High,
    Low,
}

impl ResolutionTier {
    /// `hd`/`high` map to the high tier, `low`/`medium` to the low tier.
    /// Anything else leaves the tier unset so the provider default applies.
    pub fn from_quality(quality: Option<&str>) -> Option<Self> {
        match quality? {
            "hd" | "high" => Some(Self::High),
            "low" | "medium" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn imagen_size(self) -> &'static str {
        match self {
            Self::High => "2K",
            Self::Low => "1K",
        }
    }
}

/// Gemini's media resolution setting for a canonical quality value.
pub fn gemini_media_resolution(quality: Option<&str>) -> Option<&'static str> {
    match quality? {
        "high" => Some("MEDIA_RESOLUTION_HIGH"),
        "medium" => Some("MEDIA_RESOLUTION_MEDIUM"),
        "low" => Some("MEDIA_RESOLUTION_LOW"),
        _ => None,
    }
}

pub fn image_request_to_imagen(req: &ImageGenerateRequest) -> ImagenPredictRequest {
    ImagenPredictRequest {
        instances: vec![ImagenInstance {
            prompt: req.prompt.clone(),
        }],
        parameters: ImagenParameters {
            sample_count: req.n,
            negative_prompt: req.negative_prompt.clone(),
            aspect_ratio: req.aspect_ratio.clone(),
            guidance_scale: req.guidance_scale,
            seed: req.seed,
            person_generation: Some("allow_all".to_string()),
            image_size: ResolutionTier::from_quality(req.quality.as_deref())
                .map(|tier| tier.imagen_size().to_string()),
            enhance_prompt: req.enhance_prompt,
        },
    }
}

pub fn imagen_to_images_response(resp: ImagenPredictResponse) -> ImagesResponse {
    ImagesResponse {
        created: 0,
        data: resp
            .predictions
            .into_iter()
            .map(|p| ImageData {
                b64_json: p.bytes_base64_encoded,
                revised_prompt: p.prompt,
                url: p.gcs_uri,
            })
            .collect(),
        output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
        background: None,
        quality: None,
        size: None,
        usage: None,
    }
}

pub fn image_request_to_gemini(req: &ImageGenerateRequest) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![GeminiContent {
            role: Some("user".to_string()),
            parts: vec![GeminiPart {
                text: Some(req.prompt.clone()),
                inline_data: None,
            }],
        }],
        generation_config: Some(GenerationConfig {
            candidate_count: req.n,
            seed: req.seed,
            response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            media_resolution: gemini_media_resolution(req.quality.as_deref()).map(str::to_string),
        }),
    }
}

/// Keep the first inline image of each candidate; candidates without one are dropped.
pub fn gemini_to_images_response(resp: GenerateContentResponse) -> ImagesResponse {
    let data = resp
        .candidates
        .into_iter()
        .filter_map(|candidate| {
            candidate
                .content?
                .parts
                .into_iter()
                .find_map(|part| part.inline_data)
                .map(|inline| ImageData {
                    b64_json: Some(inline.data),
                    revised_prompt: None,
                    url: None,
                })
        })
        .collect();

    let meta = resp.usage_metadata.unwrap_or_default();

    ImagesResponse {
        created: 0,
        data,
        output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
        background: None,
        quality: None,
        size: None,
        usage: Some(ImageUsage {
            input_tokens: meta.prompt_token_count.unwrap_or(0),
            input_tokens_details: ImageInputTokensDetails::default(),
            output_tokens: meta.candidates_token_count.unwrap_or(0),
            total_tokens: meta.total_token_count.unwrap_or(0),
        }),
    }
}
