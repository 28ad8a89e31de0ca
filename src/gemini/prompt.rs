//! Prompt text and JSON request shapes for the Gemini and Veo endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::media::{ArtStyle, AspectRatio};

/// Number of scenes requested for every outline.
pub const SCENE_COUNT: usize = 4;

/// Ratios the video model accepts.
pub const SUPPORTED_VIDEO_RATIOS: [AspectRatio; 2] = [AspectRatio::Landscape, AspectRatio::Portrait];

/// Story prompt sent to the text model.
pub fn outline_prompt(topic: &str) -> String {
    format!(
        "Write a short children's story about: \"{}\".\n\
         Break the story down into exactly {} distinct scenes/pages.\n\
         For each scene, provide the story text (what is read aloud) and a detailed visual \
         prompt (for an image generator) describing the scene.",
        topic.trim(),
        SCENE_COUNT
    )
}

/// Structured-output schema for the outline.
pub fn outline_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING" },
            "scenes": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "storyText": {
                            "type": "STRING",
                            "description": "The narrative text for this page"
                        },
                        "visualPrompt": {
                            "type": "STRING",
                            "description": "Detailed visual description of the scene for an image generator. Include characters, setting, lighting, and action."
                        }
                    },
                    "required": ["storyText", "visualPrompt"]
                }
            }
        },
        "required": ["title", "scenes"]
    })
}

/// Scene prompt combined with the style descriptor.
pub fn illustration_prompt(visual_prompt: &str, style: ArtStyle) -> String {
    format!(
        "{}. Style: {}. High quality, detailed, children's book illustration.",
        visual_prompt.trim(),
        style.descriptor()
    )
}

pub fn animation_prompt(visual_prompt: &str) -> String {
    format!(
        "Animate this scene subtly: {}. Keep it calm and magical.",
        visual_prompt.trim()
    )
}

/// Map a requested ratio onto one the video model supports.
///
/// Unsupported ratios degrade to 16:9 rather than failing the request.
pub fn video_ratio(requested: AspectRatio) -> AspectRatio {
    if SUPPORTED_VIDEO_RATIOS.contains(&requested) {
        requested
    } else {
        AspectRatio::Landscape
    }
}

/// `generateContent` request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TextPart {
    pub text: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ImageConfig {
    pub aspect_ratio: AspectRatio,
}

impl GenerateContentRequest {
    pub fn outline(topic: &str) -> Self {
        Self {
            contents: vec![Content::text(outline_prompt(topic))],
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(outline_schema()),
                ..GenerationConfig::default()
            }),
        }
    }

    pub fn illustration(visual_prompt: &str, style: ArtStyle, ratio: AspectRatio) -> Self {
        Self {
            contents: vec![Content::text(illustration_prompt(visual_prompt, style))],
            generation_config: Some(GenerationConfig {
                image_config: Some(ImageConfig {
                    aspect_ratio: ratio,
                }),
                ..GenerationConfig::default()
            }),
        }
    }
}

impl Content {
    fn text(text: String) -> Self {
        Self {
            parts: vec![TextPart { text }],
        }
    }
}

/// `generateContent` response body (only the fields we read).
#[derive(Debug, Default, Deserialize)]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|c| c.parts.iter())
    }

    /// Concatenated text of the first candidate.
    pub fn text(&self) -> Option<String> {
        let text: String = self.parts().filter_map(|p| p.text.as_deref()).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn inline_data(&self) -> Option<&InlineData> {
        self.parts().find_map(|p| p.inline_data.as_ref())
    }
}

/// `predictLongRunning` request body for the video model.
#[derive(Debug, Serialize)]
pub(crate) struct PredictRequest {
    pub instances: Vec<VideoInstance>,
    pub parameters: VideoParameters,
}

#[derive(Debug, Serialize)]
pub(crate) struct VideoInstance {
    pub prompt: String,
    pub image: InstanceImage,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InstanceImage {
    pub bytes_base64_encoded: String,
    pub mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VideoParameters {
    pub aspect_ratio: AspectRatio,
    pub resolution: &'static str,
    pub sample_count: u32,
}

/// Long-running operation as returned by submit and poll.
#[derive(Debug, Deserialize)]
pub(crate) struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationError>,
    #[serde(default)]
    pub response: Option<OperationResponse>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OperationError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OperationResponse {
    #[serde(default)]
    pub generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateVideoResponse {
    #[serde(default)]
    pub generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeneratedSample {
    #[serde(default)]
    pub video: Option<SampleVideo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SampleVideo {
    #[serde(default)]
    pub uri: Option<String>,
}

impl Operation {
    /// Download link of the first generated sample.
    pub fn video_uri(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .generate_video_response
            .as_ref()?
            .generated_samples
            .first()?
            .video
            .as_ref()?
            .uri
            .as_deref()
    }
}

/// Google API error envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outline_prompt_requests_four_scenes() {
        let prompt = outline_prompt("  a dragon who breathes bubbles ");
        assert!(prompt.contains("\"a dragon who breathes bubbles\""));
        assert!(prompt.contains("exactly 4 distinct scenes"));
    }

    #[test]
    fn test_illustration_prompt_includes_style() {
        let prompt = illustration_prompt("A kitten", ArtStyle::Watercolor);
        assert!(prompt.starts_with("A kitten. Style: Soft Watercolor"));
        assert!(prompt.ends_with("children's book illustration."));
    }

    #[test]
    fn test_video_ratio_degrades_unsupported() {
        assert_eq!(video_ratio(AspectRatio::Portrait), AspectRatio::Portrait);
        assert_eq!(video_ratio(AspectRatio::Landscape), AspectRatio::Landscape);
        assert_eq!(video_ratio(AspectRatio::Standard), AspectRatio::Landscape);
        assert_eq!(video_ratio(AspectRatio::Square), AspectRatio::Landscape);
        assert_eq!(video_ratio(AspectRatio::Tall), AspectRatio::Landscape);
    }

    #[test]
    fn test_outline_request_serializes_schema() {
        let body = serde_json::to_value(GenerateContentRequest::outline("bunny")).unwrap();
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(
            body["generationConfig"]["responseSchema"]["required"],
            json!(["title", "scenes"])
        );
        assert!(body["generationConfig"].get("imageConfig").is_none());
    }

    #[test]
    fn test_illustration_request_serializes_ratio() {
        let body = serde_json::to_value(GenerateContentRequest::illustration(
            "moon",
            ArtStyle::Flat,
            AspectRatio::Tall,
        ))
        .unwrap();
        assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "3:4");
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] } }]
        }))
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("{\"a\":1}"));
        assert!(response.inline_data().is_none());
    }

    #[test]
    fn test_operation_video_uri() {
        let op: Operation = serde_json::from_value(json!({
            "name": "models/veo/operations/1",
            "done": true,
            "response": { "generateVideoResponse": { "generatedSamples": [
                { "video": { "uri": "https://files/x?alt=media" } }
            ] } }
        }))
        .unwrap();
        assert_eq!(op.video_uri(), Some("https://files/x?alt=media"));

        let pending: Operation =
            serde_json::from_value(json!({ "name": "models/veo/operations/1" })).unwrap();
        assert!(!pending.done);
        assert!(pending.video_uri().is_none());
    }
}
