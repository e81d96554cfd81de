//! Generative model access.
//!
//! Two capabilities are used: recoloring an image under a fixed
//! instruction, and rewriting text from a prompt. `GeminiClient` provides
//! both against the `generateContent` REST endpoint.

use crate::config::GenerativeConfig;
use crate::error::GenerativeError;
use crate::images::DataUri;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Finish reasons that mean the output was withheld by content filters.
const SAFETY_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
];

/// A backend able to recolor images and generate text.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Returns a recolored version of `image`.
    async fn colorize_image(
        &self,
        image: &DataUri,
        instruction: &str,
    ) -> Result<DataUri, GenerativeError>;

    /// Returns the model's text answer to `prompt`.
    async fn generate_text(&self, prompt: &str) -> Result<String, GenerativeError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Client for the Gemini `generateContent` API.
pub struct GeminiClient {
    client: Client,
    config: GenerativeConfig,
}

impl GeminiClient {
    /// Fails with `NotConfigured` while the API key is unset.
    pub fn new(config: GenerativeConfig) -> Result<Self, GenerativeError> {
        if !config.is_configured() {
            return Err(GenerativeError::NotConfigured);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, GenerativeError> {
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.config.key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }
        parse_response(&body)
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn colorize_image(
        &self,
        image: &DataUri,
        instruction: &str,
    ) -> Result<DataUri, GenerativeError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: image.mime_type().to_string(),
                            data: image.data().to_string(),
                        }),
                    },
                    Part {
                        text: Some(instruction.to_string()),
                        inline_data: None,
                    },
                ],
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["TEXT", "IMAGE"],
            }),
        };

        let response = self.generate(&self.config.image_model, &request).await?;
        extract_image(response)
    }

    async fn generate_text(&self, prompt: &str) -> Result<String, GenerativeError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                    inline_data: None,
                }],
            }],
            generation_config: None,
        };

        let response = self.generate(&self.config.text_model, &request).await?;
        extract_text(response)
    }
}

/// Maps a non-success answer to an error, recognising safety rejections.
fn api_error(status: u16, body: &str) -> GenerativeError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => {
            format!("{} {}", envelope.error.status, envelope.error.message)
        }
        _ => body.trim().to_string(),
    };
    if message.to_uppercase().contains("SAFETY") {
        GenerativeError::SafetyBlocked(message)
    } else {
        GenerativeError::ApiError(format!("HTTP {}: {}", status, message))
    }
}

/// Decodes a success body and rejects filtered answers.
fn parse_response(body: &str) -> Result<GenerateResponse, GenerativeError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| GenerativeError::ParseError(e.to_string()))?;

    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(GenerativeError::SafetyBlocked(format!(
            "prompt blocked: {}",
            reason
        )));
    }

    for candidate in &response.candidates {
        if let Some(reason) = candidate.finish_reason.as_deref() {
            if SAFETY_FINISH_REASONS.contains(&reason) {
                return Err(GenerativeError::SafetyBlocked(format!(
                    "output withheld: {}",
                    reason
                )));
            }
        }
    }

    Ok(response)
}

fn extract_image(response: GenerateResponse) -> Result<DataUri, GenerativeError> {
    response
        .candidates
        .into_iter()
        .flat_map(|c| c.content.parts)
        .find_map(|p| p.inline_data)
        .map(|d| DataUri::from_base64(&d.mime_type, &d.data))
        .ok_or_else(|| GenerativeError::EmptyResponse("no image in model output".to_string()))
}

fn extract_text(response: GenerateResponse) -> Result<String, GenerativeError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .map(|c| c.content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    Ok(text)
}
