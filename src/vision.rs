// src/vision.rs

use crate::config::{Provider, VisionSettings};
use crate::error::{BillError, Result};
use crate::upload::Upload;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// The prompt that instructs the model to read a bill into our four fields.
pub const PROMPT: &str = r#"You are a bill and invoice data extraction assistant.
Read the attached bill and return ONLY a JSON object with exactly these keys:
{
  "vendor_name": "name of the company that issued the bill",
  "bill_date": "date printed on the bill, as written (prefer YYYY-MM-DD)",
  "total_amount": "grand total payable, digits only with optional decimal point, or null",
  "invoice_number": "invoice or bill number, as written"
}
Use an empty string for any text field you cannot find.
If the total is missing or unreadable, "total_amount" must be null, never an empty string.
Return ONLY the JSON object, no markdown fences, no commentary."#;

/// Truncate very long PDF text layers to stay within context limits.
const MAX_PDF_CHARS: usize = 12_000;

/// A hosted model that turns a bill image into (hopefully) JSON text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn infer(&self, upload: &Upload, prompt: &str) -> Result<String>;
}

/// Build the client for the provider selected in `settings`.
pub fn from_settings(settings: VisionSettings) -> Result<Box<dyn VisionModel>> {
    let client = Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .build()?;

    info!(
        provider = %settings.provider,
        url = %settings.base_url,
        model = %settings.model,
        "Using vision backend"
    );

    Ok(match settings.provider {
        Provider::Together => Box::new(TogetherClient { client, settings }),
        Provider::Gemini => Box::new(GeminiClient { client, settings }),
    })
}

async fn read_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(BillError::Model(format!("API error {status}: {body}")))
}

// ---------------------------------------------------------------------------
// Together AI (OpenAI-compatible chat completions)
// ---------------------------------------------------------------------------

pub struct TogetherClient {
    client: Client,
    settings: VisionSettings,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl TogetherClient {
    fn build_request(&self, upload: &Upload, prompt: &str) -> Result<ChatRequest> {
        let mut content = vec![ContentPart::Text {
            text: prompt.to_string(),
        }];

        if upload.mime.is_image() {
            content.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!(
                        "data:{};base64,{}",
                        upload.mime.as_str(),
                        STANDARD.encode(&upload.bytes)
                    ),
                },
            });
        } else {
            // The chat endpoint takes images only, so PDFs go in as their text layer
            let text = upload.pdf_text()?;
            let text: String = text.chars().take(MAX_PDF_CHARS).collect();
            content.push(ContentPart::Text {
                text: format!("Bill text extracted from {}:\n\n{text}", upload.file_name),
            });
        }

        Ok(ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content,
            }],
            temperature: 0.0,
        })
    }
}

#[async_trait]
impl VisionModel for TogetherClient {
    async fn infer(&self, upload: &Upload, prompt: &str) -> Result<String> {
        let request = self.build_request(upload, prompt)?;
        let url = format!("{}/chat/completions", self.settings.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await?;
        let chat: ChatResponse = read_success(response).await?.json().await?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BillError::Model("empty response from Together".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Gemini (generateContent)
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    client: Client,
    settings: VisionSettings,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    Inline { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiClient {
    fn build_request(&self, upload: &Upload, prompt: &str) -> GenerateRequest {
        // Gemini reads PDFs natively, so both kinds go in as inline data
        GenerateRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart::Text {
                        text: prompt.to_string(),
                    },
                    GeminiPart::Inline {
                        inline_data: InlineData {
                            mime_type: upload.mime.as_str().to_string(),
                            data: STANDARD.encode(&upload.bytes),
                        },
                    },
                ],
            }],
        }
    }
}

/// Concatenate the text parts of the first candidate.
fn candidate_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    (!text.is_empty()).then_some(text)
}

#[async_trait]
impl VisionModel for GeminiClient {
    async fn infer(&self, upload: &Upload, prompt: &str) -> Result<String> {
        let request = self.build_request(upload, prompt);
        let url = format!(
            "{}/models/{}:generateContent",
            self.settings.base_url, self.settings.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&request)
            .send()
            .await?;
        let generated: GenerateResponse = read_success(response).await?.json().await?;

        candidate_text(generated)
            .ok_or_else(|| BillError::Model("empty response from Gemini".to_string()))
    }
}
