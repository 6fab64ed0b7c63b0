//! Vision descriptions through the Anthropic Messages API.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::VisionConfig;
use crate::ingest::{images, IngestError, VisionDescriber};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

const DESCRIBE_PROMPT: &str = "Describe this screenshot focusing on: UI elements (buttons, forms, menus), color scheme and theme, main content type, any error messages or notifications, layout structure. Be concise but comprehensive.";

pub struct AnthropicVision {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    max_dimension: u32,
}

impl AnthropicVision {
    pub fn new(config: &VisionConfig, api_key: String) -> Result<Self, IngestError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_dimension: config.max_dimension,
        })
    }

    fn request_body(&self, png_base64: &str) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": DESCRIBE_PROMPT },
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/png",
                            "data": png_base64,
                        }
                    }
                ]
            }]
        })
    }
}

impl VisionDescriber for AnthropicVision {
    fn describe(&self, image: &DynamicImage) -> Result<String, IngestError> {
        let scaled = images::downscale(image, self.max_dimension);
        let png = images::encode_png(&scaled)?;
        let body = self.request_body(&STANDARD.encode(png));

        let resp = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()?;

        let status = resp.status();
        let value = resp.json::<Value>()?;

        if !status.is_success() {
            let message = value
                .pointer("/error/message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            log::warn!("vision error: status={status} message={message}");
            return Err(IngestError::Vision(format!("status={status} message={message}")));
        }

        extract_description(&value)
            .ok_or_else(|| IngestError::Vision("response has no text content".to_string()))
    }
}

/// First text block of a Messages API response.
fn extract_description(resp: &Value) -> Option<String> {
    resp.get("content")?
        .as_array()?
        .iter()
        .find(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
        .and_then(|block| block.get("text"))
        .and_then(|text| text.as_str())
        .map(str::to_owned)
}
