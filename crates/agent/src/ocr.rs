use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;
use tracing::info;

use crate::llm::{ContentBlock, ImageSource, LlmClient, LlmError, LlmRequest, Message};

const OCR_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("unsupported receipt image type: {0}")]
    UnsupportedMediaType(String),
    #[error("no text could be extracted from the receipt")]
    EmptyText,
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Sniffs the image type from magic bytes, falling back to the declared mimetype.
pub fn detect_media_type(bytes: &[u8], declared: Option<&str>) -> Option<&'static str> {
    let sniffed = if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF8") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    };

    sniffed.or_else(|| match declared?.trim().to_ascii_lowercase().as_str() {
        "image/png" => Some("image/png"),
        "image/jpeg" | "image/jpg" => Some("image/jpeg"),
        "image/gif" => Some("image/gif"),
        "image/webp" => Some("image/webp"),
        _ => None,
    })
}

pub struct ReceiptTextExtractor {
    llm: Arc<dyn LlmClient>,
    model: String,
    prompt: String,
}

impl ReceiptTextExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self { llm, model: model.into(), prompt: prompt.into() }
    }

    pub async fn extract(&self, bytes: &[u8], declared_type: Option<&str>) -> Result<String, OcrError> {
        let media_type = detect_media_type(bytes, declared_type).ok_or_else(|| {
            OcrError::UnsupportedMediaType(declared_type.unwrap_or("unknown").to_string())
        })?;

        let response = self
            .llm
            .complete(LlmRequest {
                model: self.model.clone(),
                max_tokens: OCR_MAX_TOKENS,
                system: None,
                messages: vec![Message::user(vec![
                    ContentBlock::Image { source: ImageSource::base64(media_type, STANDARD.encode(bytes)) },
                    ContentBlock::text(self.prompt.clone()),
                ])],
                tools: Vec::new(),
            })
            .await?;

        let text = response.text();
        if text.trim().is_empty() {
            return Err(OcrError::EmptyText);
        }
        info!(
            event_name = "agent.ocr.extracted",
            media_type,
            image_bytes = bytes.len(),
            text_chars = text.chars().count(),
            "extracted receipt text"
        );
        Ok(text)
    }
}
