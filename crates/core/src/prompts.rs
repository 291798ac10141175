use std::fs;
use std::path::{Path, PathBuf};

use tera::{Context, Tera};
use thiserror::Error;

use crate::request::PaymentRequest;

const PAYMENT_TEMPLATE_NAME: &str = "payment_request.txt";
const DEFAULT_PAYMENT_TEMPLATE: &str = include_str!("../../../templates/payment_request.tera");
const DEFAULT_OCR_PROMPT: &str = include_str!("../../../templates/ocr_receipt.txt");

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("could not read prompt file `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("prompt template error: {0}")]
    Template(#[from] tera::Error),
}

#[derive(Debug)]
pub struct PromptRenderer {
    tera: Tera,
}

impl PromptRenderer {
    pub fn with_default_template() -> Result<Self, PromptError> {
        Self::from_template(DEFAULT_PAYMENT_TEMPLATE)
    }

    pub fn from_template(template: &str) -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_template(PAYMENT_TEMPLATE_NAME, template)?;
        Ok(Self { tera })
    }

    /// Uses the override template when one is configured.
    pub fn load(template_path: Option<&Path>) -> Result<Self, PromptError> {
        match template_path {
            Some(path) => Self::from_template(&read_prompt_file(path)?),
            None => Self::with_default_template(),
        }
    }

    pub fn render_payment(
        &self,
        request: &PaymentRequest,
        server_name: &str,
    ) -> Result<String, PromptError> {
        let mut context = Context::new();
        context.insert("request_text", &request.text);
        context.insert("requester_id", &request.requester_id);
        context.insert("source", request.source.as_str());
        context.insert("server_name", server_name);
        Ok(self.tera.render(PAYMENT_TEMPLATE_NAME, &context)?)
    }
}

pub fn ocr_prompt(prompt_path: Option<&Path>) -> Result<String, PromptError> {
    match prompt_path {
        Some(path) => read_prompt_file(path),
        None => Ok(DEFAULT_OCR_PROMPT.to_string()),
    }
}

fn read_prompt_file(path: &Path) -> Result<String, PromptError> {
    fs::read_to_string(path).map_err(|source| PromptError::Read { path: path.to_path_buf(), source })
}
