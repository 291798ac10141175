use std::env;
use std::fs;
use std::path::Path;

use payrelay_core::config::{detect_config_path, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

pub fn run() -> String {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => render(&config, detect_config_path().as_deref()),
        Err(error) => format!("config validation failed: {error}"),
    }
}

/// Renders effective values with where each one came from. Secrets are redacted.
pub fn render(config: &AppConfig, config_file_path: Option<&Path>) -> String {
    let config_file_doc = load_config_file_doc(config_file_path);
    let optional_path = |path: Option<&Path>| {
        path.map(|path| path.display().to_string()).unwrap_or_else(|| "<built-in>".to_string())
    };

    let fields: Vec<(&str, String, &str)> = vec![
        ("slack.app_token", redact_token(&config.slack.app_token), "PAYRELAY_SLACK_APP_TOKEN"),
        ("slack.bot_token", redact_token(&config.slack.bot_token), "PAYRELAY_SLACK_BOT_TOKEN"),
        ("slack.api_base", config.slack.api_base.clone(), "PAYRELAY_SLACK_API_BASE"),
        (
            "slack.trigger_phrase",
            format!("{:?}", config.slack.trigger_phrase),
            "PAYRELAY_SLACK_TRIGGER_PHRASE",
        ),
        (
            "slack.acknowledge_file_uploads",
            config.slack.acknowledge_file_uploads.to_string(),
            "PAYRELAY_SLACK_ACKNOWLEDGE_FILE_UPLOADS",
        ),
        ("llm.api_key", redact_secret(&config.llm.api_key), "PAYRELAY_LLM_API_KEY"),
        ("llm.base_url", config.llm.base_url.clone(), "PAYRELAY_LLM_BASE_URL"),
        ("llm.model", config.llm.model.clone(), "PAYRELAY_LLM_MODEL"),
        ("llm.max_tokens", config.llm.max_tokens.to_string(), "PAYRELAY_LLM_MAX_TOKENS"),
        ("llm.max_turns", config.llm.max_turns.to_string(), "PAYRELAY_LLM_MAX_TURNS"),
        ("payment.server_name", config.payment.server_name.clone(), "PAYRELAY_PAYMENT_SERVER_NAME"),
        ("payment.url", config.payment.url.clone(), "PAYRELAY_PAYMENT_URL"),
        (
            "payment.api_key",
            config.payment.api_key.as_ref().map(redact_secret).unwrap_or_else(|| "<unset>".to_string()),
            "PAYRELAY_PAYMENT_API_KEY",
        ),
        (
            "lookup.data_dir",
            config.lookup.data_dir.display().to_string(),
            "PAYRELAY_LOOKUP_DATA_DIR",
        ),
        (
            "relay.post_tool_progress",
            config.relay.post_tool_progress.to_string(),
            "PAYRELAY_RELAY_POST_TOOL_PROGRESS",
        ),
        (
            "relay.post_assistant_text",
            config.relay.post_assistant_text.to_string(),
            "PAYRELAY_RELAY_POST_ASSISTANT_TEXT",
        ),
        (
            "relay.prompt_template_path",
            optional_path(config.relay.prompt_template_path.as_deref()),
            "PAYRELAY_RELAY_PROMPT_TEMPLATE_PATH",
        ),
        ("ocr.enabled", config.ocr.enabled.to_string(), "PAYRELAY_OCR_ENABLED"),
        ("ocr.model", config.ocr.model.clone(), "PAYRELAY_OCR_MODEL"),
        ("server.bind_address", config.server.bind_address.clone(), "PAYRELAY_SERVER_BIND_ADDRESS"),
        (
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            "PAYRELAY_SERVER_HEALTH_CHECK_PORT",
        ),
        ("logging.level", config.logging.level.clone(), "PAYRELAY_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "PAYRELAY_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.into_iter().map(|(key, value, env_key)| {
        let source = field_source(key, env_key, config_file_doc.as_ref(), config_file_path);
        format!("- {key} = {value} (source: {source})")
    }));
    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps the `xapp-`/`xoxb-` prefix so the token kind stays visible.
fn redact_token(token: &SecretString) -> String {
    let trimmed = token.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

fn redact_secret(secret: &SecretString) -> String {
    if secret.expose_secret().trim().is_empty() {
        "<empty>".to_string()
    } else {
        "<redacted>".to_string()
    }
}
