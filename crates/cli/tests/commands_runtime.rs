use std::collections::VecDeque;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use payrelay_agent::llm::{ContentBlock, LlmRequest, LlmResponse, StopReason};
use payrelay_agent::{AgentRuntime, LlmClient, LlmError};
use payrelay_cli::commands::backfill::{self, BackfillOptions};
use payrelay_cli::commands::doctor::{self, CheckStatus};
use payrelay_cli::commands::{lookup, process, TurnPrinter};
use payrelay_core::config::{ConfigOverrides, LoadOptions};
use payrelay_core::{AppConfig, LookupStore};
use payrelay_slack::web::SlackWebClient;
use serde_json::{json, Value};
use tempfile::TempDir;

#[test]
fn lookup_reports_every_entry_for_a_known_user() {
    let dir = lookup_dir();
    let result = lookup::execute(&LookupStore::new(dir.path()), "U123");
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "lookup");
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["data"]["wallet_id"]["value"], "wallet-abc");
    assert_eq!(payload["data"]["manager_id"]["value"], "U999");
    assert_eq!(payload["data"]["budget"]["value"]["remaining"], "80");
}

#[test]
fn lookup_fails_when_the_user_is_unknown_everywhere() {
    let dir = lookup_dir();
    let result = lookup::execute(&LookupStore::new(dir.path()), "U404");
    assert_eq!(result.exit_code, 1);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["error_class"], "not_found");
    assert_eq!(payload["data"]["wallet_id"]["found"], false);
}

#[test]
fn lookup_run_fails_config_validation_without_tokens() {
    with_env(&[], || {
        let result = lookup::run("U123");
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_flags_missing_lookup_files() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("wallet.json"), r#"{"U123":"wallet-abc"}"#).expect("wallet");
    let config = test_config(dir.path());

    let report = doctor::build_report(Ok(&config), None);

    assert_eq!(report.overall_status, CheckStatus::Fail);
    let status_of = |name: &str| {
        report.checks.iter().find(|check| check.name == name).map(|check| check.status)
    };
    assert_eq!(status_of("config_validation"), Some(CheckStatus::Pass));
    assert_eq!(status_of("lookup_file:wallet.json"), Some(CheckStatus::Pass));
    assert_eq!(status_of("lookup_file:budget.json"), Some(CheckStatus::Fail));
    assert_eq!(status_of("payment_server"), Some(CheckStatus::Skipped));
}

#[test]
fn doctor_skips_remaining_checks_when_config_fails() {
    let report = doctor::build_report(Err("slack.app_token is required".to_string()), None);

    assert_eq!(report.overall_status, CheckStatus::Fail);
    assert_eq!(report.checks.len(), 3);
    assert!(report.checks[1..].iter().all(|check| check.status == CheckStatus::Skipped));
}

#[tokio::test]
async fn process_runs_a_session_and_prints_each_turn() {
    let dir = lookup_dir();
    let config = test_config(dir.path());
    let llm = ScriptedLlm::new(vec![
        tool_use_response("toolu_1", "get_wallet_id"),
        text_response("Sent 25 USDC to wallet-abc."),
    ]);
    let runtime = AgentRuntime::assemble(&config, Arc::new(llm), None).expect("runtime");
    let printer = TurnPrinter::default();

    let result =
        process::execute(&runtime, "U123", "PAYMENT REQUEST 25 USDC to bob", &printer).await;

    assert_eq!(result.exit_code, 0);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["data"]["payment_server"], "failed");
    assert_eq!(payload["data"]["outcome"]["subtype"], "success");
    assert_eq!(payload["data"]["outcome"]["result"], "Sent 25 USDC to wallet-abc.");
    assert_eq!(payload["data"]["outcome"]["tools_used"], json!(["get_wallet_id"]));

    let turns: Vec<Value> = printer.lines().iter().map(|line| parse_payload(line)).collect();
    assert_eq!(turns.first().map(|turn| turn["type"].clone()), Some(json!("init")));
    assert_eq!(turns.last().map(|turn| turn["type"].clone()), Some(json!("result")));
    let tool_result = turns
        .iter()
        .find(|turn| turn["type"] == "tool_result")
        .expect("tool result turn");
    assert!(tool_result["output"].as_str().unwrap_or_default().contains("wallet-abc"));
}

#[tokio::test]
async fn process_rejects_blank_text() {
    let dir = lookup_dir();
    let config = test_config(dir.path());
    let runtime =
        AgentRuntime::assemble(&config, Arc::new(ScriptedLlm::new(Vec::new())), None).expect("runtime");

    let result = process::execute(&runtime, "U123", "   ", &TurnPrinter::default()).await;

    assert_eq!(result.exit_code, 2);
    assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
}

#[tokio::test]
async fn backfill_processes_only_human_messages_with_text() {
    let mut server = mockito::Server::new_async().await;
    let history = server
        .mock("GET", "/conversations.history")
        .match_query(mockito::Matcher::UrlEncoded("channel".into(), "C1".into()))
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "ok": true,
                "messages": [
                    { "user": "U123", "text": "PAYMENT REQUEST 10 USDC to carol", "ts": "3.0" },
                    { "bot_id": "B1", "text": "Payment sent", "ts": "2.0" },
                    { "user": "U123", "text": "", "ts": "1.0" }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let dir = lookup_dir();
    let config = test_config(dir.path());
    let llm = ScriptedLlm::new(vec![text_response("Sent 10 USDC.")]);
    let runtime = AgentRuntime::assemble(&config, Arc::new(llm), None).expect("runtime");
    let slack = SlackWebClient::new(
        &server.url(),
        "xapp-test".to_string().into(),
        "xoxb-test".to_string().into(),
        Duration::from_secs(5),
    )
    .expect("slack client");
    let options =
        BackfillOptions { channel: "C1".to_string(), limit: 5, delay: Duration::ZERO };

    let result = backfill::execute(&runtime, &slack, &options, &TurnPrinter::default()).await;

    history.assert_async().await;
    assert_eq!(result.exit_code, 0);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["message"], "processed 1 of 3 fetched messages, 0 failed");
    assert_eq!(payload["data"]["results"][0]["ts"], "3.0");
    assert_eq!(payload["data"]["results"][0]["outcome"]["subtype"], "success");
}

#[tokio::test]
async fn backfill_reports_slack_history_errors() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/conversations.history")
        .match_query(mockito::Matcher::Any)
        .with_body(r#"{"ok":false,"error":"channel_not_found"}"#)
        .create_async()
        .await;

    let dir = lookup_dir();
    let config = test_config(dir.path());
    let runtime =
        AgentRuntime::assemble(&config, Arc::new(ScriptedLlm::new(Vec::new())), None).expect("runtime");
    let slack = SlackWebClient::new(
        &server.url(),
        "xapp-test".to_string().into(),
        "xoxb-test".to_string().into(),
        Duration::from_secs(5),
    )
    .expect("slack client");
    let options =
        BackfillOptions { channel: "C404".to_string(), limit: 5, delay: Duration::ZERO };

    let result = backfill::execute(&runtime, &slack, &options, &TurnPrinter::default()).await;

    assert_eq!(result.exit_code, 1);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["error_class"], "slack_history");
    assert!(payload["message"].as_str().unwrap_or_default().contains("channel_not_found"));
}

struct ScriptedLlm {
    responses: Mutex<VecDeque<LlmResponse>>,
}

impl ScriptedLlm {
    fn new(responses: Vec<LlmResponse>) -> Self {
        Self { responses: Mutex::new(responses.into()) }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
        self.responses
            .lock()
            .expect("responses")
            .pop_front()
            .ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string()))
    }
}

fn tool_use_response(id: &str, name: &str) -> LlmResponse {
    LlmResponse {
        content: vec![
            ContentBlock::text("Looking up the wallet."),
            ContentBlock::ToolUse { id: id.to_string(), name: name.to_string(), input: json!({}) },
        ],
        stop_reason: Some(StopReason::ToolUse),
    }
}

fn text_response(text: &str) -> LlmResponse {
    LlmResponse { content: vec![ContentBlock::text(text)], stop_reason: Some(StopReason::EndTurn) }
}

fn lookup_dir() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("wallet.json"), r#"{"U123":"wallet-abc"}"#).expect("wallet");
    fs::write(dir.path().join("hierarchy.json"), r#"{"U123":"U999"}"#).expect("hierarchy");
    fs::write(
        dir.path().join("budget.json"),
        r#"{"U123":{"total_budget":100,"dollars_spent":20}}"#,
    )
    .expect("budget");
    dir
}

fn test_config(data_dir: &Path) -> AppConfig {
    let mut config = None;
    with_env(&[], || {
        config = Some(
            AppConfig::load(LoadOptions {
                config_path: None,
                require_file: false,
                overrides: ConfigOverrides {
                    slack_app_token: Some("xapp-test".to_string()),
                    slack_bot_token: Some("xoxb-test".to_string()),
                    llm_api_key: Some("sk-ant-test".to_string()),
                    lookup_data_dir: Some(data_dir.to_path_buf()),
                    ..ConfigOverrides::default()
                },
            })
            .expect("config"),
        );
    });
    config.expect("config loaded")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "PAYRELAY_SLACK_APP_TOKEN",
        "PAYRELAY_SLACK_BOT_TOKEN",
        "PAYRELAY_SLACK_API_BASE",
        "PAYRELAY_SLACK_TRIGGER_PHRASE",
        "PAYRELAY_LLM_API_KEY",
        "PAYRELAY_LLM_BASE_URL",
        "PAYRELAY_LLM_MODEL",
        "PAYRELAY_LLM_MAX_TURNS",
        "PAYRELAY_PAYMENT_SERVER_NAME",
        "PAYRELAY_PAYMENT_URL",
        "PAYRELAY_PAYMENT_API_KEY",
        "PAYRELAY_LOOKUP_DATA_DIR",
        "PAYRELAY_RELAY_PROMPT_TEMPLATE_PATH",
        "PAYRELAY_OCR_ENABLED",
        "PAYRELAY_OCR_PROMPT_PATH",
        "PAYRELAY_LOGGING_LEVEL",
        "PAYRELAY_LOGGING_FORMAT",
        "PAYRELAY_LOG_LEVEL",
        "PAYRELAY_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
