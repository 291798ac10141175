use payrelay_agent::{AgentRuntime, TurnSink};
use payrelay_core::config::{AppConfig, LoadOptions};
use payrelay_core::{PaymentRequest, RequestSource};
use serde_json::json;

use super::{block_on, CommandResult, TurnPrinter};

pub const CLI_CHANNEL: &str = "cli";

pub fn run(user_id: &str, text: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("process", "config_validation", error.to_string(), 2),
    };

    let printer = TurnPrinter::stdout();
    let outcome = block_on(async {
        let runtime = match AgentRuntime::from_config(&config).await {
            Ok(runtime) => runtime,
            Err(error) => return CommandResult::failure("process", "runtime_setup", error.to_string(), 2),
        };
        execute(&runtime, user_id, text, &printer).await
    });

    outcome.unwrap_or_else(|error| {
        CommandResult::failure("process", "runtime_setup", format!("failed to initialize async runtime: {error}"), 2)
    })
}

/// Runs one request as if `user_id` had posted `text`, sending turns to `sink`.
pub async fn execute(
    runtime: &AgentRuntime,
    user_id: &str,
    text: &str,
    sink: &dyn TurnSink,
) -> CommandResult {
    if text.trim().is_empty() {
        return CommandResult::failure("process", "invalid_input", "request text is empty", 2);
    }

    let request = PaymentRequest::new(CLI_CHANNEL, user_id, "0", None, text, RequestSource::Message);
    match runtime.session.run(&request, sink).await {
        Ok(outcome) => CommandResult::success_with_data(
            "process",
            format!("session finished with {}", outcome.subtype.as_str()),
            Some(json!({
                "request_id": request.request_id,
                "payment_server": runtime.payment_status,
                "outcome": outcome,
            })),
        ),
        Err(error) => CommandResult::failure("process", "session_failed", error.to_string(), 1),
    }
}
