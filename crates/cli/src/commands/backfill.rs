use std::time::Duration;

use payrelay_agent::{AgentRuntime, TurnSink};
use payrelay_core::config::{AppConfig, LoadOptions};
use payrelay_core::{PaymentRequest, RequestSource};
use payrelay_slack::web::SlackWebClient;
use serde_json::json;

use super::{block_on, CommandResult, TurnPrinter};

const SLACK_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct BackfillOptions {
    pub channel: String,
    pub limit: u32,
    pub delay: Duration,
}

pub fn run(options: BackfillOptions) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("backfill", "config_validation", error.to_string(), 2),
    };
    let slack = match SlackWebClient::new(
        &config.slack.api_base,
        config.slack.app_token.clone(),
        config.slack.bot_token.clone(),
        SLACK_HTTP_TIMEOUT,
    ) {
        Ok(slack) => slack,
        Err(error) => return CommandResult::failure("backfill", "slack_setup", error.to_string(), 2),
    };

    let printer = TurnPrinter::stdout();
    let outcome = block_on(async {
        let runtime = match AgentRuntime::from_config(&config).await {
            Ok(runtime) => runtime,
            Err(error) => return CommandResult::failure("backfill", "runtime_setup", error.to_string(), 2),
        };
        execute(&runtime, &slack, &options, &printer).await
    });

    outcome.unwrap_or_else(|error| {
        CommandResult::failure("backfill", "runtime_setup", format!("failed to initialize async runtime: {error}"), 2)
    })
}

/// Processes recent channel messages that carry text, one at a time, in the
/// order Slack returns them, pausing `options.delay` between requests.
pub async fn execute(
    runtime: &AgentRuntime,
    slack: &SlackWebClient,
    options: &BackfillOptions,
    sink: &dyn TurnSink,
) -> CommandResult {
    let messages = match slack.conversations_history(&options.channel, options.limit).await {
        Ok(messages) => messages,
        Err(error) => return CommandResult::failure("backfill", "slack_history", error.to_string(), 1),
    };

    let fetched = messages.len();
    let pending: Vec<_> = messages
        .into_iter()
        .filter(|message| !message.is_bot_authored() && !message.text.trim().is_empty())
        .collect();
    if pending.is_empty() {
        return CommandResult::success("backfill", "no messages with text to process");
    }

    let mut results = Vec::with_capacity(pending.len());
    let mut failures = 0_usize;
    for (index, message) in pending.iter().enumerate() {
        if index > 0 && !options.delay.is_zero() {
            tokio::time::sleep(options.delay).await;
        }

        let request = PaymentRequest::new(
            message.channel_id.clone(),
            message.user_id.clone().unwrap_or_else(|| "unknown".to_string()),
            message.ts.clone(),
            message.thread_ts.clone(),
            message.text.clone(),
            RequestSource::Message,
        );
        match runtime.session.run(&request, sink).await {
            Ok(outcome) => results.push(json!({ "ts": message.ts, "outcome": outcome })),
            Err(error) => {
                failures += 1;
                results.push(json!({ "ts": message.ts, "error": error.to_string() }));
            }
        }
    }

    let summary =
        format!("processed {} of {fetched} fetched messages, {failures} failed", pending.len());
    let data = Some(json!({ "channel": options.channel, "results": results }));
    if failures > 0 {
        return CommandResult::failure_with_data("backfill", "session_failed", summary, 1, data);
    }
    CommandResult::success_with_data("backfill", summary, data)
}
