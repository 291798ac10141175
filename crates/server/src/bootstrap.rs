use std::sync::Arc;
use std::time::Duration;

use payrelay_agent::{AgentRuntime, RuntimeError};
use payrelay_core::config::{AppConfig, ConfigError, LoadOptions};
use payrelay_slack::events::{EventDispatcher, MessageHandler};
use payrelay_slack::socket::{SocketModeRunner, SocketTransport, WebSocketTransport};
use payrelay_slack::web::{FileDownloader, MessagePoster, SlackApiError, SlackWebClient};
use thiserror::Error;
use tracing::info;

use crate::health::HealthState;
use crate::relay::{PaymentRelayService, RelaySettings};

const SLACK_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Application {
    pub config: AppConfig,
    pub health: HealthState,
    pub transport: Arc<dyn SocketTransport>,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("slack setup failed: {0}")]
    Slack(#[from] SlackApiError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let runtime = AgentRuntime::from_config(&config).await?;
    let slack = Arc::new(SlackWebClient::new(
        &config.slack.api_base,
        config.slack.app_token.clone(),
        config.slack.bot_token.clone(),
        SLACK_HTTP_TIMEOUT,
    )?);
    let bot_user_id = slack.auth_test().await?;
    info!(
        event_name = "system.bootstrap.slack_identified",
        correlation_id = "bootstrap",
        bot_user_id = %bot_user_id,
        "slack bot identity resolved"
    );

    let transport: Arc<dyn SocketTransport> = Arc::new(WebSocketTransport::new(slack.clone()));
    let health = HealthState::new(runtime.lookup.clone(), runtime.payment_status);
    let slack_runner =
        build_runner(&config, runtime, slack.clone(), slack, transport.clone(), Some(bot_user_id));

    Ok(Application { config, health, transport, slack_runner })
}

/// Wires the relay service behind the message handler and socket runner.
pub fn build_runner(
    config: &AppConfig,
    runtime: AgentRuntime,
    poster: Arc<dyn MessagePoster>,
    downloader: Arc<dyn FileDownloader>,
    transport: Arc<dyn SocketTransport>,
    bot_user_id: Option<String>,
) -> SocketModeRunner {
    let settings = RelaySettings {
        post_tool_progress: config.relay.post_tool_progress,
        post_assistant_text: config.relay.post_assistant_text,
        acknowledge_file_uploads: config.slack.acknowledge_file_uploads,
    };
    let mut service =
        PaymentRelayService::new(runtime.session, poster.clone(), downloader, settings);
    if let Some(ocr) = runtime.ocr {
        service = service.with_ocr(ocr);
    }

    let mut handler = MessageHandler::new(service, config.slack.trigger_phrase.clone());
    if let Some(bot_user_id) = bot_user_id {
        handler = handler.with_bot_user_id(bot_user_id);
    }
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(handler);

    SocketModeRunner::new(transport, dispatcher).with_poster(poster)
}
