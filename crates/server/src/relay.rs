//! Relays agent turns for a payment request into its Slack thread.

use std::sync::Arc;

use async_trait::async_trait;
use payrelay_agent::{
    AgentSession, AgentTurn, OcrError, ReceiptTextExtractor, ResultSubtype, SessionError, TurnSink,
};
use payrelay_core::{ApplicationError, DomainError, PaymentRequest, RequestSource};
use payrelay_slack::blocks::{
    assistant_text_message, error_message, incomplete_tool_use_message, mcp_warning_message,
    payment_result_message, receipt_acknowledgement_message, request_accepted_message,
    tool_progress_message, turn_limit_message, MessageTemplate,
};
use payrelay_slack::events::{EventContext, EventHandlerError, MessageEvent, MessageService};
use payrelay_slack::web::{FileDownloader, MessagePoster};
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelaySettings {
    pub post_tool_progress: bool,
    pub post_assistant_text: bool,
    pub acknowledge_file_uploads: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self { post_tool_progress: true, post_assistant_text: false, acknowledge_file_uploads: true }
    }
}

/// Posts each turn into one thread. Posting failures are logged and dropped so
/// a Slack hiccup never aborts a payment in flight.
pub struct SlackTurnSink {
    poster: Arc<dyn MessagePoster>,
    channel_id: String,
    thread_ts: String,
    correlation_id: String,
    settings: RelaySettings,
}

impl SlackTurnSink {
    pub fn new(poster: Arc<dyn MessagePoster>, request: &PaymentRequest, settings: RelaySettings) -> Self {
        Self {
            poster,
            channel_id: request.channel_id.clone(),
            thread_ts: request.reply_thread_ts().to_owned(),
            correlation_id: request.correlation_id(),
            settings,
        }
    }

    async fn post(&self, message: MessageTemplate) {
        if let Err(error) =
            self.poster.post_message(&self.channel_id, Some(&self.thread_ts), &message).await
        {
            warn!(
                event_name = "egress.slack.post_failed",
                correlation_id = %self.correlation_id,
                thread_id = %self.thread_ts,
                error = %error,
                "failed to post turn into thread"
            );
        }
    }
}

#[async_trait]
impl TurnSink for SlackTurnSink {
    async fn on_turn(&self, turn: &AgentTurn) {
        match turn {
            AgentTurn::Init { mcp_server, mcp_status, tools } => {
                info!(
                    event_name = "relay.session.init",
                    correlation_id = %self.correlation_id,
                    mcp_server = %mcp_server,
                    mcp_status = %mcp_status,
                    tool_count = tools.len(),
                    "agent session initialized"
                );
                if mcp_status != "connected" {
                    self.post(mcp_warning_message(mcp_server, mcp_status)).await;
                }
            }
            AgentTurn::Assistant { text, tool_uses } => {
                if self.settings.post_assistant_text && !text.trim().is_empty() {
                    self.post(assistant_text_message(text)).await;
                }
                if self.settings.post_tool_progress {
                    for tool_use in tool_uses {
                        self.post(tool_progress_message(&tool_use.name)).await;
                    }
                }
            }
            AgentTurn::ToolResult { tool_name, is_error, .. } => {
                debug!(
                    event_name = "relay.session.tool_result",
                    correlation_id = %self.correlation_id,
                    tool_name = %tool_name,
                    is_error,
                    "tool result returned to agent"
                );
            }
            AgentTurn::Result { subtype, result, tools_used, turns } => {
                let message = match subtype {
                    ResultSubtype::Success => payment_result_message(result, tools_used),
                    ResultSubtype::ErrorMaxTurns => turn_limit_message(result, tools_used, *turns),
                    ResultSubtype::ErrorIncompleteToolUse => {
                        incomplete_tool_use_message(result, tools_used)
                    }
                };
                self.post(message).await;
            }
        }
    }
}

pub struct PaymentRelayService {
    session: Arc<AgentSession>,
    poster: Arc<dyn MessagePoster>,
    downloader: Arc<dyn FileDownloader>,
    ocr: Option<Arc<ReceiptTextExtractor>>,
    settings: RelaySettings,
}

impl PaymentRelayService {
    pub fn new(
        session: Arc<AgentSession>,
        poster: Arc<dyn MessagePoster>,
        downloader: Arc<dyn FileDownloader>,
        settings: RelaySettings,
    ) -> Self {
        Self { session, poster, downloader, ocr: None, settings }
    }

    /// Receipt images are only read when an extractor is configured.
    pub fn with_ocr(mut self, extractor: Arc<ReceiptTextExtractor>) -> Self {
        self.ocr = Some(extractor);
        self
    }

    /// Runs one request end to end, posting progress into its thread.
    pub async fn process(&self, request: &PaymentRequest) -> Result<(), ApplicationError> {
        let correlation_id = request.correlation_id();
        info!(
            event_name = "relay.request.accepted",
            correlation_id = %correlation_id,
            request_id = %request.request_id,
            thread_id = %request.reply_thread_ts(),
            source = request.source.as_str(),
            requester_id = %request.requester_id,
            "processing payment request"
        );

        let sink = SlackTurnSink::new(self.poster.clone(), request, self.settings);
        sink.post(request_accepted_message(&correlation_id)).await;

        let outcome = self.session.run(request, &sink).await.map_err(session_failure)?;
        info!(
            event_name = "relay.request.completed",
            correlation_id = %correlation_id,
            subtype = outcome.subtype.as_str(),
            turns = outcome.turns,
            tools_used = outcome.tools_used.len(),
            "payment request finished"
        );
        Ok(())
    }

    async fn process_or_report(&self, request: PaymentRequest) -> Option<MessageTemplate> {
        let correlation_id = request.correlation_id();
        match self.process(&request).await {
            Ok(()) => None,
            Err(error) => Some(failure_message(error, &correlation_id)),
        }
    }

    async fn read_receipt(&self, event: &MessageEvent) -> Result<Option<String>, ApplicationError> {
        let Some(extractor) = &self.ocr else {
            return Ok(None);
        };
        let Some(file) = event.files.iter().find(|file| file.is_image()) else {
            debug!(
                event_name = "relay.receipt.no_image",
                thread_id = %event.reply_thread_ts(),
                file_count = event.files.len(),
                "file upload carried no image"
            );
            return Ok(None);
        };
        let Some(url) = file.download_url() else {
            return Err(DomainError::UnreadableReceipt(format!("file {} has no download url", file.id)).into());
        };

        let bytes = self
            .downloader
            .download_file(url)
            .await
            .map_err(|error| ApplicationError::Integration(error.to_string()))?;
        let text = extractor.extract(&bytes, file.mimetype.as_deref()).await.map_err(ocr_failure)?;
        Ok(Some(text))
    }
}

#[async_trait]
impl MessageService for PaymentRelayService {
    async fn handle_payment_request(
        &self,
        event: &MessageEvent,
        _ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError> {
        let Some(requester_id) = event.user_id.clone() else {
            return Err(EventHandlerError::PaymentRequest("message has no author".to_owned()));
        };
        let request = PaymentRequest::new(
            event.channel_id.clone(),
            requester_id,
            event.ts.clone(),
            event.thread_ts.clone(),
            event.text.clone(),
            RequestSource::Message,
        );
        Ok(self.process_or_report(request).await)
    }

    async fn handle_receipt_upload(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError> {
        let Some(requester_id) = event.user_id.clone() else {
            return Err(EventHandlerError::ReceiptUpload("upload has no author".to_owned()));
        };

        if self.settings.acknowledge_file_uploads {
            if let Err(error) =
                self.poster.post_message(&event.channel_id, None, &receipt_acknowledgement_message()).await
            {
                warn!(
                    event_name = "egress.slack.post_failed",
                    correlation_id = %ctx.correlation_id,
                    error = %error,
                    "failed to acknowledge file upload"
                );
            }
        }

        let text = match self.read_receipt(event).await {
            Ok(Some(text)) => text,
            Ok(None) => return Ok(None),
            Err(error) => return Ok(Some(failure_message(error, &ctx.correlation_id))),
        };

        let request = PaymentRequest::new(
            event.channel_id.clone(),
            requester_id,
            event.ts.clone(),
            Some(event.reply_thread_ts().to_owned()),
            text,
            RequestSource::Receipt,
        );
        Ok(self.process_or_report(request).await)
    }
}

fn session_failure(error: SessionError) -> ApplicationError {
    match error {
        SessionError::Prompt(error) => ApplicationError::Configuration(error.to_string()),
        SessionError::Llm(error) => ApplicationError::Integration(error.to_string()),
    }
}

fn ocr_failure(error: OcrError) -> ApplicationError {
    match error {
        OcrError::Llm(error) => ApplicationError::Integration(error.to_string()),
        other => DomainError::UnreadableReceipt(other.to_string()).into(),
    }
}

fn failure_message(error: ApplicationError, correlation_id: &str) -> MessageTemplate {
    error!(
        event_name = "relay.request.failed",
        correlation_id,
        error = %error,
        "payment request failed"
    );
    let interface = error.into_interface(correlation_id);
    error_message(interface.user_message(), interface.correlation_id())
}
