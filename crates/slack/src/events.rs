use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::blocks::MessageTemplate;

pub const DIRECT_MESSAGE_CHANNEL_TYPE: &str = "im";
pub const FILE_SHARE_SUBTYPE: &str = "file_share";
const BOT_MESSAGE_SUBTYPE: &str = "bot_message";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    /// Channel and thread a reply to this event belongs in.
    pub fn reply_target(&self) -> Option<(&str, &str)> {
        match self {
            Self::Message(event) => Some((event.channel_id.as_str(), event.reply_thread_ts())),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    Unsupported,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub channel_type: Option<String>,
    pub user_id: Option<String>,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub files: Vec<SlackFile>,
}

impl MessageEvent {
    pub fn reply_thread_ts(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    pub fn is_bot_authored(&self) -> bool {
        self.bot_id.is_some() || self.subtype.as_deref() == Some(BOT_MESSAGE_SUBTYPE)
    }

    pub fn is_direct_message(&self) -> bool {
        self.channel_type.as_deref() == Some(DIRECT_MESSAGE_CHANNEL_TYPE)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SlackFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub url_private_download: Option<String>,
    #[serde(default)]
    pub url_private: Option<String>,
}

impl SlackFile {
    pub fn is_image(&self) -> bool {
        self.mimetype.as_deref().is_some_and(|mime| mime.starts_with("image/"))
    }

    pub fn download_url(&self) -> Option<&str> {
        self.url_private_download.as_deref().or(self.url_private.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct EventCallbackPayload {
    event: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawMessageEvent {
    channel: String,
    #[serde(default)]
    channel_type: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    text: Option<String>,
    ts: String,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    files: Vec<SlackFile>,
}

impl From<RawMessageEvent> for MessageEvent {
    fn from(raw: RawMessageEvent) -> Self {
        Self {
            channel_id: raw.channel,
            channel_type: raw.channel_type,
            user_id: raw.user,
            bot_id: raw.bot_id,
            subtype: raw.subtype,
            text: raw.text.unwrap_or_default(),
            ts: raw.ts,
            thread_ts: raw.thread_ts,
            files: raw.files,
        }
    }
}

/// Decodes the payload of a Socket Mode `events_api` envelope.
pub fn parse_events_api_payload(payload: &Value) -> SlackEvent {
    let event = serde_json::from_value::<EventCallbackPayload>(payload.clone())
        .ok()
        .and_then(|callback| callback.event);
    let Some(event) = event else {
        let event_type =
            payload.get("type").and_then(Value::as_str).unwrap_or("unknown").to_owned();
        return SlackEvent::Unsupported { event_type };
    };

    let event_type = event.get("type").and_then(Value::as_str).unwrap_or("unknown").to_owned();
    if event_type != "message" {
        return SlackEvent::Unsupported { event_type };
    }

    match serde_json::from_value::<RawMessageEvent>(event) {
        Ok(raw) => SlackEvent::Message(raw.into()),
        Err(_) => SlackEvent::Unsupported { event_type: "message.malformed".to_owned() },
    }
}

pub fn trigger_matches(text: &str, trigger_phrase: &str) -> bool {
    !trigger_phrase.is_empty() && text.contains(trigger_phrase)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("payment request handler failure: {0}")]
    PaymentRequest(String),
    #[error("receipt upload handler failure: {0}")]
    ReceiptUpload(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait]
pub trait MessageService: Send + Sync {
    async fn handle_payment_request(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError>;

    async fn handle_receipt_upload(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError>;
}

pub struct MessageHandler<S> {
    service: S,
    trigger_phrase: String,
    bot_user_id: Option<String>,
}

impl<S> MessageHandler<S>
where
    S: MessageService,
{
    pub fn new(service: S, trigger_phrase: impl Into<String>) -> Self {
        Self { service, trigger_phrase: trigger_phrase.into(), bot_user_id: None }
    }

    /// Messages authored by this user are never treated as requests.
    pub fn with_bot_user_id(mut self, bot_user_id: impl Into<String>) -> Self {
        self.bot_user_id = Some(bot_user_id.into());
        self
    }

    fn is_own_message(&self, event: &MessageEvent) -> bool {
        match (&self.bot_user_id, &event.user_id) {
            (Some(bot_user_id), Some(user_id)) => bot_user_id == user_id,
            _ => false,
        }
    }
}

#[async_trait]
impl<S> EventHandler for MessageHandler<S>
where
    S: MessageService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        if event.is_bot_authored() || self.is_own_message(event) || event.user_id.is_none() {
            return Ok(HandlerResult::Ignored);
        }

        let is_file_share = event.subtype.as_deref() == Some(FILE_SHARE_SUBTYPE);
        if is_file_share && event.is_direct_message() {
            let message = self.service.handle_receipt_upload(event, ctx).await?;
            return Ok(responded_or_processed(message));
        }

        if event.subtype.is_some() && !is_file_share {
            return Ok(HandlerResult::Ignored);
        }

        if !trigger_matches(&event.text, &self.trigger_phrase) {
            return Ok(HandlerResult::Processed);
        }

        let message = self.service.handle_payment_request(event, ctx).await?;
        Ok(responded_or_processed(message))
    }
}

fn responded_or_processed(message: Option<MessageTemplate>) -> HandlerResult {
    match message {
        Some(message) => HandlerResult::Responded(message),
        None => HandlerResult::Processed,
    }
}
