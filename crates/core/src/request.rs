use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSource {
    Message,
    Receipt,
}

impl RequestSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Receipt => "receipt",
        }
    }
}

/// A payment request taken from a Slack message or a receipt upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub request_id: Uuid,
    pub channel_id: String,
    pub requester_id: String,
    pub message_ts: String,
    pub thread_ts: Option<String>,
    pub text: String,
    pub source: RequestSource,
}

impl PaymentRequest {
    pub fn new(
        channel_id: impl Into<String>,
        requester_id: impl Into<String>,
        message_ts: impl Into<String>,
        thread_ts: Option<String>,
        text: impl Into<String>,
        source: RequestSource,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            channel_id: channel_id.into(),
            requester_id: requester_id.into(),
            message_ts: message_ts.into(),
            thread_ts,
            text: text.into(),
            source,
        }
    }

    /// Replies go into the existing thread, or start one under the triggering message.
    pub fn reply_thread_ts(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.message_ts)
    }

    pub fn correlation_id(&self) -> String {
        self.request_id.to_string()
    }
}
