//! Slack integration for the payment relay.
//!
//! - **Socket Mode** (`socket`) - websocket connection to Slack (no public URL needed)
//! - **Events** (`events`) - message parsing, trigger matching and handler dispatch
//! - **Web API** (`web`) - posting replies, channel history and file downloads
//! - **Block Kit** (`blocks`) - reply templates posted into request threads
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and subscribe to `message.channels` and `message.im`
//! 3. Grant `chat:write`, `channels:history`, `im:history` and `files:read`
//! 4. Set env vars: `PAYRELAY_SLACK_APP_TOKEN`, `PAYRELAY_SLACK_BOT_TOKEN`
//!
//! ```text
//! Slack Events → SocketModeRunner → EventDispatcher → MessageHandler → MessageService
//!                       ↓
//!                MessagePoster ← HandlerResult::Responded
//! ```

pub mod blocks;
pub mod events;
pub mod socket;
pub mod web;
