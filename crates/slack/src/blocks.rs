use serde::Serialize;

/// Slack rejects section text longer than this.
pub const SECTION_TEXT_LIMIT: usize = 3000;

pub const RECEIPT_ACK_TEXT: &str = "Thanks for sending the file! I've received it. 📁";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Context { block_id: String, elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(truncate_section_text(text.into())));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(truncate_section_text(text.into())));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

fn truncate_section_text(text: String) -> String {
    if text.chars().count() <= SECTION_TEXT_LIMIT {
        return text;
    }
    let mut truncated: String = text.chars().take(SECTION_TEXT_LIMIT - 1).collect();
    truncated.push('…');
    truncated
}

pub fn receipt_acknowledgement_message() -> MessageTemplate {
    MessageBuilder::new(RECEIPT_ACK_TEXT)
        .section("payment.receipt.ack.v1", |section| {
            section.plain(RECEIPT_ACK_TEXT);
        })
        .build()
}

pub fn request_accepted_message(request_id: &str) -> MessageTemplate {
    MessageBuilder::new("Processing payment request...")
        .section("payment.accepted.v1", |section| {
            section.mrkdwn(":hourglass_flowing_sand: Processing payment request...");
        })
        .context("payment.accepted.context.v1", |context| {
            context.plain(format!("Request ID: {request_id}"));
        })
        .build()
}

pub fn tool_progress_message(tool_name: &str) -> MessageTemplate {
    MessageBuilder::new(format!("🔧 {tool_name}"))
        .section("payment.tool.progress.v1", |section| {
            section.mrkdwn(format!("🔧 `{tool_name}`"));
        })
        .build()
}

pub fn mcp_warning_message(server_name: &str, status: &str) -> MessageTemplate {
    let summary = format!(
        "⚠️ MCP connection issue: `{server_name}` is {status}. Payment tools may be unavailable."
    );
    MessageBuilder::new(summary.clone())
        .section("payment.mcp.warning.v1", |section| {
            section.mrkdwn(summary);
        })
        .build()
}

pub fn assistant_text_message(text: &str) -> MessageTemplate {
    MessageBuilder::new(text.to_owned())
        .section("payment.assistant.text.v1", |section| {
            section.mrkdwn(text);
        })
        .build()
}

pub fn payment_result_message(result: &str, tools_used: &[String]) -> MessageTemplate {
    result_message("✅ Payment processing complete", result, tools_used)
}

pub fn turn_limit_message(result: &str, tools_used: &[String], turns: u32) -> MessageTemplate {
    result_message(
        &format!("⚠️ Stopped after {turns} turns without a final answer"),
        result,
        tools_used,
    )
}

pub fn incomplete_tool_use_message(result: &str, tools_used: &[String]) -> MessageTemplate {
    result_message(
        "⚠️ Stopped before the requested tools could run; nothing further was sent",
        result,
        tools_used,
    )
}

fn result_message(heading: &str, result: &str, tools_used: &[String]) -> MessageTemplate {
    let result = if result.trim().is_empty() { "(no result text)" } else { result };
    let mut builder = MessageBuilder::new(format!("{heading}\n{result}"))
        .section("payment.result.heading.v1", |section| {
            section.mrkdwn(format!("*{heading}*"));
        })
        .section("payment.result.body.v1", |section| {
            section.mrkdwn(result);
        });

    if !tools_used.is_empty() {
        builder = builder.section("payment.result.tools.v1", |section| {
            section.mrkdwn(format!("*Tools used:*\n{}", numbered_tool_list(tools_used)));
        });
    }

    builder.build()
}

pub fn numbered_tool_list(tools_used: &[String]) -> String {
    tools_used
        .iter()
        .enumerate()
        .map(|(index, tool)| format!("{}. `{tool}`", index + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("payment.error.summary.v1", |section| {
            section.mrkdwn(format!(":warning: {summary}"));
        })
        .context("payment.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::{
        error_message, incomplete_tool_use_message, mcp_warning_message, payment_result_message,
        receipt_acknowledgement_message, tool_progress_message, turn_limit_message, Block,
        MessageBuilder, TextObject, SECTION_TEXT_LIMIT,
    };

    #[test]
    fn message_builder_creates_typed_block_structure() {
        let message = MessageBuilder::new("fallback")
            .section("payment.summary.v1", |section| {
                section.mrkdwn("*Payment Summary*");
            })
            .context("payment.summary.context.v1", |context| {
                context.plain("Request ID: r-1");
            })
            .build();

        assert_eq!(message.blocks.len(), 2);
        assert!(matches!(
            &message.blocks[0],
            Block::Section {
                block_id,
                text: TextObject::Mrkdwn { .. }
            } if block_id == "payment.summary.v1"
        ));
        assert!(matches!(
            &message.blocks[1],
            Block::Context { block_id, elements } if block_id == "payment.summary.context.v1" && elements.len() == 1
        ));
    }

    #[test]
    fn receipt_ack_uses_fixed_text() {
        let message = receipt_acknowledgement_message();
        assert_eq!(message.fallback_text, "Thanks for sending the file! I've received it. 📁");
    }

    #[test]
    fn result_lists_tools_in_order() {
        let tools = vec!["get_wallet_id".to_string(), "mcp__locus__send_payment".to_string()];
        let message = payment_result_message("Sent $45 to wallet-xyz.", &tools);

        assert_eq!(message.blocks.len(), 3);
        assert!(matches!(
            &message.blocks[2],
            Block::Section { text: TextObject::Mrkdwn { text }, .. }
                if text.contains("1. `get_wallet_id`") && text.contains("2. `mcp__locus__send_payment`")
        ));
        assert!(message.fallback_text.contains("Sent $45 to wallet-xyz."));
    }

    #[test]
    fn result_without_tools_omits_tool_section() {
        let message = payment_result_message("Missing the amount.", &[]);
        assert_eq!(message.blocks.len(), 2);
    }

    #[test]
    fn turn_limit_heading_names_turn_count() {
        let message = turn_limit_message("", &[], 12);
        assert!(message.fallback_text.contains("Stopped after 12 turns"));
        assert!(message.fallback_text.contains("(no result text)"));
    }

    #[test]
    fn incomplete_tool_use_lists_only_tools_that_ran() {
        let message =
            incomplete_tool_use_message("Sending the payment now.", &["get_wallet_id".to_owned()]);
        assert!(message.fallback_text.contains("Stopped before the requested tools could run"));
        assert_eq!(message.blocks.len(), 3);
    }

    #[test]
    fn long_section_text_is_truncated() {
        let long = "x".repeat(SECTION_TEXT_LIMIT + 50);
        let message = payment_result_message(&long, &[]);
        let Block::Section { text: TextObject::Mrkdwn { text }, .. } = &message.blocks[1] else {
            panic!("expected mrkdwn section");
        };
        assert_eq!(text.chars().count(), SECTION_TEXT_LIMIT);
        assert!(text.ends_with('…'));
        assert_eq!(message.fallback_text.len(), long.len() + "✅ Payment processing complete\n".len());
    }

    #[test]
    fn progress_and_warning_templates_name_their_subject() {
        assert_eq!(tool_progress_message("get_budget_info").fallback_text, "🔧 get_budget_info");
        assert!(mcp_warning_message("locus", "failed").fallback_text.contains("`locus` is failed"));
    }

    #[test]
    fn error_template_contains_correlation_id() {
        let message = error_message("Cannot process request", "req-123");
        let Block::Context { elements, .. } = &message.blocks[1] else {
            panic!("expected context block");
        };
        assert!(matches!(
            elements.first(),
            Some(TextObject::Plain { text }) if text.contains("req-123")
        ));
    }
}
