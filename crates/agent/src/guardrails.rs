//! Tool permission policy applied before every tool call the agent makes.

use serde_json::{Map, Value};

use crate::tools::LOOKUP_TOOL_NAMES;

/// Who the agent is acting for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionContext {
    pub requester_id: String,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PermissionDecision {
    Allow { updated_input: Value },
    Deny { reason_code: &'static str, message: String },
}

impl PermissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Allow { .. } => "allow",
            Self::Deny { .. } => "deny",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolPermissionPolicy {
    server_name: String,
    allowed_patterns: Vec<String>,
}

impl ToolPermissionPolicy {
    /// Allows every tool of the payment server plus the local lookup tools.
    pub fn for_server(server_name: &str) -> Self {
        let mut allowed_patterns = vec![format!("mcp__{server_name}__*")];
        allowed_patterns.extend(LOOKUP_TOOL_NAMES.iter().map(|name| (*name).to_string()));
        Self::new(server_name, allowed_patterns)
    }

    pub fn new(server_name: &str, allowed_patterns: Vec<String>) -> Self {
        Self { server_name: server_name.to_string(), allowed_patterns }
    }

    pub fn allowed_patterns(&self) -> &[String] {
        &self.allowed_patterns
    }

    pub fn is_allowed(&self, tool_name: &str) -> bool {
        self.allowed_patterns.iter().any(|pattern| match pattern.strip_suffix('*') {
            Some(prefix) => tool_name.starts_with(prefix),
            None => tool_name == pattern,
        })
    }

    pub fn evaluate(
        &self,
        tool_name: &str,
        input: &Value,
        context: &PermissionContext,
    ) -> PermissionDecision {
        if !self.is_allowed(tool_name) {
            return PermissionDecision::Deny {
                reason_code: "tool_not_allowed",
                message: format!("Only {} tools are allowed", display_name(&self.server_name)),
            };
        }

        if !LOOKUP_TOOL_NAMES.contains(&tool_name) {
            return PermissionDecision::Allow { updated_input: input.clone() };
        }

        let mut fields = match input {
            Value::Object(fields) => fields.clone(),
            Value::Null => Map::new(),
            _ => {
                return PermissionDecision::Deny {
                    reason_code: "invalid_tool_input",
                    message: format!("{tool_name} expects an object input"),
                }
            }
        };
        let has_user = fields
            .get("slack_user_id")
            .and_then(Value::as_str)
            .is_some_and(|value| !value.trim().is_empty());
        if !has_user {
            fields.insert("slack_user_id".to_string(), Value::String(context.requester_id.clone()));
        }
        PermissionDecision::Allow { updated_input: Value::Object(fields) }
    }
}

/// `locus` -> `Locus`, as the server is named in user-facing text.
fn display_name(server_name: &str) -> String {
    let mut chars = server_name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
