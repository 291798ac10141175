use std::collections::HashMap;

use async_trait::async_trait;
use payrelay_core::{DomainError, LookupStore};
use serde_json::{json, Value};
use thiserror::Error;

use crate::llm::ToolDefinition;

pub const GET_WALLET_ID: &str = "get_wallet_id";
pub const GET_MANAGER_ID: &str = "get_manager_id";
pub const GET_BUDGET_INFO: &str = "get_budget_info";

/// Local tools the permission policy always allows.
pub const LOOKUP_TOOL_NAMES: [&str; 3] = [GET_WALLET_ID, GET_MANAGER_ID, GET_BUDGET_INFO];

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid tool input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Lookup(#[from] DomainError),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn definition(&self) -> ToolDefinition;
    async fn execute(&self, input: Value) -> Result<Value, ToolError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry with the three lookup tools over `store`.
    pub fn with_lookup_tools(store: LookupStore) -> Self {
        let mut registry = Self::default();
        registry.register(WalletIdTool { store: store.clone() });
        registry.register(ManagerIdTool { store: store.clone() });
        registry.register(BudgetInfoTool { store });
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(Box::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions sorted by name so the LLM sees a stable tool list.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<_> = self.tools.values().map(|tool| tool.definition()).collect();
        definitions.sort_by(|left, right| left.name.cmp(&right.name));
        definitions
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn user_lookup_definition(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "slack_user_id": {
                    "type": "string",
                    "description": "Slack user id (e.g. U01ABCDEF) to look up"
                }
            },
            "required": ["slack_user_id"]
        }),
    }
}

fn slack_user_id(input: &Value) -> Result<&str, ToolError> {
    input
        .get("slack_user_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ToolError::InvalidInput("`slack_user_id` must be a non-empty string".into()))
}

struct WalletIdTool {
    store: LookupStore,
}

#[async_trait]
impl Tool for WalletIdTool {
    fn name(&self) -> &'static str {
        GET_WALLET_ID
    }

    fn definition(&self) -> ToolDefinition {
        user_lookup_definition(
            GET_WALLET_ID,
            "Get the wallet ID for a Slack user. Returns the wallet ID mapped to the given Slack user.",
        )
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let user_id = slack_user_id(&input)?;
        let wallet_id = self.store.wallet_id(user_id)?;
        Ok(json!({ "slack_user_id": user_id, "wallet_id": wallet_id }))
    }
}

struct ManagerIdTool {
    store: LookupStore,
}

#[async_trait]
impl Tool for ManagerIdTool {
    fn name(&self) -> &'static str {
        GET_MANAGER_ID
    }

    fn definition(&self) -> ToolDefinition {
        user_lookup_definition(
            GET_MANAGER_ID,
            "Get the manager's Slack user ID for a given Slack user from the organizational hierarchy. \
             Returns null when the user has no manager.",
        )
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let user_id = slack_user_id(&input)?;
        let manager_id = self.store.manager_id(user_id)?;
        Ok(json!({
            "slack_user_id": user_id,
            "has_manager": manager_id.is_some(),
            "manager_id": manager_id,
        }))
    }
}

struct BudgetInfoTool {
    store: LookupStore,
}

#[async_trait]
impl Tool for BudgetInfoTool {
    fn name(&self) -> &'static str {
        GET_BUDGET_INFO
    }

    fn definition(&self) -> ToolDefinition {
        user_lookup_definition(
            GET_BUDGET_INFO,
            "Get budget information for a Slack user: total budget, dollars spent and remaining budget.",
        )
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let user_id = slack_user_id(&input)?;
        let budget = self.store.budget(user_id)?;
        Ok(json!({
            "slack_user_id": user_id,
            "total_budget": budget.total_budget.to_string(),
            "dollars_spent": budget.dollars_spent.to_string(),
            "remaining": budget.remaining().to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use payrelay_core::{DomainError, LookupStore};
    use serde_json::json;
    use tempfile::TempDir;

    use super::{ToolError, ToolRegistry, GET_BUDGET_INFO, GET_MANAGER_ID, GET_WALLET_ID};

    fn registry() -> (TempDir, ToolRegistry) {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("wallet.json"), r#"{"U1":"wallet-u1","U2":""}"#).expect("wallet");
        fs::write(dir.path().join("hierarchy.json"), r#"{"U1":"UMGR","UMGR":""}"#)
            .expect("hierarchy");
        fs::write(
            dir.path().join("budget.json"),
            r#"{"U1":{"total_budget":500,"dollars_spent":120.5}}"#,
        )
        .expect("budget");
        let registry = ToolRegistry::with_lookup_tools(LookupStore::new(dir.path()));
        (dir, registry)
    }

    #[test]
    fn definitions_are_sorted_and_require_user_id() {
        let (_dir, registry) = registry();
        let names: Vec<_> = registry.definitions().into_iter().map(|tool| tool.name).collect();
        assert_eq!(names, vec![GET_BUDGET_INFO, GET_MANAGER_ID, GET_WALLET_ID]);
        assert_eq!(
            registry.definitions()[0].input_schema["required"],
            json!(["slack_user_id"])
        );
    }

    #[tokio::test]
    async fn wallet_lookup_returns_wallet_id() {
        let (_dir, registry) = registry();
        let tool = registry.get(GET_WALLET_ID).expect("tool");
        let output = tool.execute(json!({ "slack_user_id": "U1" })).await.expect("wallet");
        assert_eq!(output["wallet_id"], "wallet-u1");
    }

    #[tokio::test]
    async fn empty_wallet_is_reported_as_missing() {
        let (_dir, registry) = registry();
        let tool = registry.get(GET_WALLET_ID).expect("tool");
        let error = tool.execute(json!({ "slack_user_id": "U2" })).await.expect_err("missing");
        assert!(matches!(error, ToolError::Lookup(DomainError::WalletNotFound { .. })));
    }

    #[tokio::test]
    async fn manager_lookup_distinguishes_top_of_hierarchy() {
        let (_dir, registry) = registry();
        let tool = registry.get(GET_MANAGER_ID).expect("tool");

        let managed = tool.execute(json!({ "slack_user_id": "U1" })).await.expect("managed");
        assert_eq!(managed["manager_id"], "UMGR");
        assert_eq!(managed["has_manager"], true);

        let top = tool.execute(json!({ "slack_user_id": "UMGR" })).await.expect("top");
        assert!(top["manager_id"].is_null());
        assert_eq!(top["has_manager"], false);
    }

    #[tokio::test]
    async fn budget_lookup_includes_remaining() {
        let (_dir, registry) = registry();
        let tool = registry.get(GET_BUDGET_INFO).expect("tool");
        let output = tool.execute(json!({ "slack_user_id": "U1" })).await.expect("budget");
        assert_eq!(output["total_budget"], "500");
        assert_eq!(output["dollars_spent"], "120.5");
        assert_eq!(output["remaining"], "379.5");
    }

    #[tokio::test]
    async fn missing_user_id_is_invalid_input() {
        let (_dir, registry) = registry();
        let tool = registry.get(GET_BUDGET_INFO).expect("tool");
        let error = tool.execute(json!({})).await.expect_err("invalid");
        assert!(matches!(error, ToolError::InvalidInput(_)));
    }
}
