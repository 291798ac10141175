use payrelay_core::config::{AppConfig, LoadOptions};
use payrelay_core::{DomainError, LookupStore};
use serde_json::{json, Value};

use super::CommandResult;

pub fn run(user_id: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("lookup", "config_validation", error.to_string(), 2),
    };
    execute(&LookupStore::new(config.lookup.data_dir), user_id)
}

/// Each lookup is reported on its own; one missing entry does not hide the others.
pub fn execute(store: &LookupStore, user_id: &str) -> CommandResult {
    let wallet = store.wallet_id(user_id).map(Value::String);
    let manager = store.manager_id(user_id).map(|manager| json!(manager));
    let budget = store.budget(user_id).map(|budget| {
        json!({
            "total_budget": budget.total_budget.to_string(),
            "dollars_spent": budget.dollars_spent.to_string(),
            "remaining": budget.remaining().to_string(),
        })
    });

    let found = [wallet.is_ok(), manager.is_ok(), budget.is_ok()].iter().filter(|ok| **ok).count();
    let entry = |result: Result<Value, DomainError>| match result {
        Ok(value) => json!({ "found": true, "value": value }),
        Err(error) => json!({ "found": false, "error": error.to_string() }),
    };
    let data = json!({
        "slack_user_id": user_id,
        "wallet_id": entry(wallet),
        "manager_id": entry(manager),
        "budget": entry(budget),
    });

    if found == 0 {
        return CommandResult::failure_with_data(
            "lookup",
            "not_found",
            format!("no lookup data for {user_id}"),
            1,
            Some(data),
        );
    }

    CommandResult::success_with_data(
        "lookup",
        format!("{found} of 3 lookups found for {user_id}"),
        Some(data),
    )
}
