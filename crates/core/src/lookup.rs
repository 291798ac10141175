//! Static lookup data keyed by Slack user id.
//!
//! The store holds three JSON maps in a single directory:
//! `wallet.json`, `hierarchy.json` and `budget.json`. Files are read on every
//! lookup, so edits take effect without restarting the relay.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const WALLET_FILE: &str = "wallet.json";
pub const HIERARCHY_FILE: &str = "hierarchy.json";
pub const BUDGET_FILE: &str = "budget.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetInfo {
    pub total_budget: Decimal,
    pub dollars_spent: Decimal,
}

impl BudgetInfo {
    /// Budget left to spend. Negative when the user is over budget.
    pub fn remaining(&self) -> Decimal {
        self.total_budget - self.dollars_spent
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupFileCheck {
    pub file: &'static str,
    pub path: PathBuf,
    pub result: Result<(), DomainError>,
}

#[derive(Clone, Debug)]
pub struct LookupStore {
    data_dir: PathBuf,
}

impl LookupStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn wallet_id(&self, user_id: &str) -> Result<String, DomainError> {
        let wallets: HashMap<String, String> = self.read_map(WALLET_FILE, "wallet")?;
        wallets
            .get(user_id)
            .filter(|wallet| !wallet.is_empty())
            .cloned()
            .ok_or_else(|| DomainError::WalletNotFound { user_id: user_id.to_string() })
    }

    /// Returns `None` when the user is registered without a manager.
    pub fn manager_id(&self, user_id: &str) -> Result<Option<String>, DomainError> {
        let hierarchy: HashMap<String, String> = self.read_map(HIERARCHY_FILE, "hierarchy")?;
        match hierarchy.get(user_id) {
            Some(manager) if manager.is_empty() => Ok(None),
            Some(manager) => Ok(Some(manager.clone())),
            None => Err(DomainError::HierarchyNotFound { user_id: user_id.to_string() }),
        }
    }

    pub fn budget(&self, user_id: &str) -> Result<BudgetInfo, DomainError> {
        let budgets: HashMap<String, BudgetInfo> = self.read_map(BUDGET_FILE, "budget")?;
        budgets
            .get(user_id)
            .cloned()
            .ok_or_else(|| DomainError::BudgetNotFound { user_id: user_id.to_string() })
    }

    pub fn check_files(&self) -> Vec<LookupFileCheck> {
        [
            (WALLET_FILE, self.read_map::<HashMap<String, String>>(WALLET_FILE, "wallet").map(drop)),
            (
                HIERARCHY_FILE,
                self.read_map::<HashMap<String, String>>(HIERARCHY_FILE, "hierarchy").map(drop),
            ),
            (
                BUDGET_FILE,
                self.read_map::<HashMap<String, BudgetInfo>>(BUDGET_FILE, "budget").map(drop),
            ),
        ]
        .into_iter()
        .map(|(file, result)| LookupFileCheck { file, path: self.data_dir.join(file), result })
        .collect()
    }

    fn read_map<T: DeserializeOwned>(
        &self,
        file: &'static str,
        kind: &'static str,
    ) -> Result<T, DomainError> {
        let path = self.data_dir.join(file);
        let raw = fs::read_to_string(&path).map_err(|error| match error.kind() {
            io::ErrorKind::NotFound => {
                DomainError::LookupFileMissing { file: file.to_string(), kind }
            }
            _ => DomainError::LookupFileInvalid { file: file.to_string(), reason: error.to_string() },
        })?;

        serde_json::from_str(&raw).map_err(|error| DomainError::LookupFileInvalid {
            file: file.to_string(),
            reason: error.to_string(),
        })
    }
}
