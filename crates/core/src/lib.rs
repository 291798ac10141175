pub mod config;
pub mod errors;
pub mod lookup;
pub mod prompts;
pub mod request;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use lookup::{BudgetInfo, LookupFileCheck, LookupStore};
pub use prompts::{PromptError, PromptRenderer};
pub use request::{PaymentRequest, RequestSource};
