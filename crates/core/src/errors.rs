use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("{file} file not found. Please ensure the {kind} mapping file exists.")]
    LookupFileMissing { file: String, kind: &'static str },
    #[error("{file} could not be parsed: {reason}")]
    LookupFileInvalid { file: String, reason: String },
    #[error(
        "No wallet ID found for Slack user {user_id}. User may not be registered in the wallet system."
    )]
    WalletNotFound { user_id: String },
    #[error(
        "No hierarchy information found for Slack user {user_id}. User may not be registered in the hierarchy system."
    )]
    HierarchyNotFound { user_id: String },
    #[error(
        "No budget information found for Slack user {user_id}. User may not be registered in the budget system."
    )]
    BudgetNotFound { user_id: String },
    #[error("receipt could not be read: {0}")]
    UnreadableReceipt(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The payment request could not be processed. Check the details and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The payment service is temporarily unavailable. Please try again shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(
                DomainError::LookupFileMissing { .. } | DomainError::LookupFileInvalid { .. },
            ) => Self::ServiceUnavailable {
                message: "lookup data unavailable".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
