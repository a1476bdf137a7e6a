use crate::domain::Money;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error("Ingestion failed with: {0}")]
    Ingestion(String),

    #[error("Configuration failed with: {0}")]
    Config(String),

    #[error("Invalid amount {0}: must be greater than zero")]
    InvalidAmount(Money),

    #[error("Amount {0} would overflow the account balance")]
    BalanceOverflow(Money),

    #[error("External id {0} already belongs to a pending reservation")]
    DuplicateExternalId(String),

    #[error("Invalid account key: {0:?}")]
    InvalidAccount(String),

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Transaction {0} not found or already processed")]
    NotFoundOrProcessed(String),

    #[error("Persistence failed with: {0}")]
    Persistence(String),

    #[error("Profile bootstrap failed for {account}: {reason}")]
    ProfileBootstrap { account: String, reason: String },

    #[error("Status lookup failed for {external_id}: {reason}")]
    StatusLookup { external_id: String, reason: String },

    #[error("Webhook payload rejected: {0}")]
    Webhook(String),
}

impl Error {
    /// Stable machine-readable classification.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Error::NotFoundOrProcessed(_) => "NOT_FOUND_OR_PROCESSED",
            Error::Persistence(_) => "PERSISTENCE_FAILURE",
            Error::ProfileBootstrap { .. } => "PROFILE_BOOTSTRAP_FAILURE",
            Error::InvalidAmount(_)
            | Error::BalanceOverflow(_)
            | Error::DuplicateExternalId(_)
            | Error::InvalidAccount(_) => "INVALID_INPUT",
            Error::StatusLookup { .. } | Error::Webhook(_) => "RECONCILIATION_FAILURE",
            Error::IO(_) | Error::Ingestion(_) | Error::Config(_) => "HOST_FAILURE",
        }
    }

    /// Settlement replays land here; callers treat it as success.
    pub fn is_already_processed(&self) -> bool {
        matches!(self, Error::NotFoundOrProcessed(_))
    }
}
