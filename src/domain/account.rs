use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::Money;

pub type AccountId = Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub email: String,      // soft external key, normalized
    pub available: Money,   // spendable funds
    pub reserved: Money,    // funds held against in-flight documents
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(email: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            email,
            available: Money::ZERO,
            reserved: Money::ZERO,
            created_at,
        }
    }

    /// Credits are refused when the total would overflow, so this never saturates
    /// for rows written by the wallet.
    pub fn total(&self) -> Money {
        self.available.saturating_add(self.reserved)
    }

    pub fn balance(&self) -> Balance {
        Balance {
            available: self.available,
            reserved: self.reserved,
            total: self.total(),
        }
    }
}

/// Point-in-time view of an account's funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    pub available: Money,
    pub reserved: Money,
    pub total: Money,
}

/// Account keys are emails; compare them trimmed and lower-cased.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_ascii_lowercase();
    if email.is_empty() { None } else { Some(email) }
}
