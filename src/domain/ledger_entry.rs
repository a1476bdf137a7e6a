use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::metadata::Metadata;
use crate::domain::{AccountId, Error, Money, ReservationId};

pub const TOP_UP: &str = "top_up";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Credit,
    Debit,
}

/// Immutable record of a settled movement of funds.
///
/// `balance_before` and `balance_after` are total balances (available plus
/// reserved) of the account around the movement.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: AccountId,
    pub transaction_type: String,
    pub kind: EntryKind,
    pub amount: Money, // signed: credits positive, debits negative
    pub description: String,
    pub balance_before: Money,
    pub balance_after: Money,
    pub reference_id: Option<ReservationId>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn credit(
        account_id: AccountId,
        amount: Money,
        balance_before: Money,
        description: String,
        metadata: Metadata,
        created_at: DateTime<Utc>,
    ) -> Result<Self, Error> {
        let balance_after = balance_before
            .checked_add(amount)
            .ok_or(Error::BalanceOverflow(amount))?;
        Ok(Self {
            id: Uuid::now_v7(),
            account_id,
            transaction_type: TOP_UP.to_string(),
            kind: EntryKind::Credit,
            amount,
            description,
            balance_before,
            balance_after,
            reference_id: None,
            metadata,
            created_at,
        })
    }

    pub fn debit(
        account_id: AccountId,
        amount: Money,
        balance_before: Money,
        transaction_type: String,
        reference_id: ReservationId,
        metadata: Metadata,
        created_at: DateTime<Utc>,
    ) -> Result<Self, Error> {
        let balance_after = balance_before
            .checked_sub(amount)
            .ok_or(Error::BalanceOverflow(amount))?;
        let description = format!("Charge for {}", transaction_type.replace('_', " "));
        Ok(Self {
            id: Uuid::now_v7(),
            account_id,
            transaction_type,
            kind: EntryKind::Debit,
            amount: -amount,
            description,
            balance_before,
            balance_after,
            reference_id: Some(reference_id),
            metadata,
            created_at,
        })
    }
}

impl core::fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:?},type={},amount={},before={},after={}",
            self.kind, self.transaction_type, self.amount, self.balance_before, self.balance_after
        )
    }
}
