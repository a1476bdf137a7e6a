use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::metadata::{EXTERNAL_ID_KEY, Metadata};
use crate::domain::{AccountId, Money};

pub type ReservationId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStatus {
    Pending,
    Completed,
    Failed,
}

impl core::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A hold on funds awaiting an external outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub id: ReservationId,
    pub account_id: AccountId,
    pub amount: Money,
    pub status: ReservationStatus,
    pub transaction_type: String,
    pub metadata: Metadata,
    pub external_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn new(
        account_id: AccountId,
        amount: Money,
        transaction_type: String,
        metadata: Metadata,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            account_id,
            amount,
            status: ReservationStatus::Pending,
            transaction_type,
            metadata,
            external_reference: None,
            created_at,
            completed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReservationStatus::Pending
    }

    /// Downstream transaction id, once the send flow has attached it.
    pub fn external_id(&self) -> Option<&str> {
        self.metadata.get(EXTERNAL_ID_KEY).and_then(|v| v.as_str())
    }
}

/// A pending reservation paired with its owner's email, as returned by stale lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct StaleReservation {
    pub reservation: Reservation,
    pub email: String,
}
