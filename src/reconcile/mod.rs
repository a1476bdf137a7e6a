//! Drivers that observe a document's delivery outcome and settle the
//! reservation that paid for it.
//!
//! - [`WebhookHandler`]: push notifications from the document-exchange network
//! - [`Poller`]: progressive polling right after a document is sent
//! - [`StaleSweep`]: periodic backstop for reservations nobody settled
//!
//! Webhook and poller may both see the same outcome. The wallet settles a
//! reservation at most once, and the loser of the race gets
//! [`Settlement::AlreadySettled`].

pub mod poller;
pub mod status;
pub mod sweep;
pub mod webhook;

pub use poller::{PollOutcome, PollStage, Poller};
pub use status::{DocumentState, DocumentStatusSource};
pub use sweep::{StaleSweep, SweepReport};
pub use webhook::{WebhookHandler, WebhookOutcome, WebhookPayload};

use tracing::debug;

use crate::domain::{Clock, Error, LedgerEntry, LedgerStore, Reservation, ReservationId};
use crate::engine::Wallet;

pub const TIMEOUT_REASON: &str = "timeout";

#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Completed(LedgerEntry),
    Cancelled(Reservation),
    AlreadySettled,
}

fn complete<S, C>(
    wallet: &Wallet<S, C>,
    id: ReservationId,
    external_id: &str,
) -> Result<Settlement, Error>
where
    S: LedgerStore,
    C: Clock,
{
    match wallet.complete_pending_transaction(id, Some(external_id)) {
        Ok(entry) => Ok(Settlement::Completed(entry)),
        Err(e) if e.is_already_processed() => {
            debug!(reservation = %id, external_id, "completion replayed");
            Ok(Settlement::AlreadySettled)
        }
        Err(e) => Err(e),
    }
}

fn cancel<S, C>(wallet: &Wallet<S, C>, id: ReservationId, reason: &str) -> Result<Settlement, Error>
where
    S: LedgerStore,
    C: Clock,
{
    match wallet.cancel_pending_transaction(id, reason) {
        Ok(reservation) => Ok(Settlement::Cancelled(reservation)),
        Err(e) if e.is_already_processed() => {
            debug!(reservation = %id, reason, "cancellation replayed");
            Ok(Settlement::AlreadySettled)
        }
        Err(e) => Err(e),
    }
}
