use chrono::{DateTime, Utc};
use futures::Stream;

use crate::domain::{
    Account, AccountId, Command, Error, LedgerEntry, Reservation, ReservationId,
};

pub trait CommandStream {
    type CmdStream: Stream<Item = Result<Command, Error>> + Send + Unpin + 'static;
    fn stream(&mut self) -> Self::CmdStream;
}

pub trait DeadLetterQueue {
    fn report(&self, error: &Error);
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Row-level access to the accounts, reservations and ledger entries, valid
/// for the duration of one store transaction.
pub trait LedgerTables {
    fn account(&self, id: &AccountId) -> Option<&Account>;

    fn account_by_email(&self, email: &str) -> Option<&Account>;

    fn account_mut(&mut self, id: &AccountId) -> Option<&mut Account>;

    /// Fails if an account with the same email already exists.
    fn insert_account(&mut self, account: Account) -> Result<(), Error>;

    fn accounts(&self) -> Vec<&Account>;

    fn reservation(&self, id: &ReservationId) -> Option<&Reservation>;

    fn reservation_mut(&mut self, id: &ReservationId) -> Option<&mut Reservation>;

    fn insert_reservation(&mut self, reservation: Reservation) -> Result<(), Error>;

    fn pending_reservations(&self) -> Vec<&Reservation>;

    fn append_entry(&mut self, entry: LedgerEntry) -> Result<(), Error>;

    fn entries(&self, account_id: &AccountId) -> Vec<&LedgerEntry>;
}

/// Persistent home of the wallet tables.
///
/// `transaction` runs `op` with exclusive access and commits its writes only
/// when it returns `Ok`; an `Err` leaves the store untouched.
pub trait LedgerStore: Send + Sync {
    fn transaction<T, F>(&self, op: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn LedgerTables) -> Result<T, Error>;

    fn read<T, F>(&self, op: F) -> Result<T, Error>
    where
        F: FnOnce(&dyn LedgerTables) -> T;
}
