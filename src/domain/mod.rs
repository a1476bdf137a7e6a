pub mod account;
pub mod command;
pub mod error;
pub mod ledger_entry;
pub mod metadata;
pub mod money;
pub mod reservation;
pub mod traits;

pub use account::{Account, AccountId, Balance};
pub use command::Command;
pub use error::Error;
pub use ledger_entry::{EntryKind, LedgerEntry};
pub use metadata::{Metadata, MetadataValue};
pub use money::Money;
pub use reservation::{Reservation, ReservationId, ReservationStatus, StaleReservation};
pub use traits::{Clock, CommandStream, DeadLetterQueue, LedgerStore, LedgerTables};
