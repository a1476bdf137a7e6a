//! Prepaid wallet ledger for a document-exchange mailbox.
//!
//! Sending a document costs money that is reserved up front and settled once
//! the network reports the delivery outcome:
//!
//! - [`engine::Wallet`] - reservations, settlement, top-ups and balance queries
//! - [`store`] - the in-memory [`domain::LedgerStore`] used by tests and the CLI
//! - [`reconcile`] - webhook, poller and stale-sweep drivers that settle reservations
//! - [`processor`] - replays a CSV journal of wallet commands through the engine
//!
//! # Invariants
//!
//! - `available` and `reserved` never go negative; `total = available + reserved`
//! - a reservation leaves `pending` at most once, by completion or cancellation
//! - completion writes exactly one debit entry; cancellation writes none

pub mod clock;
pub mod config;
pub mod dlq;
pub mod domain;
pub mod engine;
pub mod ingestion;
pub mod processor;
pub mod reconcile;
pub mod store;

pub use clock::{ManualClock, SystemClock};
pub use config::WalletConfig;
pub use domain::{Balance, Error, LedgerEntry, Metadata, MetadataValue, Money, Reservation};
pub use engine::Wallet;
pub use store::InMemoryStore;
