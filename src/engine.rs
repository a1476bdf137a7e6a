use chrono::Duration;
use tracing::{debug, info, warn};

use crate::domain::account::normalize_email;
use crate::domain::metadata::{self, EXTERNAL_ID_KEY, FAILURE_REASON_KEY};
use crate::domain::{
    Account, Balance, Clock, Error, LedgerEntry, LedgerStore, LedgerTables, Metadata,
    MetadataValue, Money, Reservation, ReservationId, ReservationStatus, StaleReservation,
};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// The wallet ledger: moves funds between available and reserved, settles
/// reservations and keeps the transaction log.
///
/// Each operation runs as a single store transaction, so a check and the
/// writes that depend on it are never interleaved with another operation.
#[derive(Debug)]
pub struct Wallet<S, C>
where
    S: LedgerStore,
    C: Clock,
{
    store: S,
    clock: C,
    history_limit: usize,
}

impl<S, C> Wallet<S, C>
where
    S: LedgerStore,
    C: Clock,
{
    pub fn new(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Returns the account for `email`, creating an empty one if none exists.
    pub fn ensure_account(&self, email: &str) -> Result<Account, Error> {
        let email = normalize_email(email).ok_or_else(|| Error::InvalidAccount(email.into()))?;
        let now = self.clock.now();

        let (account, created) = self
            .store
            .transaction(|t| {
                if let Some(existing) = t.account_by_email(&email) {
                    return Ok((existing.clone(), false));
                }
                let account = Account::new(email.clone(), now);
                t.insert_account(account.clone())?;
                Ok((account, true))
            })
            .map_err(|e| match e {
                Error::Persistence(reason) => Error::ProfileBootstrap {
                    account: email.clone(),
                    reason,
                },
                other => other,
            })?;

        if created {
            info!(account = %account.email, id = %account.id, "wallet account created");
        }
        Ok(account)
    }

    pub fn get_balance(&self, email: &str) -> Result<Balance, Error> {
        let balance = self.ensure_account(email)?.balance();
        debug!(account = email, available = %balance.available, reserved = %balance.reserved, "balance read");
        Ok(balance)
    }

    /// Holds `amount` of the account's available funds against an operation
    /// whose outcome is not yet known.
    pub fn reserve_funds(
        &self,
        email: &str,
        amount: Money,
        transaction_type: &str,
        metadata: Metadata,
    ) -> Result<ReservationId, Error> {
        if !amount.is_positive() {
            return Err(Error::InvalidAmount(amount));
        }
        let account = self.ensure_account(email)?;
        let reservation = Reservation::new(
            account.id,
            amount,
            transaction_type.to_string(),
            metadata,
            self.clock.now(),
        );
        let id = reservation.id;

        let res = self.store.transaction(|t| {
            if let Some(external_id) = reservation.external_id() {
                ensure_unique_external_id(t, external_id, id)?;
            }
            let acct = account_mut(t, &account)?;
            if acct.available < amount {
                return Err(Error::InsufficientFunds);
            }
            acct.available = acct
                .available
                .checked_sub(amount)
                .ok_or(Error::BalanceOverflow(amount))?;
            acct.reserved = acct
                .reserved
                .checked_add(amount)
                .ok_or(Error::BalanceOverflow(amount))?;
            t.insert_reservation(reservation)?;
            Ok(())
        });

        match res {
            Ok(()) => {
                info!(account = %account.email, reservation = %id, %amount, transaction_type, "funds reserved");
                Ok(id)
            }
            Err(e) => {
                warn!(account = %account.email, %amount, error = %e, "reservation refused");
                Err(e)
            }
        }
    }

    /// Turns a pending reservation into a permanent debit.
    pub fn complete_pending_transaction(
        &self,
        id: ReservationId,
        external_reference: Option<&str>,
    ) -> Result<LedgerEntry, Error> {
        let now = self.clock.now();

        let entry = self.store.transaction(|t| {
            let reservation = pending_mut(t, &id)?;
            reservation.status = ReservationStatus::Completed;
            reservation.completed_at = Some(now);
            if let Some(reference) = external_reference {
                reservation.external_reference = Some(reference.to_string());
            }
            let settled = reservation.clone();

            let account = t.account_mut(&settled.account_id).ok_or_else(|| {
                Error::Persistence(format!("account {} missing", settled.account_id))
            })?;
            let before = account.total();
            account.reserved = account.reserved.saturating_sub(settled.amount);

            let entry = LedgerEntry::debit(
                settled.account_id,
                settled.amount,
                before,
                settled.transaction_type,
                id,
                settled.metadata,
                now,
            )?;
            t.append_entry(entry.clone())?;
            Ok(entry)
        })?;

        info!(reservation = %id, amount = %entry.amount, external_reference, "reservation completed");
        Ok(entry)
    }

    /// Releases a pending reservation back to available funds. Writes no ledger entry.
    pub fn cancel_pending_transaction(
        &self,
        id: ReservationId,
        reason: &str,
    ) -> Result<Reservation, Error> {
        let now = self.clock.now();

        let cancelled = self.store.transaction(|t| {
            let reservation = pending_mut(t, &id)?;
            reservation.status = ReservationStatus::Failed;
            reservation.completed_at = Some(now);
            reservation
                .metadata
                .insert(FAILURE_REASON_KEY.to_string(), reason.into());
            let cancelled = reservation.clone();

            let account = t.account_mut(&cancelled.account_id).ok_or_else(|| {
                Error::Persistence(format!("account {} missing", cancelled.account_id))
            })?;
            account.available = account
                .available
                .checked_add(cancelled.amount)
                .ok_or(Error::BalanceOverflow(cancelled.amount))?;
            account.reserved = account.reserved.saturating_sub(cancelled.amount);
            Ok(cancelled)
        })?;

        info!(reservation = %id, amount = %cancelled.amount, reason, "reservation cancelled");
        Ok(cancelled)
    }

    /// Credits the account directly, e.g. after a confirmed top-up.
    pub fn add_funds(
        &self,
        email: &str,
        amount: Money,
        description: &str,
        metadata: Metadata,
    ) -> Result<LedgerEntry, Error> {
        if !amount.is_positive() {
            return Err(Error::InvalidAmount(amount));
        }
        let account = self.ensure_account(email)?;
        let now = self.clock.now();

        let entry = self.store.transaction(|t| {
            let acct = account_mut(t, &account)?;
            let entry = LedgerEntry::credit(
                account.id,
                amount,
                acct.total(),
                description.to_string(),
                metadata,
                now,
            )?;
            acct.available = acct
                .available
                .checked_add(amount)
                .ok_or(Error::BalanceOverflow(amount))?;
            t.append_entry(entry.clone())?;
            Ok(entry)
        })?;

        info!(account = %account.email, %amount, balance = %entry.balance_after, "funds added");
        Ok(entry)
    }

    /// Shallow-merges `patch` into a reservation's metadata while it is pending.
    pub fn update_pending_transaction_metadata(
        &self,
        id: ReservationId,
        patch: Metadata,
    ) -> Result<Reservation, Error> {
        let updated = self.store.transaction(|t| {
            pending_mut(t, &id)?;
            if let Some(external_id) = patch.get(EXTERNAL_ID_KEY).and_then(MetadataValue::as_str) {
                ensure_unique_external_id(t, external_id, id)?;
            }
            let reservation = pending_mut(t, &id)?;
            metadata::merge(&mut reservation.metadata, patch);
            Ok(reservation.clone())
        })?;
        debug!(reservation = %id, "reservation metadata updated");
        Ok(updated)
    }

    /// Ledger entries for the account, newest first. A `limit` of zero uses
    /// the configured default.
    pub fn get_transaction_history(
        &self,
        email: &str,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, Error> {
        let email = normalize_email(email).ok_or_else(|| Error::InvalidAccount(email.into()))?;
        let limit = if limit == 0 { self.history_limit } else { limit };

        self.store.read(|t| match t.account_by_email(&email) {
            Some(account) => t
                .entries(&account.id)
                .into_iter()
                .rev()
                .take(limit)
                .cloned()
                .collect(),
            None => Vec::new(),
        })
    }

    /// The account's pending reservations, oldest first.
    pub fn get_pending_transactions(&self, email: &str) -> Result<Vec<Reservation>, Error> {
        let email = normalize_email(email).ok_or_else(|| Error::InvalidAccount(email.into()))?;

        self.store.read(|t| {
            let Some(account) = t.account_by_email(&email) else {
                return Vec::new();
            };
            let mut pending: Vec<Reservation> = t
                .pending_reservations()
                .into_iter()
                .filter(|r| r.account_id == account.id)
                .cloned()
                .collect();
            pending.sort_by_key(|r| (r.created_at, r.id));
            pending
        })
    }

    /// Pending reservations created more than `age_minutes` ago.
    ///
    /// With an email the search is limited to that account; without one it
    /// covers every account. Without an age every pending reservation in
    /// scope is returned.
    pub fn find_stale_pending_transactions(
        &self,
        email: Option<&str>,
        age_minutes: Option<u32>,
    ) -> Result<Vec<StaleReservation>, Error> {
        let email = match email {
            Some(raw) => {
                Some(normalize_email(raw).ok_or_else(|| Error::InvalidAccount(raw.into()))?)
            }
            None => None,
        };
        let cutoff = age_minutes.map(|m| self.clock.now() - Duration::minutes(i64::from(m)));

        let stale = self.store.read(|t| {
            let owner = match &email {
                Some(email) => match t.account_by_email(email) {
                    Some(account) => Some(account.id),
                    None => return Vec::new(),
                },
                None => None,
            };

            let mut stale: Vec<StaleReservation> = t
                .pending_reservations()
                .into_iter()
                .filter(|r| owner.is_none_or(|id| r.account_id == id))
                .filter(|r| cutoff.is_none_or(|cutoff| r.created_at < cutoff))
                .filter_map(|r| {
                    let owner = t.account(&r.account_id)?;
                    Some(StaleReservation {
                        reservation: r.clone(),
                        email: owner.email.clone(),
                    })
                })
                .collect();
            stale.sort_by_key(|s| (s.reservation.created_at, s.reservation.id));
            stale
        })?;

        debug!(count = stale.len(), ?age_minutes, "stale reservations found");
        Ok(stale)
    }

    /// The pending reservation whose metadata carries `external_id`. Ties,
    /// which only rows written around the wallet can produce, go to the oldest.
    pub fn find_pending_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Reservation>, Error> {
        self.store.read(|t| {
            t.pending_reservations()
                .into_iter()
                .filter(|r| r.external_id() == Some(external_id))
                .min_by_key(|r| (r.created_at, r.id))
                .cloned()
        })
    }

    pub fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, Error> {
        self.store.read(|t| t.reservation(&id).cloned())
    }

    /// Every account's balance, sorted by email.
    pub fn balances(&self) -> Result<Vec<(String, Balance)>, Error> {
        self.store.read(|t| {
            let mut balances: Vec<(String, Balance)> = t
                .accounts()
                .into_iter()
                .map(|a| (a.email.clone(), a.balance()))
                .collect();
            balances.sort_by(|a, b| a.0.cmp(&b.0));
            balances
        })
    }
}

fn account_mut<'t>(
    t: &'t mut (dyn LedgerTables + '_),
    account: &Account,
) -> Result<&'t mut Account, Error> {
    t.account_mut(&account.id)
        .ok_or_else(|| Error::Persistence(format!("account {} missing", account.email)))
}

/// External ids are unique among pending reservations.
fn ensure_unique_external_id(
    t: &dyn LedgerTables,
    external_id: &str,
    owner: ReservationId,
) -> Result<(), Error> {
    let taken = t
        .pending_reservations()
        .into_iter()
        .any(|r| r.id != owner && r.external_id() == Some(external_id));
    if taken {
        return Err(Error::DuplicateExternalId(external_id.to_string()));
    }
    Ok(())
}

fn pending_mut<'t>(
    t: &'t mut (dyn LedgerTables + '_),
    id: &ReservationId,
) -> Result<&'t mut Reservation, Error> {
    t.reservation_mut(id)
        .filter(|r| r.is_pending())
        .ok_or_else(|| Error::NotFoundOrProcessed(id.to_string()))
}
