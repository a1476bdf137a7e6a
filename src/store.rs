use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{
    Account, AccountId, Error, LedgerEntry, LedgerStore, LedgerTables, Reservation,
    ReservationId,
};

/// Writes the in-memory store can be told to fail, for exercising rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    AccountInsert,
    ReservationInsert,
    EntryAppend,
}

#[derive(Default, Debug)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    emails: HashMap<String, AccountId>,
    reservations: HashMap<ReservationId, Reservation>,
    entries: Vec<LedgerEntry>,
    faults: HashSet<Fault>,
}

/// `HashMap`-backed ledger store. Transactions are serialized by a mutex and
/// stage their writes until the operation succeeds.
#[derive(Default, Debug)]
pub struct InMemoryStore {
    state: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_fault(&self, fault: Fault) {
        self.lock().faults.insert(fault);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    // A panicking operation never reaches `commit`, so the tables behind a
    // poisoned lock are still the last committed state.
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LedgerStore for InMemoryStore {
    fn transaction<T, F>(&self, op: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn LedgerTables) -> Result<T, Error>,
    {
        let mut guard = self.lock();
        let mut staged = Staged::new(&guard);
        let out = op(&mut staged)?;
        let (accounts, reservations, entries) = staged.into_parts();
        guard.commit(accounts, reservations, entries);
        Ok(out)
    }

    fn read<T, F>(&self, op: F) -> Result<T, Error>
    where
        F: FnOnce(&dyn LedgerTables) -> T,
    {
        let guard = self.lock();
        let view = Staged::new(&guard);
        Ok(op(&view))
    }
}

impl Tables {
    fn commit(
        &mut self,
        accounts: HashMap<AccountId, Account>,
        reservations: HashMap<ReservationId, Reservation>,
        entries: Vec<LedgerEntry>,
    ) {
        for (id, account) in accounts {
            self.emails.entry(account.email.clone()).or_insert(id);
            self.accounts.insert(id, account);
        }
        self.reservations.extend(reservations);
        self.entries.extend(entries);
    }
}

/// Copy-on-write view over the committed tables.
struct Staged<'a> {
    base: &'a Tables,
    accounts: HashMap<AccountId, Account>,
    reservations: HashMap<ReservationId, Reservation>,
    entries: Vec<LedgerEntry>,
}

impl<'a> Staged<'a> {
    fn new(base: &'a Tables) -> Self {
        Self {
            base,
            accounts: HashMap::new(),
            reservations: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn into_parts(
        self,
    ) -> (
        HashMap<AccountId, Account>,
        HashMap<ReservationId, Reservation>,
        Vec<LedgerEntry>,
    ) {
        (self.accounts, self.reservations, self.entries)
    }

    fn check(&self, fault: Fault) -> Result<(), Error> {
        if self.base.faults.contains(&fault) {
            return Err(Error::Persistence(format!("injected fault on {:?}", fault)));
        }
        Ok(())
    }
}

impl LedgerTables for Staged<'_> {
    fn account(&self, id: &AccountId) -> Option<&Account> {
        self.accounts.get(id).or_else(|| self.base.accounts.get(id))
    }

    fn account_by_email(&self, email: &str) -> Option<&Account> {
        if let Some(account) = self.accounts.values().find(|a| a.email == email) {
            return Some(account);
        }
        let id = self.base.emails.get(email)?;
        self.account(id)
    }

    fn account_mut(&mut self, id: &AccountId) -> Option<&mut Account> {
        if let Entry::Vacant(slot) = self.accounts.entry(*id) {
            slot.insert(self.base.accounts.get(id)?.clone());
        }
        self.accounts.get_mut(id)
    }

    fn insert_account(&mut self, account: Account) -> Result<(), Error> {
        self.check(Fault::AccountInsert)?;
        if self.account_by_email(&account.email).is_some() {
            return Err(Error::Persistence(format!(
                "account {} already exists",
                account.email
            )));
        }
        self.accounts.insert(account.id, account);
        Ok(())
    }

    fn accounts(&self) -> Vec<&Account> {
        self.base
            .accounts
            .values()
            .filter(|a| !self.accounts.contains_key(&a.id))
            .chain(self.accounts.values())
            .collect()
    }

    fn reservation(&self, id: &ReservationId) -> Option<&Reservation> {
        self.reservations
            .get(id)
            .or_else(|| self.base.reservations.get(id))
    }

    fn reservation_mut(&mut self, id: &ReservationId) -> Option<&mut Reservation> {
        if let Entry::Vacant(slot) = self.reservations.entry(*id) {
            slot.insert(self.base.reservations.get(id)?.clone());
        }
        self.reservations.get_mut(id)
    }

    fn insert_reservation(&mut self, reservation: Reservation) -> Result<(), Error> {
        self.check(Fault::ReservationInsert)?;
        if self.reservation(&reservation.id).is_some() {
            return Err(Error::Persistence(format!(
                "reservation {} already exists",
                reservation.id
            )));
        }
        self.reservations.insert(reservation.id, reservation);
        Ok(())
    }

    fn pending_reservations(&self) -> Vec<&Reservation> {
        self.base
            .reservations
            .values()
            .filter(|r| !self.reservations.contains_key(&r.id))
            .chain(self.reservations.values())
            .filter(|r| r.is_pending())
            .collect()
    }

    fn append_entry(&mut self, entry: LedgerEntry) -> Result<(), Error> {
        self.check(Fault::EntryAppend)?;
        self.entries.push(entry);
        Ok(())
    }

    fn entries(&self, account_id: &AccountId) -> Vec<&LedgerEntry> {
        self.base
            .entries
            .iter()
            .chain(self.entries.iter())
            .filter(|e| e.account_id == *account_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use chrono::Utc;

    use super::*;
    use crate::domain::Money;

    fn seed(store: &InMemoryStore, email: &str) -> AccountId {
        store
            .transaction(|t| {
                let account = Account::new(email.to_string(), Utc::now());
                let id = account.id;
                t.insert_account(account)?;
                Ok(id)
            })
            .unwrap()
    }

    #[test]
    fn failed_transaction_discards_staged_writes() {
        let store = InMemoryStore::new();
        let id = seed(&store, "a@example.com");

        let res: Result<(), Error> = store.transaction(|t| {
            let account = t.account_mut(&id).unwrap();
            account.available += "5".parse::<Money>().unwrap();
            Err(Error::Persistence("boom".into()))
        });
        assert!(res.is_err());

        let available = store.read(|t| t.account(&id).unwrap().available).unwrap();
        assert_eq!(available, Money::ZERO);
    }

    #[test]
    fn email_is_unique() {
        let store = InMemoryStore::new();
        seed(&store, "a@example.com");

        let res = store.transaction(|t| {
            t.insert_account(Account::new("a@example.com".into(), Utc::now()))
        });
        assert!(matches!(res, Err(Error::Persistence(_))));
        assert_eq!(store.read(|t| t.accounts().len()).unwrap(), 1);
    }

    #[test]
    fn staged_rows_are_visible_inside_the_transaction() {
        let store = InMemoryStore::new();
        store
            .transaction(|t| {
                t.insert_account(Account::new("b@example.com".into(), Utc::now()))?;
                assert!(t.account_by_email("b@example.com").is_some());
                assert_eq!(t.accounts().len(), 1);
                Ok(())
            })
            .unwrap();
        assert!(
            store
                .read(|t| t.account_by_email("b@example.com").is_some())
                .unwrap()
        );
    }

    #[test]
    fn injected_faults_fail_writes_until_cleared() {
        let store = InMemoryStore::new();
        store.inject_fault(Fault::AccountInsert);
        let res = store.transaction(|t| {
            t.insert_account(Account::new("c@example.com".into(), Utc::now()))
        });
        assert!(matches!(res, Err(Error::Persistence(_))));

        store.clear_faults();
        seed(&store, "c@example.com");
    }

    #[test]
    fn panicking_transaction_leaves_store_usable() {
        let store = InMemoryStore::new();
        let id = seed(&store, "d@example.com");

        let res = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), Error> = store.transaction(|t| {
                t.account_mut(&id).unwrap().available += "5".parse::<Money>().unwrap();
                panic!("operation aborted midway");
            });
        }));
        assert!(res.is_err());

        let available = store.read(|t| t.account(&id).unwrap().available).unwrap();
        assert_eq!(available, Money::ZERO);
        seed(&store, "e@example.com");
    }
}
