use std::sync::Arc;

use chrono::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::SweepConfig;
use crate::domain::{Clock, Error, LedgerStore, StaleReservation};
use crate::engine::Wallet;
use crate::reconcile::poller::DELIVERY_FAILED_REASON;
use crate::reconcile::{
    DocumentState, DocumentStatusSource, Settlement, TIMEOUT_REASON, cancel, complete,
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub completed: usize,
    pub cancelled: usize,
    /// Cancellations made because the timeout passed; a subset of `cancelled`.
    pub timed_out: usize,
    pub already_settled: usize,
    pub still_pending: usize,
    pub errors: usize,
}

/// Periodic backstop that settles reservations whose webhook or poll never
/// arrived, and cancels those that stay unresolved past the timeout.
pub struct StaleSweep<S, C, D>
where
    S: LedgerStore,
    C: Clock,
    D: DocumentStatusSource,
{
    wallet: Arc<Wallet<S, C>>,
    source: Arc<D>,
    config: SweepConfig,
}

enum Action {
    Complete(String),
    Cancel(&'static str),
    TimeOut,
    Wait,
}

impl<S, C, D> StaleSweep<S, C, D>
where
    S: LedgerStore,
    C: Clock,
    D: DocumentStatusSource,
{
    pub fn new(wallet: Arc<Wallet<S, C>>, source: Arc<D>, config: SweepConfig) -> Self {
        Self {
            wallet,
            source,
            config,
        }
    }

    pub async fn sweep_once(&self) -> Result<SweepReport, Error> {
        let stale = self
            .wallet
            .find_stale_pending_transactions(None, Some(self.config.stale_after_minutes))?;
        let now = self.wallet.clock().now();
        let timeout = Duration::minutes(i64::from(self.config.timeout_after_minutes));

        let mut report = SweepReport::default();
        for StaleReservation { reservation, email } in stale {
            report.examined += 1;
            let expired = now - reservation.created_at >= timeout;

            let state = match reservation.external_id() {
                Some(external_id) => match self.source.document_state(external_id).await {
                    Ok(state) => Some(state),
                    Err(e) => {
                        warn!(reservation = %reservation.id, external_id, error = %e, "sweep status lookup failed");
                        report.errors += 1;
                        None
                    }
                },
                None => None,
            };

            let action = match (state, reservation.external_id()) {
                (Some(DocumentState::Sent), Some(external_id)) => {
                    Action::Complete(external_id.to_string())
                }
                (Some(DocumentState::Error), _) => Action::Cancel(DELIVERY_FAILED_REASON),
                _ if expired => Action::TimeOut,
                _ => Action::Wait,
            };

            let result = match action {
                Action::Complete(external_id) => complete(&self.wallet, reservation.id, &external_id),
                Action::Cancel(reason) => cancel(&self.wallet, reservation.id, reason),
                Action::TimeOut => {
                    warn!(reservation = %reservation.id, account = %email, "reservation timed out");
                    cancel(&self.wallet, reservation.id, TIMEOUT_REASON).inspect(|s| {
                        if matches!(s, Settlement::Cancelled(_)) {
                            report.timed_out += 1;
                        }
                    })
                }
                Action::Wait => {
                    report.still_pending += 1;
                    continue;
                }
            };

            match result {
                Ok(Settlement::Completed(_)) => report.completed += 1,
                Ok(Settlement::Cancelled(_)) => report.cancelled += 1,
                Ok(Settlement::AlreadySettled) => report.already_settled += 1,
                Err(e) => {
                    error!(reservation = %reservation.id, account = %email, error = %e, "sweep settlement failed");
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Sweeps on the configured interval until `shutdown` flips to `true` or
    /// its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.sweep_once().await {
                    Ok(report) => info!(?report, "stale sweep finished"),
                    Err(e) => error!(error = %e, "stale sweep failed"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("stale sweep stopped");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::metadata::{EXTERNAL_ID_KEY, metadata};
    use crate::domain::{Metadata, Money, ReservationId, ReservationStatus};
    use crate::reconcile::testing::ScriptedSource;
    use crate::store::InMemoryStore;

    const ACCT: &str = "sweep@example.com";

    type TestWallet = Wallet<InMemoryStore, Arc<ManualClock>>;

    struct Fixture {
        wallet: Arc<TestWallet>,
        clock: Arc<ManualClock>,
        source: Arc<ScriptedSource>,
        sweep: StaleSweep<InMemoryStore, Arc<ManualClock>, ScriptedSource>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let wallet = Arc::new(Wallet::new(InMemoryStore::new(), clock.clone()));
        wallet
            .add_funds(ACCT, "10".parse().unwrap(), "seed", Metadata::new())
            .unwrap();
        let source = Arc::new(ScriptedSource::default());
        let sweep = StaleSweep::new(wallet.clone(), source.clone(), SweepConfig::default());
        Fixture {
            wallet,
            clock,
            source,
            sweep,
        }
    }

    fn reserve(wallet: &TestWallet, external_id: Option<&str>) -> ReservationId {
        let meta = match external_id {
            Some(id) => metadata([(EXTERNAL_ID_KEY, id)]),
            None => Metadata::new(),
        };
        wallet
            .reserve_funds(ACCT, "1".parse().unwrap(), "send_document", meta)
            .unwrap()
    }

    fn status(wallet: &TestWallet, id: ReservationId) -> ReservationStatus {
        wallet.get_reservation(id).unwrap().unwrap().status
    }

    #[tokio::test]
    async fn settles_from_remote_state() {
        let f = fixture();
        let sent = reserve(&f.wallet, Some("sent"));
        let failed = reserve(&f.wallet, Some("failed"));
        let waiting = reserve(&f.wallet, Some("waiting"));
        f.source.script("sent", [DocumentState::Sent]);
        f.source.script("failed", [DocumentState::Error]);
        f.source.script("waiting", [DocumentState::Deferred]);
        f.clock.advance(Duration::minutes(15));

        let report = f.sweep.sweep_once().await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                examined: 3,
                completed: 1,
                cancelled: 1,
                still_pending: 1,
                ..SweepReport::default()
            }
        );
        assert_eq!(status(&f.wallet, sent), ReservationStatus::Completed);
        assert_eq!(status(&f.wallet, failed), ReservationStatus::Failed);
        assert_eq!(status(&f.wallet, waiting), ReservationStatus::Pending);
    }

    #[tokio::test]
    async fn young_reservations_are_left_alone() {
        let f = fixture();
        reserve(&f.wallet, Some("doc"));
        f.source.script("doc", [DocumentState::Sent]);
        f.clock.advance(Duration::minutes(2));

        let report = f.sweep.sweep_once().await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(f.source.calls(), 0);
    }

    #[tokio::test]
    async fn unresolved_reservations_time_out() {
        let f = fixture();
        let ambiguous = reserve(&f.wallet, Some("ambiguous"));
        let orphan = reserve(&f.wallet, None);
        let unknown = reserve(&f.wallet, Some("unknown"));
        f.source.script("ambiguous", [DocumentState::Sending]);
        f.clock.advance(Duration::hours(25));

        let report = f.sweep.sweep_once().await.unwrap();
        assert_eq!(report.examined, 3);
        assert_eq!(report.timed_out, 3);
        assert_eq!(report.cancelled, 3);
        // the unscripted document fails its lookup but still times out
        assert_eq!(report.errors, 1);

        for id in [ambiguous, orphan, unknown] {
            let reservation = f.wallet.get_reservation(id).unwrap().unwrap();
            assert_eq!(reservation.status, ReservationStatus::Failed);
            assert_eq!(
                reservation
                    .metadata
                    .get("failure_reason")
                    .and_then(|v| v.as_str()),
                Some(TIMEOUT_REASON)
            );
        }
        let balance = f.wallet.get_balance(ACCT).unwrap();
        assert_eq!(balance.available, "10".parse::<Money>().unwrap());
        assert_eq!(balance.reserved, Money::ZERO);
    }

    #[tokio::test]
    async fn orphans_wait_until_timeout() {
        let f = fixture();
        let orphan = reserve(&f.wallet, None);
        f.clock.advance(Duration::minutes(30));

        let report = f.sweep.sweep_once().await.unwrap();
        assert_eq!(report.still_pending, 1);
        assert_eq!(status(&f.wallet, orphan), ReservationStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let f = fixture();
        let id = reserve(&f.wallet, Some("doc"));
        f.source.script("doc", [DocumentState::Sent]);
        f.clock.advance(Duration::minutes(15));

        let sweep = Arc::new(f.sweep);
        let (tx, rx) = watch::channel(false);
        let task = {
            let sweep = sweep.clone();
            tokio::spawn(async move { sweep.run(rx).await })
        };

        // first tick fires immediately
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert_eq!(status(&f.wallet, id), ReservationStatus::Completed);

        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
