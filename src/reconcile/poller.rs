use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::PollingConfig;
use crate::domain::{Clock, Error, LedgerStore, ReservationId};
use crate::engine::Wallet;
use crate::reconcile::{DocumentState, DocumentStatusSource, Settlement, cancel, complete};

pub const DELIVERY_FAILED_REASON: &str = "document delivery failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStage {
    Initial,
    Secondary,
    Tertiary,
    Hourly,
}

impl PollStage {
    pub fn next(self) -> Self {
        match self {
            PollStage::Initial => PollStage::Secondary,
            PollStage::Secondary => PollStage::Tertiary,
            PollStage::Tertiary | PollStage::Hourly => PollStage::Hourly,
        }
    }

    /// Wait before polling at this stage.
    pub fn delay(self, config: &PollingConfig) -> Duration {
        let secs = match self {
            PollStage::Initial => config.initial_delay_secs,
            PollStage::Secondary => config.secondary_delay_secs,
            PollStage::Tertiary => config.tertiary_delay_secs,
            PollStage::Hourly => config.hourly_delay_secs,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Settled(Settlement),
    /// The network deferred delivery; poll again on the slow cadence.
    ContinuePolling { next: PollStage },
    StillPending { next: PollStage },
    /// The polling window ran out; the stale sweep takes over.
    Expired,
}

pub struct Poller<S, C, D>
where
    S: LedgerStore,
    C: Clock,
    D: DocumentStatusSource,
{
    wallet: Arc<Wallet<S, C>>,
    source: Arc<D>,
    config: PollingConfig,
}

impl<S, C, D> Poller<S, C, D>
where
    S: LedgerStore,
    C: Clock,
    D: DocumentStatusSource,
{
    pub fn new(wallet: Arc<Wallet<S, C>>, source: Arc<D>, config: PollingConfig) -> Self {
        Self {
            wallet,
            source,
            config,
        }
    }

    /// Checks the document once and settles the reservation if the outcome is final.
    pub async fn poll_once(
        &self,
        id: ReservationId,
        external_id: &str,
        stage: PollStage,
    ) -> Result<PollOutcome, Error> {
        let state = self.source.document_state(external_id).await?;
        debug!(reservation = %id, external_id, ?stage, ?state, "document polled");

        let outcome = match state {
            DocumentState::Sent => PollOutcome::Settled(complete(&self.wallet, id, external_id)?),
            DocumentState::Error => {
                PollOutcome::Settled(cancel(&self.wallet, id, DELIVERY_FAILED_REASON)?)
            }
            DocumentState::Deferred => PollOutcome::ContinuePolling {
                next: PollStage::Hourly,
            },
            DocumentState::Queued | DocumentState::Sending => PollOutcome::StillPending {
                next: stage.next(),
            },
        };
        Ok(outcome)
    }

    /// Polls on the progressive schedule until the document settles or the
    /// window closes. Lookup failures are retried at the next stage.
    pub async fn poll_until_settled(&self, id: ReservationId, external_id: &str) -> PollOutcome {
        let started = Instant::now();
        let window = self.config.max_window();
        let mut stage = PollStage::Initial;

        loop {
            let delay = stage.delay(&self.config);
            if started.elapsed().saturating_add(delay) > window {
                warn!(reservation = %id, external_id, "polling window exhausted");
                return PollOutcome::Expired;
            }
            sleep(delay).await;

            match self.poll_once(id, external_id, stage).await {
                Ok(PollOutcome::ContinuePolling { next }) | Ok(PollOutcome::StillPending { next }) => {
                    stage = next;
                }
                Ok(outcome) => {
                    info!(reservation = %id, external_id, "polling finished");
                    return outcome;
                }
                Err(e) => {
                    warn!(reservation = %id, external_id, error = %e, "document poll failed");
                    stage = stage.next();
                }
            }
        }
    }
}
