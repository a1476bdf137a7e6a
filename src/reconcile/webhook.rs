use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::{Clock, Error, LedgerStore};
use crate::engine::Wallet;
use crate::reconcile::{Settlement, cancel, complete};

/// Delivery notification pushed by the document-exchange network.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebhookPayload {
    #[serde(alias = "id")]
    pub transaction_id: String,
    #[serde(alias = "status")]
    pub state: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Settled(Settlement),
    /// No pending reservation carries this id: unknown, or settled already.
    Unmatched,
    /// The document is still in flight.
    Ignored { state: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Delivered,
    Failed,
    InFlight,
}

fn classify(state: &str) -> Signal {
    match state.trim().to_ascii_uppercase().as_str() {
        "SENT" | "DELIVERED" | "SUCCESS" | "COMPLETED" => Signal::Delivered,
        "ERROR" | "FAILED" | "REJECTED" => Signal::Failed,
        _ => Signal::InFlight,
    }
}

pub struct WebhookHandler<S, C>
where
    S: LedgerStore,
    C: Clock,
{
    wallet: Arc<Wallet<S, C>>,
}

impl<S, C> WebhookHandler<S, C>
where
    S: LedgerStore,
    C: Clock,
{
    pub fn new(wallet: Arc<Wallet<S, C>>) -> Self {
        Self { wallet }
    }

    pub fn handle_json(&self, body: &[u8]) -> Result<WebhookOutcome, Error> {
        let payload: WebhookPayload =
            serde_json::from_slice(body).map_err(|e| Error::Webhook(e.to_string()))?;
        self.handle(&payload)
    }

    pub fn handle(&self, payload: &WebhookPayload) -> Result<WebhookOutcome, Error> {
        let external_id = payload.transaction_id.trim();
        if external_id.is_empty() {
            return Err(Error::Webhook("missing transaction id".into()));
        }

        let signal = classify(&payload.state);
        if signal == Signal::InFlight {
            info!(external_id, state = %payload.state, "webhook for in-flight document ignored");
            return Ok(WebhookOutcome::Ignored {
                state: payload.state.clone(),
            });
        }

        let Some(reservation) = self.wallet.find_pending_by_external_id(external_id)? else {
            warn!(external_id, state = %payload.state, "webhook matched no pending reservation");
            return Ok(WebhookOutcome::Unmatched);
        };

        let settlement = match signal {
            Signal::Delivered => complete(&self.wallet, reservation.id, external_id)?,
            _ => {
                let reason = payload
                    .error
                    .as_deref()
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or(payload.state.as_str());
                cancel(&self.wallet, reservation.id, reason)?
            }
        };
        info!(external_id, reservation = %reservation.id, state = %payload.state, "webhook settled reservation");
        Ok(WebhookOutcome::Settled(settlement))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::SystemClock;
    use crate::domain::metadata::{EXTERNAL_ID_KEY, FAILURE_REASON_KEY, metadata};
    use crate::domain::{Metadata, Money, ReservationId};
    use crate::store::InMemoryStore;

    const ACCT: &str = "sender@example.com";

    fn setup() -> (WebhookHandler<InMemoryStore, SystemClock>, Arc<Wallet<InMemoryStore, SystemClock>>, ReservationId) {
        let wallet = Arc::new(Wallet::new(InMemoryStore::new(), SystemClock));
        wallet
            .add_funds(ACCT, "1.00".parse().unwrap(), "seed", Metadata::new())
            .unwrap();
        let id = wallet
            .reserve_funds(
                ACCT,
                "0.10".parse().unwrap(),
                "send_document",
                metadata([(EXTERNAL_ID_KEY, "ext-1")]),
            )
            .unwrap();
        (WebhookHandler::new(wallet.clone()), wallet, id)
    }

    #[test]
    fn delivered_payload_completes_reservation() {
        let (handler, wallet, id) = setup();
        let outcome = handler
            .handle_json(br#"{"transaction_id":"ext-1","state":"SENT"}"#)
            .unwrap();
        assert!(matches!(
            outcome,
            WebhookOutcome::Settled(Settlement::Completed(ref entry)) if entry.reference_id == Some(id)
        ));
        assert_eq!(
            wallet.get_balance(ACCT).unwrap().total,
            "0.90".parse::<Money>().unwrap()
        );

        // redelivery finds nothing pending
        let replay = handler
            .handle_json(br#"{"transaction_id":"ext-1","state":"SENT"}"#)
            .unwrap();
        assert_eq!(replay, WebhookOutcome::Unmatched);
        assert_eq!(wallet.get_transaction_history(ACCT, 0).unwrap().len(), 2);
    }

    #[test]
    fn failure_payload_cancels_with_reason() {
        let (handler, wallet, id) = setup();
        let outcome = handler
            .handle_json(br#"{"id":"ext-1","status":"error","error":"receiver unknown"}"#)
            .unwrap();
        let WebhookOutcome::Settled(Settlement::Cancelled(reservation)) = outcome else {
            panic!("expected cancellation, got {:?}", outcome);
        };
        assert_eq!(reservation.id, id);
        assert_eq!(
            reservation.metadata.get(FAILURE_REASON_KEY).and_then(|v| v.as_str()),
            Some("receiver unknown")
        );
        assert_eq!(
            wallet.get_balance(ACCT).unwrap().available,
            "1.00".parse::<Money>().unwrap()
        );
    }

    #[test]
    fn in_flight_and_unknown_ids_change_nothing() {
        let (handler, wallet, _) = setup();
        assert_eq!(
            handler
                .handle_json(br#"{"transaction_id":"ext-1","state":"SENDING"}"#)
                .unwrap(),
            WebhookOutcome::Ignored {
                state: "SENDING".into()
            }
        );
        assert_eq!(
            handler
                .handle_json(br#"{"transaction_id":"nope","state":"SENT"}"#)
                .unwrap(),
            WebhookOutcome::Unmatched
        );
        assert_eq!(
            wallet.get_balance(ACCT).unwrap().reserved,
            "0.10".parse::<Money>().unwrap()
        );
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let (handler, _, _) = setup();
        assert!(matches!(
            handler.handle_json(b"not json"),
            Err(Error::Webhook(_))
        ));
        assert!(matches!(
            handler.handle_json(br#"{"transaction_id":"  ","state":"SENT"}"#),
            Err(Error::Webhook(_))
        ));
    }
}
