use std::io::Write;
use std::sync::Arc;

use futures::StreamExt;
use tracing::debug;

use crate::domain::metadata::{EXTERNAL_ID_KEY, metadata};
use crate::domain::{
    Clock, Command, CommandStream, DeadLetterQueue, Error, LedgerStore,
};
use crate::engine::Wallet;
use crate::reconcile::{WebhookHandler, WebhookPayload};

/// Replays a journal of wallet commands and delivery notifications.
pub struct Processor<I, D, S, C>
where
    I: CommandStream,
    D: DeadLetterQueue,
    S: LedgerStore,
    C: Clock,
{
    ingestion: I,
    dlq: D,
    wallet: Arc<Wallet<S, C>>,
    webhook: WebhookHandler<S, C>,
}

impl<I, D, S, C> Processor<I, D, S, C>
where
    I: CommandStream,
    D: DeadLetterQueue,
    S: LedgerStore,
    C: Clock,
{
    pub fn new(ingestion: I, wallet: Arc<Wallet<S, C>>, dlq: D) -> Self {
        Self {
            ingestion,
            dlq,
            webhook: WebhookHandler::new(wallet.clone()),
            wallet,
        }
    }

    pub async fn process(&mut self) -> Result<(), Error> {
        let mut res = self.ingestion.stream();

        while let Some(cmd) = res.next().await {
            match cmd {
                Ok(cmd) => {
                    debug!(command = %cmd, "applying journal row");
                    if let Err(e) = self.apply(cmd) {
                        self.dlq.report(&e);
                    }
                }
                Err(e) => self.dlq.report(&e),
            }
        }

        Ok(())
    }

    fn apply(&self, cmd: Command) -> Result<(), Error> {
        match cmd {
            Command::TopUp {
                account,
                amount,
                description,
            } => {
                self.wallet.add_funds(
                    &account,
                    amount,
                    &description,
                    metadata([("source", "journal")]),
                )?;
            }
            Command::Reserve {
                account,
                external_id,
                amount,
                transaction_type,
            } => {
                self.wallet.reserve_funds(
                    &account,
                    amount,
                    &transaction_type,
                    metadata([(EXTERNAL_ID_KEY, external_id)]),
                )?;
            }
            Command::Delivery { external_id, state } => {
                self.webhook.handle(&WebhookPayload {
                    transaction_id: external_id,
                    state,
                    error: None,
                })?;
            }
        }
        Ok(())
    }

    /// Writes every account's balance as CSV.
    pub fn flush<W: Write>(&self, out: W) -> Result<(), Error> {
        let mut writer = csv::Writer::from_writer(out);
        writer
            .write_record(["account", "available", "reserved", "total"])
            .map_err(std::io::Error::from)?;
        for (email, balance) in self.wallet.balances()? {
            writer
                .write_record([
                    email,
                    balance.available.to_string(),
                    balance.reserved.to_string(),
                    balance.total.to_string(),
                ])
                .map_err(std::io::Error::from)?;
        }
        writer.flush()?;
        Ok(())
    }
}
