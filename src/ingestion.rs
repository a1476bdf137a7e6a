use std::io::Read;
use std::pin::Pin;

use futures::stream::{self, Stream};
use serde::Deserialize;

use crate::domain::traits::CommandStream;
use crate::domain::{Command, Error, Money};

pub struct CsvReader<R: Read> {
    reader: Option<csv::Reader<R>>,
}

impl<R: Read> CsvReader<R> {
    pub fn new(reader: R) -> Self {
        let rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        Self { reader: Some(rdr) }
    }
}

/// Internal shape used only for CSV deserialization.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    amount: Option<Money>,
    #[serde(default)]
    note: Option<String>,
}

fn required(field: &str, kind: &str, value: Option<String>) -> Result<String, Error> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Ingestion(format!("{} row is missing {}", kind, field)))
}

impl TryFrom<CsvRow> for Command {
    type Error = Error;

    fn try_from(row: CsvRow) -> Result<Self, Self::Error> {
        let kind = row.kind.trim().to_ascii_lowercase();
        match kind.as_str() {
            "top_up" => Ok(Command::TopUp {
                account: required("account", &kind, row.account)?,
                amount: row
                    .amount
                    .ok_or_else(|| Error::Ingestion("top_up row is missing amount".into()))?,
                description: row
                    .note
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| "Top-up".to_string()),
            }),
            "reserve" => Ok(Command::Reserve {
                account: required("account", &kind, row.account)?,
                external_id: required("reference", &kind, row.reference)?,
                amount: row
                    .amount
                    .ok_or_else(|| Error::Ingestion("reserve row is missing amount".into()))?,
                transaction_type: row
                    .note
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| "send_document".to_string()),
            }),
            "delivery" => Ok(Command::Delivery {
                external_id: required("reference", &kind, row.reference)?,
                state: required("note", &kind, row.note)?,
            }),
            other => Err(Error::Ingestion(format!(
                "Invalid command type: {}",
                other
            ))),
        }
    }
}

impl<R: Read + Send + 'static> CommandStream for CsvReader<R> {
    type CmdStream = Pin<Box<dyn Stream<Item = Result<Command, Error>> + Send>>;

    fn stream(&mut self) -> Self::CmdStream {
        // Take ownership of the reader so the iterator we build owns all data and is 'static.
        let reader = match self.reader.take() {
            Some(r) => r,
            None => {
                // Already consumed; return an empty stream.
                return Box::pin(stream::iter(Vec::<Result<Command, Error>>::new()));
            }
        };

        let iter = reader
            .into_deserialize::<CsvRow>()
            .map(|row_res| match row_res {
                Ok(row) => Command::try_from(row),
                Err(e) => Err(Error::Ingestion(format!(
                    "CSV deserialization error: {}",
                    e
                ))),
            });

        Box::pin(stream::iter(iter))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    async fn collect(input: &'static str) -> Vec<Result<Command, Error>> {
        let mut reader = CsvReader::new(input.as_bytes());
        reader.stream().collect().await
    }

    #[tokio::test]
    async fn parses_each_command_kind() {
        let rows = collect(
            "type, account, reference, amount, note\n\
             top_up, a@example.com, , 10.00, Bank transfer\n\
             reserve, a@example.com, doc-1, 0.01,\n\
             delivery, , doc-1, , SENT\n",
        )
        .await;

        let rows: Vec<Command> = rows.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            rows,
            vec![
                Command::TopUp {
                    account: "a@example.com".into(),
                    amount: "10".parse().unwrap(),
                    description: "Bank transfer".into(),
                },
                Command::Reserve {
                    account: "a@example.com".into(),
                    external_id: "doc-1".into(),
                    amount: "0.01".parse().unwrap(),
                    transaction_type: "send_document".into(),
                },
                Command::Delivery {
                    external_id: "doc-1".into(),
                    state: "SENT".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn bad_rows_do_not_stop_the_stream() {
        let rows = collect(
            "type, account, reference, amount, note\n\
             withdraw, a@example.com, , 1.00,\n\
             reserve, a@example.com, , 1.00,\n\
             top_up, a@example.com, , abc,\n\
             top_up, a@example.com, , 1.00,\n",
        )
        .await;

        assert_eq!(rows.len(), 4);
        assert!(matches!(rows[0], Err(Error::Ingestion(_))));
        assert!(matches!(rows[1], Err(Error::Ingestion(_))));
        assert!(matches!(rows[2], Err(Error::Ingestion(_))));
        assert!(rows[3].is_ok());
    }
}
