use crate::domain::{DeadLetterQueue, Error};

/// Dead-letters journal rows to the log and moves on.
#[derive(Default, Debug)]
pub struct LogDLQ {}

impl DeadLetterQueue for LogDLQ {
    fn report(&self, error: &Error) {
        tracing::warn!(code = error.code(), %error, "DLQ report");
    }
}
