use std::future::Future;
use std::str::FromStr;

use crate::domain::Error;

/// Delivery state of a document as reported by the document-exchange network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Queued,
    Sending,
    Sent,
    Error,
    Deferred,
}

impl FromStr for DocumentState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Ok(DocumentState::Queued),
            "SENDING" => Ok(DocumentState::Sending),
            "SENT" => Ok(DocumentState::Sent),
            "ERROR" => Ok(DocumentState::Error),
            "DEFERRED" => Ok(DocumentState::Deferred),
            other => Err(Error::StatusLookup {
                external_id: String::new(),
                reason: format!("unknown document state {:?}", other),
            }),
        }
    }
}

impl DocumentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentState::Sent | DocumentState::Error)
    }
}

/// Read access to the remote document-exchange API.
pub trait DocumentStatusSource: Send + Sync {
    fn document_state(
        &self,
        external_id: &str,
    ) -> impl Future<Output = Result<DocumentState, Error>> + Send;
}
