use shared::domain::NameError;
use thiserror::Error;

use crate::store::EntryKey;

/// Failure kinds surfaced by the gateway and the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Input rejected locally or by the server.
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("server responded with status {status}{}", fmt_message(.message))]
    Server { status: u16, message: Option<String> },
    /// Remote 404, or a local store lookup that found nothing (desync).
    #[error("not found: {0}")]
    NotFound(String),
    /// Local store already holds an entry under the key (desync).
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid response body: {0}")]
    InvalidResponse(String),
}

fn fmt_message(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(": {message}"),
        None => String::new(),
    }
}

impl SyncError {
    pub fn server(status: u16) -> Self {
        Self::Server {
            status,
            message: None,
        }
    }

    /// Store and server disagree about which items exist.
    pub fn is_desync(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Conflict(_))
    }
}

impl From<NameError> for SyncError {
    fn from(value: NameError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(_) => Self::NotFound(value.to_string()),
            StoreError::Conflict(_) => Self::Conflict(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no entry for {0}")]
    NotFound(EntryKey),
    #[error("entry {0} already present")]
    Conflict(EntryKey),
}
