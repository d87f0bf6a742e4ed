//! The module contains the errors the engine can throw.
//!
//! The errors a caller is expected to handle are:
//!
//! - [`InvalidMode`] thrown when a spending mode string is not recognized.
//! - [`LimitExceeded`] thrown when a spend would overrun the external
//!   allowance of the current period.
//! - [`TransferFailed`] thrown when the transfer executor reports a failure.
//!   The ledger is left untouched.
//! - [`LedgerNotPersisted`] thrown when a transfer went through but the ledger
//!   could not be written to the database.
//!
//!  [`InvalidMode`]: EngineError::InvalidMode
//!  [`LimitExceeded`]: EngineError::LimitExceeded
//!  [`TransferFailed`]: EngineError::TransferFailed
//!  [`LedgerNotPersisted`]: EngineError::LedgerNotPersisted
use sea_orm::DbErr;
use thiserror::Error;

use crate::Usd;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid spending mode: \"{0}\"")]
    InvalidMode(String),
    #[error("Spending limit exceeded: requested {requested}, remaining {remaining}")]
    LimitExceeded { requested: Usd, remaining: Usd },
    #[error("Transfer failed: {0}")]
    TransferFailed(String),
    #[error("Transfer {tx_reference} sent but ledger not persisted: {reason}")]
    LedgerNotPersisted { tx_reference: String, reason: String },
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidMode(a), Self::InvalidMode(b)) => a == b,
            (
                Self::LimitExceeded {
                    requested: a,
                    remaining: b,
                },
                Self::LimitExceeded {
                    requested: c,
                    remaining: d,
                },
            ) => a == c && b == d,
            (Self::TransferFailed(a), Self::TransferFailed(b)) => a == b,
            (
                Self::LedgerNotPersisted {
                    tx_reference: a, ..
                },
                Self::LedgerNotPersisted {
                    tx_reference: b, ..
                },
            ) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidConfig(a), Self::InvalidConfig(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
