//! The boundary towards whatever actually moves funds.

use async_trait::async_trait;
use thiserror::Error;

use crate::Usd;

/// Proof that a transfer went through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferReceipt {
    /// Transaction hash or any other reference the executor hands back.
    pub tx_reference: String,
    pub explorer_url: Option<String>,
}

impl TransferReceipt {
    #[must_use]
    pub fn new(tx_reference: impl Into<String>) -> Self {
        Self {
            tx_reference: tx_reference.into(),
            explorer_url: None,
        }
    }

    #[must_use]
    pub fn explorer_url(mut self, url: impl Into<String>) -> Self {
        self.explorer_url = Some(url.into());
        self
    }
}

/// Any of these means the transfer did not happen. Partially submitted
/// transactions are not reconciled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("transfer rejected: {0}")]
    Rejected(String),
    #[error("executor unavailable: {0}")]
    Unavailable(String),
}

/// Performs the transfer of an approved amount.
#[async_trait]
pub trait TransferExecutor: Send + Sync {
    async fn transfer(&self, amount: Usd, destination: &str)
    -> Result<TransferReceipt, TransferError>;
}
