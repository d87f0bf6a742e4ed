use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, TimeDelta, Utc};
use engine::Usd;
use teloxide::types::UserId;
use tokio::sync::Mutex;
use uuid::Uuid;

/// How long a transfer confirmation button stays valid.
pub(crate) const CONFIRMATION_TTL: TimeDelta = TimeDelta::minutes(5);

/// A transfer waiting for the user to press "Confirm".
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PendingTransfer {
    pub user_id: UserId,
    pub amount: Usd,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub(crate) enum ConfirmError {
    #[error("this confirmation is no longer valid")]
    Unknown,
    #[error("this confirmation has expired, send /transfer again")]
    Expired,
    #[error("this confirmation belongs to someone else")]
    WrongUser,
}

/// Single-use confirmation nonces for `/transfer`.
#[derive(Clone, Default)]
pub(crate) struct PendingTransfers {
    inner: Arc<Mutex<HashMap<Uuid, PendingTransfer>>>,
}

impl PendingTransfers {
    pub(crate) async fn insert(&self, pending: PendingTransfer) -> Uuid {
        let nonce = Uuid::new_v4();
        let mut guard = self.inner.lock().await;
        guard.retain(|_, p| pending.created_at - p.created_at < CONFIRMATION_TTL);
        guard.insert(nonce, pending);
        nonce
    }

    /// Consume `nonce`. Once its owner presses it, the nonce is gone whatever
    /// the outcome, so a button can never be used twice.
    pub(crate) async fn take(
        &self,
        nonce: Uuid,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<PendingTransfer, ConfirmError> {
        let mut guard = self.inner.lock().await;
        match guard.get(&nonce) {
            None => return Err(ConfirmError::Unknown),
            Some(pending) if pending.user_id != user_id => return Err(ConfirmError::WrongUser),
            Some(_) => {}
        }

        let pending = guard.remove(&nonce).ok_or(ConfirmError::Unknown)?;
        if now - pending.created_at > CONFIRMATION_TTL {
            return Err(ConfirmError::Expired);
        }
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use super::*;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 10, minute, 0).unwrap()
    }

    fn pending(created_at: DateTime<Utc>) -> PendingTransfer {
        PendingTransfer {
            user_id: UserId(7),
            amount: Usd::new(dec!(12.5)),
            created_at,
        }
    }

    #[tokio::test]
    async fn confirmation_is_single_use() {
        let store = PendingTransfers::default();
        let nonce = store.insert(pending(at(0))).await;

        assert_eq!(
            store.take(nonce, UserId(7), at(1)).await.unwrap(),
            pending(at(0))
        );
        assert_eq!(
            store.take(nonce, UserId(7), at(1)).await.unwrap_err(),
            ConfirmError::Unknown
        );
    }

    #[tokio::test]
    async fn confirmation_expires() {
        let store = PendingTransfers::default();
        let nonce = store.insert(pending(at(0))).await;
        assert_eq!(
            store.take(nonce, UserId(7), at(6)).await.unwrap_err(),
            ConfirmError::Expired
        );
    }

    #[tokio::test]
    async fn other_users_cannot_confirm() {
        let store = PendingTransfers::default();
        let nonce = store.insert(pending(at(0))).await;
        assert_eq!(
            store.take(nonce, UserId(8), at(1)).await.unwrap_err(),
            ConfirmError::WrongUser
        );
        assert!(store.take(nonce, UserId(7), at(1)).await.is_ok());
    }

    #[tokio::test]
    async fn stale_entries_are_dropped_on_insert() {
        let store = PendingTransfers::default();
        let stale = store.insert(pending(at(0))).await;
        store.insert(pending(at(10))).await;
        assert_eq!(
            store.take(stale, UserId(7), at(10)).await.unwrap_err(),
            ConfirmError::Unknown
        );
    }
}
