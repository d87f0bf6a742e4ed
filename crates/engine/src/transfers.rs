//! History of executed transfers.
//!
//! Rows are appended in the same database transaction that advances the
//! ledger and are never updated afterwards.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::Serialize;
use uuid::Uuid;

use crate::{EngineError, TransferReceipt, Usd};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransferRecord {
    pub id: Uuid,
    pub amount_usd: Usd,
    pub destination: String,
    pub tx_reference: String,
    pub explorer_url: Option<String>,
    /// Spendable ceiling when the transfer was approved.
    pub ceiling_usd: Usd,
    /// External allowance left when the transfer was approved.
    pub limit_remaining_usd: Usd,
    pub executed_at: DateTime<Utc>,
}

impl TransferRecord {
    #[must_use]
    pub fn new(
        amount_usd: Usd,
        destination: impl Into<String>,
        receipt: TransferReceipt,
        ceiling_usd: Usd,
        limit_remaining_usd: Usd,
        executed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount_usd,
            destination: destination.into(),
            tx_reference: receipt.tx_reference,
            explorer_url: receipt.explorer_url,
            ceiling_usd,
            limit_remaining_usd,
            executed_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transfers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub amount_base_units: i64,
    pub destination: String,
    pub tx_reference: String,
    pub explorer_url: Option<String>,
    pub ceiling_base_units: i64,
    pub limit_remaining_base_units: i64,
    pub executed_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&TransferRecord> for ActiveModel {
    type Error = EngineError;

    fn try_from(record: &TransferRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ActiveValue::Set(record.id.to_string()),
            amount_base_units: ActiveValue::Set(record.amount_usd.to_base_units()?),
            destination: ActiveValue::Set(record.destination.clone()),
            tx_reference: ActiveValue::Set(record.tx_reference.clone()),
            explorer_url: ActiveValue::Set(record.explorer_url.clone()),
            ceiling_base_units: ActiveValue::Set(record.ceiling_usd.to_base_units()?),
            limit_remaining_base_units: ActiveValue::Set(
                record.limit_remaining_usd.to_base_units()?,
            ),
            executed_at: ActiveValue::Set(record.executed_at),
        })
    }
}

impl TryFrom<Model> for TransferRecord {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::KeyNotFound("transfer not exists".to_string()))?,
            amount_usd: Usd::from_base_units(model.amount_base_units),
            destination: model.destination,
            tx_reference: model.tx_reference,
            explorer_url: model.explorer_url,
            ceiling_usd: Usd::from_base_units(model.ceiling_base_units),
            limit_remaining_usd: Usd::from_base_units(model.limit_remaining_base_units),
            executed_at: model.executed_at,
        })
    }
}
