//! The persisted spend ledger.
//!
//! One row holds everything the engine must remember across restarts: what
//! has been withdrawn so far, the current allowance window and the spending
//! mode. It is only written by the engine's writer path.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};

use crate::{EngineConfig, ExternalLimitTracker, ResultEngine, SpendingMode, Usd};

/// Primary key of the single ledger row.
pub(crate) const LEDGER_ID: &str = "default";

/// Committed engine state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ledger {
    pub cumulative_withdrawn: Usd,
    pub tracker: ExternalLimitTracker,
    pub mode: SpendingMode,
    /// Accrual start for sources that do not pin one.
    pub accrual_anchor: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ledger {
    /// A fresh ledger, as created on first start.
    pub fn new(config: &EngineConfig, now: DateTime<Utc>) -> ResultEngine<Self> {
        let tracker = ExternalLimitTracker::new(
            config.external_limit_amount,
            config.external_limit_period,
            config.external_limit_period_start.unwrap_or(now),
        )?;

        Ok(Self {
            cumulative_withdrawn: Usd::ZERO,
            tracker,
            mode: config.spending_mode,
            accrual_anchor: now,
            updated_at: now,
        })
    }

    /// Rebuild the ledger from its row. Limit amount and period length come
    /// from the current configuration.
    pub fn from_model(model: Model, config: &EngineConfig) -> ResultEngine<Self> {
        let tracker = ExternalLimitTracker::restore(
            config.external_limit_amount,
            config.external_limit_period,
            model.period_start,
            Usd::from_base_units(model.spent_this_period_base_units),
        )?;

        Ok(Self {
            cumulative_withdrawn: Usd::from_base_units(model.cumulative_withdrawn_base_units),
            tracker,
            mode: model.spending_mode.parse()?,
            accrual_anchor: model.accrual_anchor,
            updated_at: model.updated_at,
        })
    }

    pub fn to_active_model(&self) -> ResultEngine<ActiveModel> {
        let window = self.tracker.window();
        Ok(ActiveModel {
            id: ActiveValue::Set(LEDGER_ID.to_string()),
            cumulative_withdrawn_base_units: ActiveValue::Set(
                self.cumulative_withdrawn.to_base_units()?,
            ),
            period_start: ActiveValue::Set(window.period_start),
            spent_this_period_base_units: ActiveValue::Set(
                window.spent_this_period.to_base_units()?,
            ),
            spending_mode: ActiveValue::Set(self.mode.code().to_string()),
            accrual_anchor: ActiveValue::Set(self.accrual_anchor),
            updated_at: ActiveValue::Set(self.updated_at),
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ledger")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub cumulative_withdrawn_base_units: i64,
    pub period_start: DateTimeUtc,
    pub spent_this_period_base_units: i64,
    pub spending_mode: String,
    pub accrual_anchor: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
