//! Engine configuration.
//!
//! Configuration is loaded once at startup and validated with
//! [`EngineConfig::validate`]. Changing anything here requires a restart.

use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::{
    EngineError, ResultEngine, SpendingMode, Usd, YieldSource,
    yield_source::{check_bounds, normalize_source_name},
};

/// Default tolerance used to flag denials that miss by a rounding margin.
pub const DEFAULT_EPSILON: Usd = Usd::new(dec!(0.01));

/// A yield source as written in the settings file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct YieldSourceConfig {
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
    pub principal_usd: Usd,
    pub apy_percent: Decimal,
    /// Falls back to the ledger's accrual anchor when absent.
    #[serde(default)]
    pub accrual_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub protocol_address: Option<String>,
}

impl YieldSourceConfig {
    #[must_use]
    pub fn new(name: impl Into<String>, principal_usd: Usd, apy_percent: Decimal) -> Self {
        Self {
            name: name.into(),
            kind: None,
            principal_usd,
            apy_percent,
            accrual_start: None,
            protocol_address: None,
        }
    }

    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    #[must_use]
    pub fn accrual_start(mut self, accrual_start: DateTime<Utc>) -> Self {
        self.accrual_start = Some(accrual_start);
        self
    }

    #[must_use]
    pub fn protocol_address(mut self, address: impl Into<String>) -> Self {
        self.protocol_address = Some(address.into());
        self
    }

    /// Build the runtime source, anchoring accrual at `anchor` if the settings
    /// did not pin a start.
    pub fn resolve(&self, anchor: DateTime<Utc>) -> ResultEngine<YieldSource> {
        let mut source = YieldSource::new(
            &self.name,
            self.principal_usd,
            self.apy_percent,
            self.accrual_start.unwrap_or(anchor),
        )?;
        if let Some(kind) = &self.kind {
            source = source.kind(kind.clone());
        }
        if let Some(address) = &self.protocol_address {
            source = source.protocol_address(address.clone());
        }
        Ok(source)
    }
}

/// Everything the engine needs besides the database and the executor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Mode used when the ledger is first created. Afterwards the persisted
    /// mode wins.
    pub spending_mode: SpendingMode,
    pub external_limit_amount: Usd,
    pub external_limit_period: TimeDelta,
    /// Start of the first allowance window; defaults to the ledger creation
    /// time.
    pub external_limit_period_start: Option<DateTime<Utc>>,
    /// Address approved transfers are sent to.
    pub destination: String,
    pub epsilon: Usd,
    pub yield_sources: Vec<YieldSourceConfig>,
}

impl EngineConfig {
    #[must_use]
    pub fn new(
        destination: impl Into<String>,
        external_limit_amount: Usd,
        external_limit_period: TimeDelta,
    ) -> Self {
        Self {
            spending_mode: SpendingMode::default(),
            external_limit_amount,
            external_limit_period,
            external_limit_period_start: None,
            destination: destination.into(),
            epsilon: DEFAULT_EPSILON,
            yield_sources: Vec::new(),
        }
    }

    #[must_use]
    pub fn spending_mode(mut self, mode: SpendingMode) -> Self {
        self.spending_mode = mode;
        self
    }

    #[must_use]
    pub fn period_start(mut self, start: DateTime<Utc>) -> Self {
        self.external_limit_period_start = Some(start);
        self
    }

    #[must_use]
    pub fn epsilon(mut self, epsilon: Usd) -> Self {
        self.epsilon = epsilon;
        self
    }

    #[must_use]
    pub fn yield_source(mut self, source: YieldSourceConfig) -> Self {
        self.yield_sources.push(source);
        self
    }

    pub fn validate(&self) -> ResultEngine<()> {
        if self.destination.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "destination must not be empty".to_string(),
            ));
        }
        if self.external_limit_amount.is_negative() {
            return Err(EngineError::InvalidConfig(
                "external limit amount must be >= 0".to_string(),
            ));
        }
        if self.external_limit_period.num_seconds() <= 0 {
            return Err(EngineError::InvalidConfig(
                "external limit period must be > 0".to_string(),
            ));
        }
        if self.epsilon.is_negative() {
            return Err(EngineError::InvalidConfig(
                "epsilon must be >= 0".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for source in &self.yield_sources {
            let name = normalize_source_name(&source.name)?;
            check_bounds(&name, source.principal_usd, source.apy_percent)?;
            if !names.insert(name.to_lowercase()) {
                return Err(EngineError::InvalidConfig(format!(
                    "duplicate yield source '{name}'"
                )));
            }
        }

        Ok(())
    }

    /// Runtime sources, anchored at `anchor` where the settings leave the
    /// start open.
    pub fn resolve_sources(&self, anchor: DateTime<Utc>) -> ResultEngine<Vec<YieldSource>> {
        self.yield_sources
            .iter()
            .map(|source| source.resolve(anchor))
            .collect()
    }
}
