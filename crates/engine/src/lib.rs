//! Yield-budget decision engine.
//!
//! [`BudgetEngine`] decides how much of the yield accrued by a set of
//! [`YieldSource`]s may be spent right now, and gates outgoing transfers
//! against that budget. A transfer is approved only if it fits both the
//! spendable ceiling of the current [`SpendingMode`] and the external
//! periodic allowance mirrored by [`ExternalLimitTracker`].
//!
//! All writes go through a single writer path, so two transfers racing for the
//! same budget can never both be approved.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, QuerySelect, TransactionTrait, prelude::*};
use tokio::sync::{Mutex, RwLock, watch};

pub use config::{DEFAULT_EPSILON, EngineConfig, YieldSourceConfig};
pub use decision::{Binding, BudgetSnapshot, Decision, DecisionStatus, Eta, decide};
pub use error::EngineError;
pub use executor::{TransferError, TransferExecutor, TransferReceipt};
pub use ledger::Ledger;
pub use limit::{ExternalLimitTracker, PeriodWindow};
pub use money::Usd;
pub use policy::SpendingMode;
pub use transfers::TransferRecord;
pub use yield_source::{YieldSource, compute_accrued};

mod config;
mod decision;
mod error;
mod executor;
mod ledger;
mod limit;
mod money;
pub mod policy;
mod transfers;
pub mod yield_source;

type ResultEngine<T> = Result<T, EngineError>;

/// What the writer path is doing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnginePhase {
    #[default]
    Idle,
    Evaluating,
    AwaitingTransfer,
    Settling,
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnginePhase::Idle => "idle",
            EnginePhase::Evaluating => "evaluating",
            EnginePhase::AwaitingTransfer => "awaiting transfer",
            EnginePhase::Settling => "settling",
        };
        f.write_str(name)
    }
}

/// Result of [`BudgetEngine::execute_transfer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed {
        record: TransferRecord,
        decision: Decision,
    },
    /// Nothing was sent.
    Denied(Decision),
}

/// Sets the engine phase and puts it back to idle when dropped, whatever the
/// exit path.
struct PhaseGuard<'a> {
    phase: &'a watch::Sender<EnginePhase>,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a watch::Sender<EnginePhase>, value: EnginePhase) -> Self {
        phase.send_replace(value);
        Self { phase }
    }

    fn set(&self, value: EnginePhase) {
        self.phase.send_replace(value);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phase.send_replace(EnginePhase::Idle);
    }
}

pub struct BudgetEngine {
    config: EngineConfig,
    sources: Vec<YieldSource>,
    database: DatabaseConnection,
    executor: Arc<dyn TransferExecutor>,
    committed: RwLock<Ledger>,
    writer: Mutex<()>,
    phase: watch::Sender<EnginePhase>,
}

impl fmt::Debug for BudgetEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BudgetEngine")
            .field("config", &self.config)
            .field("sources", &self.sources)
            .field("phase", &*self.phase.borrow())
            .finish_non_exhaustive()
    }
}

impl BudgetEngine {
    /// Return a builder for `BudgetEngine`. Help to build the struct.
    pub fn builder() -> BudgetEngineBuilder {
        BudgetEngineBuilder::default()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Sources with their accrual start resolved.
    #[must_use]
    pub fn yield_sources(&self) -> &[YieldSource] {
        &self.sources
    }

    #[must_use]
    pub fn phase(&self) -> EnginePhase {
        *self.phase.borrow()
    }

    /// Watch phase changes of the writer path.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<EnginePhase> {
        self.phase.subscribe()
    }

    pub async fn mode(&self) -> SpendingMode {
        self.committed.read().await.mode
    }

    fn snapshot_of(&self, ledger: &Ledger, now: DateTime<Utc>) -> BudgetSnapshot {
        BudgetSnapshot::compute(
            &self.sources,
            ledger.mode,
            ledger.cumulative_withdrawn,
            &ledger.tracker,
            now,
        )
    }

    /// Budget as of `now`, from the committed ledger.
    pub async fn snapshot(&self, now: DateTime<Utc>) -> BudgetSnapshot {
        let ledger = self.committed.read().await;
        self.snapshot_of(&ledger, now)
    }

    /// Decide whether `amount` could be spent at `now`. Never changes state.
    pub async fn evaluate_spend(&self, amount: Usd, now: DateTime<Utc>) -> ResultEngine<Decision> {
        let snapshot = self.snapshot(now).await;
        let decision = decision::decide(snapshot, amount, self.config.epsilon)?;
        tracing::debug!(
            amount = %amount,
            max_available = %decision.max_available_usd,
            status = ?decision.status,
            "spend evaluated"
        );
        Ok(decision)
    }

    /// Re-evaluate `amount` against the committed ledger and, if approved,
    /// send it through the executor and commit.
    ///
    /// The writer lock is held from the check to the commit. On executor
    /// failure the ledger is left untouched and the error is not retried.
    pub async fn execute_transfer(
        &self,
        amount: Usd,
        now: DateTime<Utc>,
    ) -> ResultEngine<TransferOutcome> {
        let _writer = self.writer.lock().await;
        let phase = PhaseGuard::enter(&self.phase, EnginePhase::Evaluating);

        let current = self.committed.read().await.clone();
        let decision = decision::decide(
            self.snapshot_of(&current, now),
            amount,
            self.config.epsilon,
        )?;
        if !decision.is_approved() {
            tracing::info!(
                amount = %amount,
                max_available = %decision.max_available_usd,
                shortfall = %decision.shortfall_usd,
                "transfer denied"
            );
            return Ok(TransferOutcome::Denied(decision));
        }

        // The next ledger is fully prepared before anything leaves the
        // process, so a sent transfer can always be committed.
        let mut next = current;
        next.cumulative_withdrawn = next
            .cumulative_withdrawn
            .checked_add(amount)
            .ok_or_else(|| EngineError::InvalidAmount("amount too large".to_string()))?;
        next.tracker.record_spend(amount, now)?;
        next.updated_at = now;
        let ledger_row = next.to_active_model()?;

        phase.set(EnginePhase::AwaitingTransfer);
        let receipt = match self
            .executor
            .transfer(amount, &self.config.destination)
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                tracing::warn!(amount = %amount, "transfer failed: {err}");
                return Err(EngineError::TransferFailed(err.to_string()));
            }
        };

        phase.set(EnginePhase::Settling);
        let record = TransferRecord::new(
            amount,
            self.config.destination.clone(),
            receipt,
            decision.snapshot.spendable_ceiling_usd,
            decision.snapshot.external_limit_remaining_usd,
            now,
        );
        let persisted = self.persist_transfer(ledger_row, &record).await;
        *self.committed.write().await = next;

        if let Err(err) = persisted {
            tracing::error!(
                tx_reference = %record.tx_reference,
                amount = %amount,
                "transfer sent but ledger not persisted: {err}"
            );
            return Err(EngineError::LedgerNotPersisted {
                tx_reference: record.tx_reference,
                reason: err.to_string(),
            });
        }

        tracing::info!(
            amount = %amount,
            tx_reference = %record.tx_reference,
            "transfer completed"
        );
        Ok(TransferOutcome::Completed { record, decision })
    }

    async fn persist_transfer(
        &self,
        ledger_row: ledger::ActiveModel,
        record: &TransferRecord,
    ) -> ResultEngine<()> {
        let db_tx = self.database.begin().await?;
        ledger_row.update(&db_tx).await?;
        transfers::ActiveModel::try_from(record)?
            .insert(&db_tx)
            .await?;
        db_tx.commit().await?;
        Ok(())
    }

    /// Switch the spending mode. Returns the previous mode.
    ///
    /// Only future evaluations are affected; past withdrawals stay counted.
    pub async fn set_mode(
        &self,
        mode: SpendingMode,
        now: DateTime<Utc>,
    ) -> ResultEngine<SpendingMode> {
        let _writer = self.writer.lock().await;

        let mut next = self.committed.read().await.clone();
        let previous = next.mode;
        if previous == mode {
            return Ok(previous);
        }
        next.mode = mode;
        next.updated_at = now;

        next.to_active_model()?.update(&self.database).await?;
        *self.committed.write().await = next;

        tracing::info!(from = %previous, to = %mode, "spending mode changed");
        Ok(previous)
    }

    /// Executed transfers, newest first. `None` returns all of them.
    pub async fn transfers(&self, limit: Option<u64>) -> ResultEngine<Vec<TransferRecord>> {
        let models = transfers::Entity::find()
            .order_by_desc(transfers::Column::ExecutedAt)
            .limit(limit)
            .all(&self.database)
            .await?;

        models.into_iter().map(TransferRecord::try_from).collect()
    }
}

/// The builder for `BudgetEngine`
#[derive(Default)]
pub struct BudgetEngineBuilder {
    database: DatabaseConnection,
    config: Option<EngineConfig>,
    executor: Option<Arc<dyn TransferExecutor>>,
    started_at: Option<DateTime<Utc>>,
}

impl BudgetEngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> BudgetEngineBuilder {
        self.database = db;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> BudgetEngineBuilder {
        self.config = Some(config);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn TransferExecutor>) -> BudgetEngineBuilder {
        self.executor = Some(executor);
        self
    }

    /// Time used if the ledger has to be created. Defaults to now.
    pub fn started_at(mut self, started_at: DateTime<Utc>) -> BudgetEngineBuilder {
        self.started_at = Some(started_at);
        self
    }

    /// Construct `BudgetEngine`, loading the ledger or creating it on first
    /// start.
    pub async fn build(self) -> ResultEngine<BudgetEngine> {
        let config = self
            .config
            .ok_or_else(|| EngineError::InvalidConfig("missing engine config".to_string()))?;
        let executor = self
            .executor
            .ok_or_else(|| EngineError::InvalidConfig("missing transfer executor".to_string()))?;
        config.validate()?;

        let ledger = match ledger::Entity::find_by_id(ledger::LEDGER_ID)
            .one(&self.database)
            .await?
        {
            Some(model) => {
                let ledger = Ledger::from_model(model, &config)?;
                tracing::info!(
                    cumulative_withdrawn = %ledger.cumulative_withdrawn,
                    mode = %ledger.mode,
                    "ledger restored"
                );
                ledger
            }
            None => {
                let now = self.started_at.unwrap_or_else(Utc::now);
                let ledger = Ledger::new(&config, now)?;
                ledger.to_active_model()?.insert(&self.database).await?;
                tracing::info!(mode = %ledger.mode, "ledger created");
                ledger
            }
        };

        let sources = config.resolve_sources(ledger.accrual_anchor)?;
        tracing::info!(
            limit = %config.external_limit_amount,
            period_days = config.external_limit_period.num_days(),
            sources = sources.len(),
            "mirroring external allowance"
        );

        let (phase, _) = watch::channel(EnginePhase::Idle);
        Ok(BudgetEngine {
            config,
            sources,
            database: self.database,
            executor,
            committed: RwLock::new(ledger),
            writer: Mutex::new(()),
            phase,
        })
    }
}
