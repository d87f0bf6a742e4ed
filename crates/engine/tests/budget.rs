use std::{
    sync::{Arc, Mutex},
    time::Duration as StdDuration,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};
use tokio::sync::Semaphore;
use uuid::Uuid;

use engine::{
    Binding, BudgetEngine, DecisionStatus, EngineConfig, EngineError, EnginePhase, Eta,
    SpendingMode, TransferError, TransferExecutor, TransferOutcome, TransferReceipt, Usd,
    YieldSourceConfig,
};
use migration::MigratorTrait;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 5, 0, 0, 0).unwrap()
}

fn day(n: i64) -> DateTime<Utc> {
    start() + Duration::days(n)
}

fn usd(value: rust_decimal::Decimal) -> Usd {
    Usd::new(value)
}

/// $365,000 at 10% accrues exactly $100 a day, so a balanced ceiling grows by
/// $80 a day against a $56 weekly allowance.
fn config() -> EngineConfig {
    EngineConfig::new("0xdestination", usd(dec!(56)), Duration::days(7))
        .period_start(start())
        .yield_source(
            YieldSourceConfig::new("Aave V3 USDC", usd(dec!(365000)), dec!(10))
                .kind("aave_v3")
                .accrual_start(start()),
        )
}

#[derive(Default)]
struct RecordingExecutor {
    calls: Mutex<Vec<(Usd, String)>>,
}

impl RecordingExecutor {
    fn calls(&self) -> Vec<(Usd, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransferExecutor for RecordingExecutor {
    async fn transfer(
        &self,
        amount: Usd,
        destination: &str,
    ) -> Result<TransferReceipt, TransferError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push((amount, destination.to_string()));
        Ok(TransferReceipt::new(format!("0xhash{}", calls.len()))
            .explorer_url(format!("https://basescan.org/tx/0xhash{}", calls.len())))
    }
}

struct FailingExecutor;

#[async_trait]
impl TransferExecutor for FailingExecutor {
    async fn transfer(&self, _: Usd, _: &str) -> Result<TransferReceipt, TransferError> {
        Err(TransferError::Rejected("insufficient gas".to_string()))
    }
}

/// Blocks every transfer until the test hands out a permit.
struct GatedExecutor {
    gate: Semaphore,
    inner: RecordingExecutor,
}

impl GatedExecutor {
    fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            inner: RecordingExecutor::default(),
        }
    }
}

#[async_trait]
impl TransferExecutor for GatedExecutor {
    async fn transfer(
        &self,
        amount: Usd,
        destination: &str,
    ) -> Result<TransferReceipt, TransferError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|err| TransferError::Unavailable(err.to_string()))?;
        permit.forget();
        self.inner.transfer(amount, destination).await
    }
}

async fn memory_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

async fn engine_with(executor: Arc<dyn TransferExecutor>) -> BudgetEngine {
    BudgetEngine::builder()
        .database(memory_db().await)
        .config(config())
        .executor(executor)
        .started_at(start())
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn evaluate_approves_and_denies() {
    let engine = engine_with(Arc::new(RecordingExecutor::default())).await;

    let snapshot = engine.snapshot(day(1)).await;
    assert_eq!(snapshot.accrued_yield_usd, usd(dec!(100)));
    assert_eq!(snapshot.spendable_ceiling_usd, usd(dec!(80)));
    assert_eq!(snapshot.reserved_usd, usd(dec!(20)));
    assert_eq!(snapshot.max_available(), usd(dec!(56)));

    let approved = engine.evaluate_spend(usd(dec!(50)), day(1)).await.unwrap();
    assert_eq!(approved.status, DecisionStatus::Approved);

    let denied = engine.evaluate_spend(usd(dec!(1000)), day(1)).await.unwrap();
    assert_eq!(denied.status, DecisionStatus::Denied);
    assert_eq!(denied.shortfall_usd, usd(dec!(944)));
    assert_eq!(denied.binding, Binding::ExternalLimit);
    assert_eq!(denied.eta, Some(Eta::AboveAllowance));
}

#[tokio::test]
async fn evaluate_is_read_only() {
    let engine = engine_with(Arc::new(RecordingExecutor::default())).await;

    let first = engine.evaluate_spend(usd(dec!(20)), day(1)).await.unwrap();
    let second = engine.evaluate_spend(usd(dec!(20)), day(1)).await.unwrap();
    assert_eq!(first, second);
    assert!(engine.transfers(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn yield_ceiling_binds_early_with_days_eta() {
    let engine = engine_with(Arc::new(RecordingExecutor::default())).await;

    // Half a day in: $50 accrued, $40 spendable.
    let decision = engine
        .evaluate_spend(usd(dec!(48)), start() + Duration::hours(12))
        .await
        .unwrap();
    assert_eq!(decision.status, DecisionStatus::Denied);
    assert_eq!(decision.binding, Binding::YieldCeiling);
    assert_eq!(decision.shortfall_usd, usd(dec!(8)));
    assert_eq!(decision.eta, Some(Eta::Days(dec!(0.1))));
}

#[tokio::test]
async fn rejects_non_positive_amounts() {
    let engine = engine_with(Arc::new(RecordingExecutor::default())).await;

    let err = engine.evaluate_spend(Usd::ZERO, day(1)).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));
    let err = engine
        .execute_transfer(usd(dec!(-5)), day(1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));
}

#[tokio::test]
async fn transfer_advances_ledger_and_history() {
    let executor = Arc::new(RecordingExecutor::default());
    let engine = engine_with(executor.clone()).await;

    let outcome = engine
        .execute_transfer(usd(dec!(50)), day(1))
        .await
        .unwrap();
    let TransferOutcome::Completed { record, decision } = outcome else {
        panic!("expected a completed transfer");
    };
    assert_eq!(record.tx_reference, "0xhash1");
    assert_eq!(record.amount_usd, usd(dec!(50)));
    assert_eq!(record.ceiling_usd, usd(dec!(80)));
    assert_eq!(record.limit_remaining_usd, usd(dec!(56)));
    assert_eq!(decision.remaining_after(), usd(dec!(6)));

    assert_eq!(
        executor.calls(),
        vec![(usd(dec!(50)), "0xdestination".to_string())]
    );

    let snapshot = engine.snapshot(day(1)).await;
    assert_eq!(snapshot.cumulative_withdrawn_usd, usd(dec!(50)));
    assert_eq!(snapshot.spendable_ceiling_usd, usd(dec!(30)));
    assert_eq!(snapshot.external_limit_remaining_usd, usd(dec!(6)));

    let history = engine.transfers(None).await.unwrap();
    assert_eq!(history, vec![record]);
    assert_eq!(engine.phase(), EnginePhase::Idle);
}

#[tokio::test]
async fn exhausted_limit_waits_for_reset() {
    let engine = engine_with(Arc::new(RecordingExecutor::default())).await;
    engine
        .execute_transfer(usd(dec!(56)), day(1))
        .await
        .unwrap();

    let outcome = engine
        .execute_transfer(usd(dec!(1)), day(2))
        .await
        .unwrap();
    let TransferOutcome::Denied(decision) = outcome else {
        panic!("expected a denial");
    };
    assert_eq!(decision.binding, Binding::ExternalLimit);
    assert_eq!(decision.eta, Some(Eta::NextPeriodReset { at: day(7) }));
    assert_eq!(engine.transfers(None).await.unwrap().len(), 1);

    // Next window: the allowance is whole again, withdrawals still count.
    let snapshot = engine.snapshot(day(8)).await;
    assert_eq!(snapshot.period_start, day(7));
    assert_eq!(snapshot.external_limit_remaining_usd, usd(dec!(56)));
    assert_eq!(snapshot.spendable_ceiling_usd, usd(dec!(584)));
}

#[tokio::test]
async fn concurrent_transfers_cannot_double_spend() {
    let executor = Arc::new(GatedExecutor::new());
    let engine = engine_with(executor.clone()).await;
    executor.gate.add_permits(2);

    let (a, b) = tokio::join!(
        engine.execute_transfer(usd(dec!(40)), day(1)),
        engine.execute_transfer(usd(dec!(40)), day(1)),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    let completed = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, TransferOutcome::Completed { .. }))
        .count();
    assert_eq!(completed, 1);
    assert_eq!(executor.inner.calls().len(), 1);

    let snapshot = engine.snapshot(day(1)).await;
    assert_eq!(snapshot.cumulative_withdrawn_usd, usd(dec!(40)));
    assert_eq!(snapshot.spent_this_period_usd, usd(dec!(40)));
}

#[tokio::test]
async fn executor_failure_leaves_ledger_untouched() {
    let engine = engine_with(Arc::new(FailingExecutor)).await;
    let before = engine.snapshot(day(1)).await;

    let err = engine
        .execute_transfer(usd(dec!(10)), day(1))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::TransferFailed("transfer rejected: insufficient gas".to_string())
    );

    assert_eq!(engine.snapshot(day(1)).await, before);
    assert!(engine.transfers(None).await.unwrap().is_empty());
    assert_eq!(engine.phase(), EnginePhase::Idle);
}

#[tokio::test]
async fn phase_follows_the_writer_path() {
    let executor = Arc::new(GatedExecutor::new());
    let engine = Arc::new(engine_with(executor.clone()).await);
    let mut phases = engine.subscribe_phase();

    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.execute_transfer(usd(dec!(10)), day(1)).await }
    });

    phases
        .wait_for(|phase| *phase == EnginePhase::AwaitingTransfer)
        .await
        .unwrap();
    // Readers are never blocked by an in-flight transfer.
    assert_eq!(
        engine.snapshot(day(1)).await.cumulative_withdrawn_usd,
        Usd::ZERO
    );

    executor.gate.add_permits(1);
    let outcome = task.await.unwrap().unwrap();
    assert!(matches!(outcome, TransferOutcome::Completed { .. }));
    assert_eq!(engine.phase(), EnginePhase::Idle);
}

#[tokio::test]
async fn dropped_transfer_commits_nothing() {
    let executor = Arc::new(GatedExecutor::new());
    let engine = engine_with(executor.clone()).await;

    let result = tokio::time::timeout(
        StdDuration::from_millis(50),
        engine.execute_transfer(usd(dec!(10)), day(1)),
    )
    .await;
    assert!(result.is_err());

    assert_eq!(engine.phase(), EnginePhase::Idle);
    assert_eq!(
        engine.snapshot(day(1)).await.cumulative_withdrawn_usd,
        Usd::ZERO
    );
    // The writer lock was released.
    engine
        .set_mode(SpendingMode::Growth, day(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn mode_change_affects_future_evaluations() {
    let engine = engine_with(Arc::new(RecordingExecutor::default())).await;
    engine
        .execute_transfer(usd(dec!(20)), day(1))
        .await
        .unwrap();

    let previous = engine
        .set_mode(SpendingMode::Conservative, day(1))
        .await
        .unwrap();
    assert_eq!(previous, SpendingMode::Balanced);
    assert_eq!(engine.mode().await, SpendingMode::Conservative);

    let snapshot = engine.snapshot(day(1)).await;
    assert_eq!(snapshot.spendable_ceiling_usd, usd(dec!(30)));
    assert_eq!(snapshot.cumulative_withdrawn_usd, usd(dec!(20)));
}

#[tokio::test]
async fn builder_requires_config_and_executor() {
    let err = BudgetEngine::builder()
        .database(memory_db().await)
        .executor(Arc::new(FailingExecutor))
        .build()
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidConfig("missing engine config".to_string())
    );

    let err = BudgetEngine::builder()
        .database(memory_db().await)
        .config(config())
        .build()
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidConfig("missing transfer executor".to_string())
    );
}

#[tokio::test]
async fn ledger_survives_rebuild() {
    let root = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target/test_dbs");
    std::fs::create_dir_all(&root).unwrap();
    let path = root.join(format!("engine_{}.db", Uuid::new_v4()));
    let url = format!("sqlite:{}?mode=rwc", path.display());

    {
        let db = Database::connect(&url).await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        let engine = BudgetEngine::builder()
            .database(db.clone())
            .config(config())
            .executor(Arc::new(RecordingExecutor::default()))
            .started_at(start())
            .build()
            .await
            .unwrap();
        engine
            .execute_transfer(usd(dec!(20)), day(1))
            .await
            .unwrap();
        engine
            .set_mode(SpendingMode::Growth, day(1))
            .await
            .unwrap();
        drop(engine);
        drop(db);
    }

    let db = Database::connect(&url).await.unwrap();
    let engine = BudgetEngine::builder()
        .database(db.clone())
        .config(config().spending_mode(SpendingMode::Conservative))
        // Ignored: the ledger already exists.
        .started_at(day(30))
        .executor(Arc::new(RecordingExecutor::default()))
        .build()
        .await
        .unwrap();

    assert_eq!(engine.mode().await, SpendingMode::Growth);
    let snapshot = engine.snapshot(day(2)).await;
    assert_eq!(snapshot.cumulative_withdrawn_usd, usd(dec!(20)));
    assert_eq!(snapshot.spent_this_period_usd, usd(dec!(20)));
    assert_eq!(snapshot.period_start, start());
    assert_eq!(engine.transfers(Some(10)).await.unwrap().len(), 1);

    drop(engine);
    drop(db);
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn sent_transfer_counts_even_if_ledger_write_fails() {
    let db = memory_db().await;
    let executor = Arc::new(RecordingExecutor::default());
    let engine = BudgetEngine::builder()
        .database(db.clone())
        .config(config())
        .executor(executor.clone())
        .started_at(start())
        .build()
        .await
        .unwrap();

    db.execute_unprepared("DROP TABLE transfers").await.unwrap();

    let err = engine
        .execute_transfer(usd(dec!(20)), day(1))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::LedgerNotPersisted {
            tx_reference: "0xhash1".to_string(),
            reason: String::new(),
        }
    );
    assert_eq!(executor.calls().len(), 1);
    assert_eq!(engine.phase(), EnginePhase::Idle);

    // The money left, so the budget must not offer it again.
    let snapshot = engine.snapshot(day(1)).await;
    assert_eq!(snapshot.cumulative_withdrawn_usd, usd(dec!(20)));
    assert_eq!(snapshot.spent_this_period_usd, usd(dec!(20)));
    assert_eq!(snapshot.max_available(), usd(dec!(36)));

    let denied = engine.evaluate_spend(usd(dec!(40)), day(1)).await.unwrap();
    assert_eq!(denied.status, DecisionStatus::Denied);
}
