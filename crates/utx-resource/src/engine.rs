use crate::auth::Authorization;
use crate::clock::Clock;
use crate::config::{PeriodConfig, ResourceSettings};
use crate::dataset::DatasetStore;
use crate::distributor::{RewardDistributor, TokenAction};
use crate::error::{ResourceError, Result};
use crate::inflation::{InflationModel, InflationParams};
use crate::ledger::SubmissionLedger;
use crate::oracle::{OperatorRegistry, OracleRegistry};
use crate::scheduler::{evaluate_close, phase, PeriodScheduler, Phase};
use crate::storage::ResourceStorage;
use crate::types::{
    BatchReceipt, ClaimReceipt, CloseReceipt, DatasetPayload, IssuanceReceipt, OracleScore,
    PayKind, RoundState, Submission, SubmitTotalReceipt, UsageEntry, UsageHistoryEntry,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use utx_economics::{TokenAmount, TokenLedger};
use utx_quorum::{ModalOutcome, QuorumError, QuorumVerifier};
use utx_types::{AccountName, Checksum256};

/// Arguments of `init_resource`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceParams {
    pub batch_size: u16,
    pub quorum_threshold: u16,
    pub period_start: DateTime<Utc>,
    pub period_seconds: u32,
    pub value_transfer_rate: rust_decimal::Decimal,
    pub max_pay_constant: rust_decimal::Decimal,
}

/// Oracle-fed resource accounting: usage consensus, inflation issuance and
/// reward distribution.
///
/// Every public operation is serialized and atomic. Storage changes run in a
/// transaction that is rolled back on any error, and token movements happen
/// only after every check of the operation has passed.
pub struct ResourceEngine {
    settings: ResourceSettings,
    storage: Arc<dyn ResourceStorage>,
    token: Arc<dyn TokenLedger>,
    clock: Arc<dyn Clock>,
    oracles: Arc<OracleRegistry>,
    model: InflationModel,
    datasets: DatasetStore,
    ledger: SubmissionLedger,
    distributor: RewardDistributor,
    scheduler: PeriodScheduler,
    op_lock: Mutex<()>,
}

impl ResourceEngine {
    pub fn new(
        settings: ResourceSettings,
        storage: Arc<dyn ResourceStorage>,
        token: Arc<dyn TokenLedger>,
        operators: Arc<dyn OperatorRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        settings.validate()?;
        if token.issuer() != &settings.system_account {
            return Err(ResourceError::InvalidConfig(format!(
                "token issuer {} is not the system account {}",
                token.issuer(),
                settings.system_account
            )));
        }

        let oracles = Arc::new(OracleRegistry::new(operators, settings.oracle_set_size));
        let distributor = RewardDistributor::new(
            storage.clone(),
            token.clone(),
            oracles.clone(),
            settings.operator_pay_account.clone(),
            settings.usage_pay_account.clone(),
            settings.max_period_issuance,
        );

        info!(
            system_account = %settings.system_account,
            oracle_set_size = settings.oracle_set_size,
            inflation_day_cap = settings.inflation_day_cap,
            "🚀 Resource engine created"
        );

        Ok(Self {
            model: InflationModel::from_settings(&settings),
            datasets: DatasetStore::new(storage.clone()),
            ledger: SubmissionLedger::new(storage.clone()),
            scheduler: PeriodScheduler::new(storage.clone()),
            distributor,
            oracles,
            settings,
            storage,
            token,
            clock,
            op_lock: Mutex::new(()),
        })
    }

    pub fn settings(&self) -> &ResourceSettings {
        &self.settings
    }

    pub fn model(&self) -> &InflationModel {
        &self.model
    }

    // ========== Operations ==========

    /// Create or replace the period configuration. The active flag and the
    /// EMA drag limit survive re-initialization; history is seeded only once.
    pub async fn init_resource(&self, auth: &Authorization, params: ResourceParams) -> Result<()> {
        self.atomic("init_resource", self.init_resource_inner(auth, params))
            .await
    }

    pub async fn set_active(&self, auth: &Authorization, active: bool) -> Result<()> {
        self.atomic("set_active", self.set_active_inner(auth, active))
            .await
    }

    /// Record an oracle's period totals. The call that completes the quorum
    /// runs the inflation model and issues the period's tokens.
    pub async fn submit_total(
        &self,
        auth: &Authorization,
        oracle: &AccountName,
        cpu_us: u64,
        net_words: u64,
        period_commitment: Checksum256,
        period_start: DateTime<Utc>,
    ) -> Result<SubmitTotalReceipt> {
        self.atomic(
            "submit_total",
            self.submit_total_inner(auth, oracle, cpu_us, net_words, period_commitment, period_start),
        )
        .await
    }

    /// Record one batch of per-account usage. The call that completes the
    /// quorum for `batch_index` allocates usage pay to the agreed accounts.
    pub async fn submit_batch(
        &self,
        auth: &Authorization,
        oracle: &AccountName,
        batch_index: u16,
        entries: Vec<UsageEntry>,
        period_start: DateTime<Utc>,
    ) -> Result<BatchReceipt> {
        self.atomic(
            "submit_batch",
            self.submit_batch_inner(auth, oracle, batch_index, entries, period_start),
        )
        .await
    }

    /// Score the period's oracles and move to the next period. Anyone may call.
    pub async fn advance_period(&self) -> Result<CloseReceipt> {
        self.atomic("advance_period", self.advance_period_inner())
            .await
    }

    /// Pay out and delete the account's pending usage and operator balances.
    pub async fn claim(&self, auth: &Authorization, account: &AccountName) -> Result<ClaimReceipt> {
        self.atomic("claim", self.claim_inner(auth, account)).await
    }

    /// Purge history, datasets, balances, scores and submissions. The
    /// configuration is kept. Only allowed while issuance is inactive.
    pub async fn clear_all(&self, auth: &Authorization) -> Result<()> {
        self.atomic("clear_all", self.clear_all_inner(auth)).await
    }

    // ========== Queries ==========

    pub async fn config(&self) -> Result<PeriodConfig> {
        let _guard = self.op_lock.lock().await;
        self.load_config().await
    }

    pub async fn round(&self) -> Result<RoundState> {
        let _guard = self.op_lock.lock().await;
        self.load_round().await
    }

    pub async fn phase(&self) -> Result<Phase> {
        let _guard = self.op_lock.lock().await;
        let config = self.load_config().await?;
        let round = self.load_round().await?;
        Ok(phase(&config, &round, self.clock.now()))
    }

    /// Up to `limit` most recent history entries, oldest first.
    pub async fn history(&self, limit: usize) -> Result<Vec<UsageHistoryEntry>> {
        let _guard = self.op_lock.lock().await;
        self.storage
            .recent_history(limit)
            .await
            .map_err(ResourceError::storage)
    }

    pub async fn account_balance(&self, account: &AccountName) -> Result<TokenAmount> {
        let _guard = self.op_lock.lock().await;
        self.distributor.balance(PayKind::Usage, account).await
    }

    pub async fn operator_balance(&self, account: &AccountName) -> Result<TokenAmount> {
        let _guard = self.op_lock.lock().await;
        self.distributor.balance(PayKind::Operator, account).await
    }

    pub async fn oracle_score(&self, oracle: &AccountName) -> Result<OracleScore> {
        let _guard = self.op_lock.lock().await;
        self.scheduler.score(oracle).await
    }

    pub async fn oracle_scores(&self) -> Result<Vec<(AccountName, OracleScore)>> {
        let _guard = self.op_lock.lock().await;
        self.storage
            .list_scores()
            .await
            .map_err(ResourceError::storage)
    }

    pub async fn submission(&self, oracle: &AccountName) -> Result<Option<Submission>> {
        let _guard = self.op_lock.lock().await;
        self.ledger.get(oracle).await
    }

    /// `(cpu_us, net_bytes)` available in one period window.
    pub async fn capacity(&self) -> Result<(u64, u64)> {
        let _guard = self.op_lock.lock().await;
        let config = self.load_config().await?;
        Ok(self.capacity_for(&config))
    }

    // ========== Internals ==========

    /// Run `operation` inside a storage transaction, then apply its token
    /// actions. Any failure rolls the storage back.
    async fn atomic<T, F>(&self, name: &'static str, operation: F) -> Result<T>
    where
        F: Future<Output = Result<(T, Vec<TokenAction>)>>,
    {
        let _guard = self.op_lock.lock().await;
        self.storage
            .begin_transaction()
            .await
            .map_err(ResourceError::storage)?;

        let result = match operation.await {
            Ok((value, actions)) => self.distributor.apply(actions).await.map(|_| value),
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => {
                self.storage
                    .commit_transaction()
                    .await
                    .map_err(ResourceError::storage)?;
                Ok(value)
            }
            Err(e) => {
                warn!(operation = name, error = %e, category = ?e.category(), "❌ Operation rolled back");
                if let Err(rollback) = self.storage.rollback_transaction().await {
                    warn!(operation = name, error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn init_resource_inner(
        &self,
        auth: &Authorization,
        params: ResourceParams,
    ) -> Result<((), Vec<TokenAction>)> {
        auth.require(&self.settings.system_account)?;

        let existing = self
            .storage
            .get_config()
            .await
            .map_err(ResourceError::storage)?;
        let config = PeriodConfig {
            period_seconds: params.period_seconds,
            period_start: params.period_start,
            quorum_threshold: params.quorum_threshold,
            batch_size: params.batch_size,
            value_transfer_rate: params.value_transfer_rate,
            max_pay_constant: params.max_pay_constant,
            ema_drag_limit: existing
                .as_ref()
                .map_or(self.settings.ema_drag_limit, |c| c.ema_drag_limit),
            active: existing.as_ref().map_or(false, |c| c.active),
        };
        config.validate()?;

        let history_len = self
            .storage
            .history_len()
            .await
            .map_err(ResourceError::storage)?;
        if history_len == 0 {
            self.storage
                .append_history(UsageHistoryEntry::genesis(config.period_start))
                .await
                .map_err(ResourceError::storage)?;
        }

        info!(
            period_start = %config.period_start,
            period_seconds = config.period_seconds,
            quorum_threshold = config.quorum_threshold,
            batch_size = config.batch_size,
            active = config.active,
            seeded_history = history_len == 0,
            "⚙️ Resource configuration initialized"
        );
        self.put_config(config).await?;
        Ok(((), Vec::new()))
    }

    async fn set_active_inner(
        &self,
        auth: &Authorization,
        active: bool,
    ) -> Result<((), Vec<TokenAction>)> {
        auth.require(&self.settings.system_account)?;
        let mut config = self.load_config().await?;
        if config.active == active {
            return Err(ResourceError::AlreadyInState { active });
        }
        config.active = active;
        self.put_config(config).await?;
        info!(active, "🔀 Resource issuance toggled");
        Ok(((), Vec::new()))
    }

    async fn submit_total_inner(
        &self,
        auth: &Authorization,
        oracle: &AccountName,
        cpu_us: u64,
        net_words: u64,
        period_commitment: Checksum256,
        period_start: DateTime<Utc>,
    ) -> Result<(SubmitTotalReceipt, Vec<TokenAction>)> {
        let config = self.load_config().await?;
        auth.require(oracle)?;
        self.ensure_eligible(oracle).await?;
        if period_start != config.period_start {
            return Err(ResourceError::InvalidPeriod {
                submitted: period_start,
                current: config.period_start,
            });
        }
        self.ledger.ensure_absent(oracle).await?;

        if cpu_us == 0 || net_words == 0 {
            return Err(ResourceError::InvalidMeasurement(
                "cpu and net totals must be greater than 0".to_string(),
            ));
        }
        let (cpu_capacity, net_capacity) = self.capacity_for(&config);
        if cpu_us > cpu_capacity {
            return Err(ResourceError::OutOfRange {
                resource: "cpu",
                value: cpu_us,
                capacity: cpu_capacity,
            });
        }
        let net_bytes = net_words.saturating_mul(8);
        if net_bytes > net_capacity {
            return Err(ResourceError::OutOfRange {
                resource: "net",
                value: net_bytes,
                capacity: net_capacity,
            });
        }

        let hash = self
            .datasets
            .remember(DatasetPayload::Totals { cpu_us, net_words })
            .await?;
        self.ledger
            .record_total(oracle, cpu_us, net_words, period_commitment)
            .await?;

        let mut round = self.load_round().await?;
        round.submitting_oracles.push(oracle.clone());

        info!(
            oracle = %oracle,
            cpu_us,
            net_words,
            hash = %hash,
            submitted = round.submitting_oracles.len(),
            "📥 Usage totals submitted"
        );

        let mut issuance = None;
        let mut actions = Vec::new();
        if !round.inflation_issued {
            let reports = self.ledger.slot_reports(&round.submitting_oracles, 0).await?;
            if let Some(modal) = slot_quorum("totals", reports, config.quorum_threshold)? {
                let (receipt, issue_actions) = self.issue_inflation(&config, &modal.hash).await?;
                round.inflation_issued = true;
                issuance = Some(receipt);
                actions = issue_actions;
            }
        }
        self.put_round(round).await?;

        Ok((SubmitTotalReceipt { hash, issuance }, actions))
    }

    async fn issue_inflation(
        &self,
        config: &PeriodConfig,
        modal_hash: &Checksum256,
    ) -> Result<(IssuanceReceipt, Vec<TokenAction>)> {
        let (cpu_us, net_words) = self.datasets.resolve_totals(modal_hash).await?;
        let (cpu_capacity, net_capacity) = self.capacity_for(config);
        let sample = self.model.sample(
            config.period_start,
            cpu_us,
            net_words,
            cpu_capacity,
            net_capacity,
        )?;

        let history = self
            .storage
            .recent_history(config.ema_drag_limit.max(1) as usize)
            .await
            .map_err(ResourceError::storage)?;
        let supply = self.token.supply().await.map_err(ResourceError::token)?;
        let mut entry = self
            .model
            .step(&history, &sample, InflationParams::from(config), supply)?;

        let (receipt, actions) = if config.active {
            self.distributor
                .issue_period(&mut entry, self.clock.now())
                .await?
        } else {
            info!(day = entry.day, "⏸️ Issuance inactive, history recorded only");
            let receipt = IssuanceReceipt {
                day: entry.day,
                operator_tokens: TokenAmount::ZERO,
                usage_tokens: TokenAmount::ZERO,
                per_operator: TokenAmount::ZERO,
                operators_paid: 0,
                issued: false,
            };
            (receipt, Vec::new())
        };

        self.storage
            .append_history(entry)
            .await
            .map_err(ResourceError::storage)?;
        Ok((receipt, actions))
    }

    async fn submit_batch_inner(
        &self,
        auth: &Authorization,
        oracle: &AccountName,
        batch_index: u16,
        entries: Vec<UsageEntry>,
        period_start: DateTime<Utc>,
    ) -> Result<(BatchReceipt, Vec<TokenAction>)> {
        let config = self.load_config().await?;
        auth.require(oracle)?;
        let mut round = self.load_round().await?;
        if !round.inflation_issued {
            return Err(ResourceError::InflationNotReady);
        }
        if period_start != config.period_start {
            return Err(ResourceError::PeriodMismatch {
                submitted: period_start,
                current: config.period_start,
            });
        }
        self.ensure_eligible(oracle).await?;
        if entries.is_empty() {
            return Err(ResourceError::EmptyBatch);
        }
        if entries.len() > usize::from(config.batch_size) {
            return Err(ResourceError::BatchTooLarge {
                size: entries.len(),
                limit: config.batch_size,
            });
        }

        let submission = self.ledger.record_batch(oracle, batch_index, &entries).await?;
        let hash = self.datasets.remember(DatasetPayload::Batch(entries)).await?;

        info!(
            oracle = %oracle,
            batch_index,
            hash = %hash,
            allocated_cpu = submission.allocated_cpu,
            declared_cpu_total = submission.declared_cpu_total,
            "📦 Usage batch submitted"
        );

        let mut allocation = None;
        let threshold = usize::from(config.quorum_threshold);
        if !round.batches_distributed.contains(&batch_index)
            && round.submitting_oracles.len() >= threshold
        {
            let reports = self
                .ledger
                .slot_reports(&round.submitting_oracles, usize::from(batch_index))
                .await?;
            let slot = format!("batch {}", batch_index);
            if let Some(modal) = slot_quorum(&slot, reports, config.quorum_threshold)? {
                let winning = self.datasets.resolve_batch(&modal.hash).await?;
                let period = self
                    .storage
                    .recent_history(1)
                    .await
                    .map_err(ResourceError::storage)?
                    .pop()
                    .ok_or(ResourceError::NotInitialized)?;
                let summary = self
                    .distributor
                    .allocate_batch(&winning, &period, self.clock.now())
                    .await?;
                round.batches_distributed.insert(batch_index);
                self.put_round(round).await?;
                allocation = Some(summary);
            }
        }

        Ok((
            BatchReceipt {
                batch_index,
                hash,
                allocation,
            },
            Vec::new(),
        ))
    }

    async fn advance_period_inner(&self) -> Result<(CloseReceipt, Vec<TokenAction>)> {
        let config = self.load_config().await?;
        PeriodScheduler::ensure_closeable(&config, self.clock.now())?;

        let round = self.load_round().await?;
        let submissions = self.ledger.submissions(&round.submitting_oracles).await?;
        let outcome = evaluate_close(&submissions, config.quorum_threshold)?;

        self.datasets.clear().await?;
        self.ledger.clear().await?;
        let receipt = self.scheduler.close(config, outcome).await?;
        Ok((receipt, Vec::new()))
    }

    async fn claim_inner(
        &self,
        auth: &Authorization,
        account: &AccountName,
    ) -> Result<(ClaimReceipt, Vec<TokenAction>)> {
        self.load_config().await?;
        auth.require(account)?;
        self.distributor.claim(account).await
    }

    async fn clear_all_inner(&self, auth: &Authorization) -> Result<((), Vec<TokenAction>)> {
        let config = self.load_config().await?;
        auth.require(&self.settings.system_account)?;
        if config.active {
            return Err(ResourceError::EngineActive);
        }

        self.storage
            .clear_history()
            .await
            .map_err(ResourceError::storage)?;
        self.storage
            .clear_balances()
            .await
            .map_err(ResourceError::storage)?;
        self.storage
            .clear_scores()
            .await
            .map_err(ResourceError::storage)?;
        self.datasets.clear().await?;
        self.ledger.clear().await?;
        self.put_round(RoundState::default()).await?;

        warn!("🧹 All resource tables purged");
        Ok(((), Vec::new()))
    }

    async fn ensure_eligible(&self, oracle: &AccountName) -> Result<()> {
        if self.oracles.is_eligible(oracle).await? {
            Ok(())
        } else {
            Err(ResourceError::Unauthorized {
                account: oracle.clone(),
                reason: "is not an eligible oracle".to_string(),
            })
        }
    }

    fn capacity_for(&self, config: &PeriodConfig) -> (u64, u64) {
        (
            self.settings.chain.cpu_capacity(config.period_seconds),
            self.settings.chain.net_capacity(config.period_seconds),
        )
    }

    async fn load_config(&self) -> Result<PeriodConfig> {
        self.storage
            .get_config()
            .await
            .map_err(ResourceError::storage)?
            .ok_or(ResourceError::NotInitialized)
    }

    async fn put_config(&self, config: PeriodConfig) -> Result<()> {
        self.storage
            .put_config(config)
            .await
            .map_err(ResourceError::storage)
    }

    async fn load_round(&self) -> Result<RoundState> {
        self.storage.get_round().await.map_err(ResourceError::storage)
    }

    async fn put_round(&self, round: RoundState) -> Result<()> {
        self.storage
            .put_round(round)
            .await
            .map_err(ResourceError::storage)
    }
}

/// Modal outcome for a slot if it reached `threshold`, `None` otherwise.
fn slot_quorum(
    slot: &str,
    reports: Vec<(AccountName, Checksum256)>,
    threshold: u16,
) -> Result<Option<ModalOutcome>> {
    match QuorumVerifier::verify(slot, reports, usize::from(threshold)) {
        Ok(outcome) => Ok(Some(outcome)),
        Err(QuorumError::NoReports) | Err(QuorumError::ThresholdNotMet { .. }) => Ok(None),
        Err(e) => Err(ResourceError::InvalidConfig(e.to_string())),
    }
}
