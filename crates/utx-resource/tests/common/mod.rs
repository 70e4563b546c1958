#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use utx_economics::{TokenAmount, TokenBank};
use utx_resource::{
    batch_hash, period_commitment, totals_hash, Authorization, ManualClock, MemoryResourceStorage,
    ProducerSchedule, ResourceEngine, ResourceParams, ResourceSettings, SubmitTotalReceipt,
    UsageEntry,
};
use utx_types::{AccountName, Checksum256};

pub const PERIOD_SECONDS: u32 = 86_400;
pub const GENESIS_UTX: u64 = 1_000_000_000;

pub struct Harness {
    pub engine: Arc<ResourceEngine>,
    pub bank: Arc<TokenBank>,
    pub schedule: Arc<ProducerSchedule>,
    pub clock: Arc<ManualClock>,
    pub settings: ResourceSettings,
    pub oracles: Vec<AccountName>,
}

pub fn name(s: &str) -> AccountName {
    s.parse().unwrap()
}

/// `oracle.a`, `oracle.b`, ...
pub fn oracle(i: usize) -> AccountName {
    name(&format!("oracle.{}", (b'a' + i as u8) as char))
}

pub fn start() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_006_400, 0).unwrap()
}

pub fn params(threshold: u16, batch_size: u16) -> ResourceParams {
    ResourceParams {
        batch_size,
        quorum_threshold: threshold,
        period_start: start(),
        period_seconds: PERIOD_SECONDS,
        value_transfer_rate: Decimal::new(1, 1),
        max_pay_constant: Decimal::new(2947, 4),
    }
}

pub fn entry(account: &str, cpu_us: u64) -> UsageEntry {
    UsageEntry::new(name(account), cpu_us)
}

/// Commitment an honest oracle declares for totals plus batches in order.
pub fn commitment(cpu_us: u64, net_words: u64, batches: &[Vec<UsageEntry>]) -> Checksum256 {
    let mut hashes = vec![totals_hash(cpu_us, net_words)];
    hashes.extend(batches.iter().map(|b| batch_hash(b)));
    period_commitment(&hashes)
}

impl Harness {
    /// Engine with `operators` registered oracles, initialized and active.
    pub async fn new(operators: usize, threshold: u16) -> Self {
        Self::with_settings(operators, threshold, ResourceSettings::default()).await
    }

    pub async fn with_settings(operators: usize, threshold: u16, settings: ResourceSettings) -> Self {
        let schedule = Arc::new(ProducerSchedule::new(settings.oracle_set_size));
        let oracles: Vec<AccountName> = (0..operators).map(oracle).collect();
        for (i, op) in oracles.iter().enumerate() {
            schedule.register(op.clone(), 1_000 - i as u64).await;
        }
        schedule.elect().await;

        let bank = Arc::new(TokenBank::in_memory(
            settings.system_account.clone(),
            TokenAmount::DEFAULT_MAX_SUPPLY,
        ));
        bank.initialize_genesis(TokenAmount::from_whole(GENESIS_UTX))
            .await
            .unwrap();

        let clock = Arc::new(ManualClock::new(start()));
        let engine = Arc::new(
            ResourceEngine::new(
                settings.clone(),
                Arc::new(MemoryResourceStorage::new()),
                bank.clone(),
                schedule.clone(),
                clock.clone(),
            )
            .unwrap(),
        );

        let system = Authorization::signed_by(settings.system_account.clone());
        engine.init_resource(&system, params(threshold, 10)).await.unwrap();
        engine.set_active(&system, true).await.unwrap();

        Self {
            engine,
            bank,
            schedule,
            clock,
            settings,
            oracles,
        }
    }

    pub fn system(&self) -> Authorization {
        Authorization::signed_by(self.settings.system_account.clone())
    }

    pub async fn period_start(&self) -> DateTime<Utc> {
        self.engine.config().await.unwrap().period_start
    }

    /// Submit totals with an honest commitment over `batches`.
    pub async fn submit_total(
        &self,
        oracle: &AccountName,
        cpu_us: u64,
        net_words: u64,
        batches: &[Vec<UsageEntry>],
    ) -> utx_resource::Result<SubmitTotalReceipt> {
        let period_start = self.period_start().await;
        self.engine
            .submit_total(
                &Authorization::signed_by(oracle.clone()),
                oracle,
                cpu_us,
                net_words,
                commitment(cpu_us, net_words, batches),
                period_start,
            )
            .await
    }

    pub async fn submit_batch(
        &self,
        oracle: &AccountName,
        batch_index: u16,
        entries: Vec<UsageEntry>,
    ) -> utx_resource::Result<utx_resource::BatchReceipt> {
        let period_start = self.period_start().await;
        self.engine
            .submit_batch(
                &Authorization::signed_by(oracle.clone()),
                oracle,
                batch_index,
                entries,
                period_start,
            )
            .await
    }

    /// Every oracle in `reporters` submits the same totals and batches.
    pub async fn run_period(
        &self,
        reporters: &[AccountName],
        cpu_us: u64,
        net_words: u64,
        batches: &[Vec<UsageEntry>],
    ) {
        for oracle in reporters {
            self.submit_total(oracle, cpu_us, net_words, batches)
                .await
                .unwrap();
        }
        for oracle in reporters {
            for (i, batch) in batches.iter().enumerate() {
                self.submit_batch(oracle, (i + 1) as u16, batch.clone())
                    .await
                    .unwrap();
            }
        }
    }

    pub fn finish_period(&self) {
        self.clock.advance(Duration::seconds(i64::from(PERIOD_SECONDS)));
    }
}
