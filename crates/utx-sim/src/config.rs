use anyhow::{ensure, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use utx_economics::TokenAmount;
use utx_resource::ResourceSettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub logging: LoggingConfig,
    pub simulation: SimulationConfig,
    pub resource: ResourceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
    pub file_output: Option<PathBuf>,
    pub module_filters: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_output: None,
            module_filters: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub days: u64,
    pub oracles: usize,
    /// Oracles that report skewed totals every period.
    pub faulty_oracles: usize,
    pub threshold: u16,
    pub accounts: usize,
    pub batch_size: u16,
    pub period_seconds: u32,
    /// Unix seconds of the first period.
    pub start_timestamp: i64,
    pub value_transfer_rate: Decimal,
    pub max_pay_constant: Decimal,
    /// Mean CPU share of capacity reported each period.
    pub cpu_utilization: Decimal,
    pub net_utilization: Decimal,
    pub genesis_supply: TokenAmount,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            days: 30,
            oracles: 5,
            faulty_oracles: 0,
            threshold: 3,
            accounts: 8,
            batch_size: 10,
            period_seconds: 86_400,
            start_timestamp: 1_700_006_400,
            value_transfer_rate: Decimal::new(1, 1),
            max_pay_constant: Decimal::new(2947, 4),
            cpu_utilization: Decimal::new(1, 1),
            net_utilization: Decimal::new(5, 2),
            genesis_supply: TokenAmount::from_whole(1_000_000_000),
        }
    }
}

impl SimConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Environment overrides for logging and simulation, plus the
    /// resource settings' own `UTX_*` overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("UTX_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
        if let Ok(format) = env::var("UTX_LOG_FORMAT") {
            if !format.is_empty() {
                self.logging.format = format;
            }
        }
        if let Ok(days) = env::var("UTX_SIM_DAYS") {
            if let Ok(days) = days.parse() {
                self.simulation.days = days;
            }
        }
        if let Ok(oracles) = env::var("UTX_SIM_ORACLES") {
            if let Ok(oracles) = oracles.parse() {
                self.simulation.oracles = oracles;
            }
        }
        if let Ok(threshold) = env::var("UTX_SIM_THRESHOLD") {
            if let Ok(threshold) = threshold.parse() {
                self.simulation.threshold = threshold;
            }
        }
        if let Ok(accounts) = env::var("UTX_SIM_ACCOUNTS") {
            if let Ok(accounts) = accounts.parse() {
                self.simulation.accounts = accounts;
            }
        }
        self.resource.apply_env_overrides();
    }

    pub fn validate(&self) -> Result<()> {
        self.resource.validate()?;
        let sim = &self.simulation;
        ensure!(sim.oracles > 0, "at least one oracle is required");
        ensure!(
            sim.oracles <= self.resource.oracle_set_size,
            "{} oracles exceed the oracle set size {}",
            sim.oracles,
            self.resource.oracle_set_size
        );
        ensure!(sim.threshold > 0, "threshold must be > 0");
        ensure!(
            sim.oracles.saturating_sub(sim.faulty_oracles) >= usize::from(sim.threshold),
            "honest oracles ({}) cannot reach threshold {}",
            sim.oracles.saturating_sub(sim.faulty_oracles),
            sim.threshold
        );
        ensure!(sim.accounts > 0, "at least one account is required");
        ensure!(
            sim.cpu_utilization > Decimal::ZERO && sim.cpu_utilization <= Decimal::new(8, 1),
            "cpu_utilization must lie in (0, 0.8]"
        );
        ensure!(
            sim.net_utilization > Decimal::ZERO && sim.net_utilization <= Decimal::new(8, 1),
            "net_utilization must lie in (0, 0.8]"
        );
        Ok(())
    }
}
