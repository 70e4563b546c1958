use crate::error::{ResourceError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use utx_economics::TokenAmount;
use utx_types::AccountName;

/// Per-deployment reporting parameters, set by the system account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodConfig {
    pub period_seconds: u32,
    pub period_start: DateTime<Utc>,
    pub quorum_threshold: u16,
    pub batch_size: u16,
    pub value_transfer_rate: Decimal,
    pub max_pay_constant: Decimal,
    pub ema_drag_limit: u32,
    pub active: bool,
}

impl PeriodConfig {
    pub fn period_end(&self) -> DateTime<Utc> {
        self.period_start + Duration::seconds(i64::from(self.period_seconds))
    }

    pub fn validate(&self) -> Result<()> {
        if self.period_seconds == 0 {
            return Err(ResourceError::InvalidConfig("period_seconds must be > 0".into()));
        }
        if self.quorum_threshold == 0 {
            return Err(ResourceError::InvalidConfig("quorum_threshold must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(ResourceError::InvalidConfig("batch_size must be > 0".into()));
        }
        if self.ema_drag_limit == 0 {
            return Err(ResourceError::InvalidConfig("ema_drag_limit must be > 0".into()));
        }
        if self.value_transfer_rate.is_sign_negative() || self.max_pay_constant.is_sign_negative() {
            return Err(ResourceError::InvalidConfig(
                "value_transfer_rate and max_pay_constant must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Host chain block limits used to derive per-period capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLimits {
    pub max_block_cpu_usage_us: u64,
    pub max_block_net_usage_bytes: u64,
    pub blocks_per_second: u64,
}

impl Default for ChainLimits {
    fn default() -> Self {
        Self {
            max_block_cpu_usage_us: 200_000,
            max_block_net_usage_bytes: 1_048_576,
            blocks_per_second: 2,
        }
    }
}

impl ChainLimits {
    /// CPU microseconds available over a period window.
    pub fn cpu_capacity(&self, period_seconds: u32) -> u64 {
        self.max_block_cpu_usage_us
            .saturating_mul(self.blocks_per_second)
            .saturating_mul(u64::from(period_seconds))
    }

    /// NET bytes available over a period window.
    pub fn net_capacity(&self, period_seconds: u32) -> u64 {
        self.max_block_net_usage_bytes
            .saturating_mul(self.blocks_per_second)
            .saturating_mul(u64::from(period_seconds))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSettings {
    /// Privileged account; also the token issuer.
    pub system_account: AccountName,
    /// Pool holding operator pay until claimed.
    pub operator_pay_account: AccountName,
    /// Pool holding usage pay until claimed.
    pub usage_pay_account: AccountName,
    pub oracle_set_size: usize,
    pub usage_floor: Decimal,
    pub inflation_day_cap: u64,
    pub max_period_issuance: TokenAmount,
    pub ema_drag_limit: u32,
    pub chain: ChainLimits,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            system_account: AccountName::from_static("utxio"),
            operator_pay_account: AccountName::from_static("utxio.bpay"),
            usage_pay_account: AccountName::from_static("utxio.upay"),
            oracle_set_size: 21,
            usage_floor: Decimal::new(1, 2),
            inflation_day_cap: 1096,
            max_period_issuance: TokenAmount::from_whole(1_000_000),
            ema_drag_limit: 2,
            chain: ChainLimits::default(),
        }
    }
}

impl ResourceSettings {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        Ok(settings)
    }

    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `UTX_*` environment variable overrides. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(account) = env::var("UTX_SYSTEM_ACCOUNT") {
            if let Ok(account) = account.parse() {
                self.system_account = account;
            }
        }
        if let Ok(size) = env::var("UTX_ORACLE_SET_SIZE") {
            if let Ok(size) = size.parse() {
                self.oracle_set_size = size;
            }
        }
        if let Ok(cpu) = env::var("UTX_MAX_BLOCK_CPU_US") {
            if let Ok(cpu) = cpu.parse() {
                self.chain.max_block_cpu_usage_us = cpu;
            }
        }
        if let Ok(net) = env::var("UTX_MAX_BLOCK_NET_BYTES") {
            if let Ok(net) = net.parse() {
                self.chain.max_block_net_usage_bytes = net;
            }
        }
        if let Ok(cap) = env::var("UTX_INFLATION_DAY_CAP") {
            if let Ok(cap) = cap.parse() {
                self.inflation_day_cap = cap;
            }
        }
        if let Ok(ceiling) = env::var("UTX_MAX_PERIOD_ISSUANCE") {
            if let Ok(ceiling) = ceiling.parse() {
                self.max_period_issuance = ceiling;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.oracle_set_size == 0 {
            return Err(ResourceError::InvalidConfig("oracle_set_size must be > 0".into()));
        }
        if self.usage_floor <= Decimal::ZERO || self.usage_floor >= Decimal::new(5, 1) {
            return Err(ResourceError::InvalidConfig(
                "usage_floor must lie in (0, 0.5)".into(),
            ));
        }
        if self.ema_drag_limit == 0 {
            return Err(ResourceError::InvalidConfig("ema_drag_limit must be > 0".into()));
        }
        if self.chain.cpu_capacity(1) == 0 || self.chain.net_capacity(1) == 0 {
            return Err(ResourceError::InvalidConfig("chain limits must be > 0".into()));
        }
        let accounts = [
            &self.system_account,
            &self.operator_pay_account,
            &self.usage_pay_account,
        ];
        if accounts[0] == accounts[1] || accounts[0] == accounts[2] || accounts[1] == accounts[2] {
            return Err(ResourceError::InvalidConfig(
                "system, operator pay and usage pay accounts must differ".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_for_one_day() {
        let limits = ChainLimits::default();
        assert_eq!(limits.cpu_capacity(86_400), 200_000 * 2 * 86_400);
        assert_eq!(limits.net_capacity(86_400), 1_048_576 * 2 * 86_400);
    }

    #[test]
    fn test_defaults_validate() {
        assert!(ResourceSettings::default().validate().is_ok());

        let mut bad = ResourceSettings::default();
        bad.usage_pay_account = bad.system_account.clone();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_period_config_validation() {
        let mut config = PeriodConfig {
            period_seconds: 86_400,
            period_start: DateTime::<Utc>::from_timestamp(1_600_000_000, 0).unwrap(),
            quorum_threshold: 2,
            batch_size: 10,
            value_transfer_rate: Decimal::new(1, 1),
            max_pay_constant: Decimal::new(2947, 4),
            ema_drag_limit: 2,
            active: false,
        };
        assert!(config.validate().is_ok());
        assert_eq!(
            config.period_end().timestamp(),
            1_600_000_000 + 86_400
        );

        config.batch_size = 0;
        assert!(matches!(config.validate(), Err(ResourceError::InvalidConfig(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resource.toml");

        let mut settings = ResourceSettings::default();
        settings.oracle_set_size = 5;
        settings.save_to_file(&path).unwrap();

        let loaded = ResourceSettings::from_file(&path).unwrap();
        assert_eq!(loaded.oracle_set_size, 5);
        assert_eq!(loaded.usage_floor, settings.usage_floor);
        assert_eq!(loaded.max_period_issuance, settings.max_period_issuance);
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("UTX_ORACLE_SET_SIZE", "7");
        env::set_var("UTX_MAX_BLOCK_CPU_US", "150000");
        env::set_var("UTX_INFLATION_DAY_CAP", "30");
        env::set_var("UTX_SYSTEM_ACCOUNT", "NOT VALID");

        let mut settings = ResourceSettings::default();
        settings.apply_env_overrides();

        assert_eq!(settings.oracle_set_size, 7);
        assert_eq!(settings.chain.max_block_cpu_usage_us, 150_000);
        assert_eq!(settings.inflation_day_cap, 30);
        assert_eq!(settings.system_account.as_str(), "utxio");

        env::remove_var("UTX_ORACLE_SET_SIZE");
        env::remove_var("UTX_MAX_BLOCK_CPU_US");
        env::remove_var("UTX_INFLATION_DAY_CAP");
        env::remove_var("UTX_SYSTEM_ACCOUNT");
    }
}
