//! Deployment configuration loader.
//!
//! Layers (highest precedence last):
//!   1) Built-in defaults (serde defaults on every section)
//!   2) Config file (explicit path, or `crowdsale.toml` in the working dir)
//!   3) Environment variables (optionally via .env)
//!
//! Env prefix: `CROWDSALE__...`, nested fields separated by `__`:
//!   CROWDSALE__ROLES__OWNER=0x...
//!   CROWDSALE__TOKENOMICS__DECIMALS=18
//!   CROWDSALE__SCHEDULE__RATE_STAGE1=10
//!
//! A `[schedule]` section deploys with the schedule confirmed immediately;
//! without it the owner sets and confirms the schedule later.

use std::path::Path;

use config as cfg;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    crowdsale::{CrowdsaleError, Deployment, DEFAULT_BOUNTY_ADDRESS, DEFAULT_HOLDING_ADDRESS},
    schedule::{SaleSpec, Tokenomics},
    telemetry::LoggingConfig,
    Address, Timestamp,
};

const ENV_PREFIX: &str = "CROWDSALE";
const DEFAULT_FILE: &str = "crowdsale";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    pub roles: RolesConfig,
    pub tokenomics: Tokenomics,
    pub schedule: Option<ScheduleConfig>,
    pub telemetry: LoggingConfig,
}

/// Addresses fixed at deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    pub owner: Address,
    pub wallet: Address,
    pub bounty_admin: Address,
    pub holding: Address,
    pub bounty_address: Address,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            owner: Address::ZERO,
            wallet: Address::ZERO,
            bounty_admin: Address::ZERO,
            holding: DEFAULT_HOLDING_ADDRESS,
            bounty_address: DEFAULT_BOUNTY_ADDRESS,
        }
    }
}

/// Sale schedule as written in config files. Integers stay within u64 so
/// every config source can carry them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub stage1_start: Timestamp,
    pub stage2_start: Timestamp,
    pub stage3_start: Timestamp,
    pub sale_end: Timestamp,
    pub rate_stage1: u64,
    pub rate_stage2: u64,
    pub rate_stage3: u64,
    pub unlock_phase1: Timestamp,
    pub unlock_phase2: Timestamp,
    pub unlock_phase3: Timestamp,
    pub unlock_phase4: Timestamp,
}

impl From<ScheduleConfig> for SaleSpec {
    fn from(s: ScheduleConfig) -> Self {
        SaleSpec {
            stage1_start: s.stage1_start,
            stage2_start: s.stage2_start,
            stage3_start: s.stage3_start,
            sale_end: s.sale_end,
            rate_stage1: s.rate_stage1 as u128,
            rate_stage2: s.rate_stage2 as u128,
            rate_stage3: s.rate_stage3 as u128,
            unlock_phase1: s.unlock_phase1,
            unlock_phase2: s.unlock_phase2,
            unlock_phase3: s.unlock_phase3,
            unlock_phase4: s.unlock_phase4,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(#[from] cfg::ConfigError),
    #[error("path not found `{0}`")]
    PathNotFound(String),
    #[error("invalid deployment: {0}")]
    Invalid(#[from] CrowdsaleError),
}

impl DeploymentConfig {
    /// Validate and convert into engine deployment parameters.
    pub fn into_deployment(self) -> Result<Deployment, CrowdsaleError> {
        let d = Deployment {
            owner: self.roles.owner,
            wallet: self.roles.wallet,
            bounty_admin: self.roles.bounty_admin,
            holding: self.roles.holding,
            bounty_address: self.roles.bounty_address,
            tokenomics: self.tokenomics,
            spec: self.schedule.map(SaleSpec::from),
        };
        d.validate()?;
        Ok(d)
    }
}

/// Load configuration: defaults → file → environment.
pub fn load(explicit_file: Option<&Path>) -> Result<DeploymentConfig, ConfigError> {
    // .env is a developer convenience; absent is fine.
    let _ = dotenv();

    let mut builder = cfg::Config::builder();
    match explicit_file {
        Some(p) if p.exists() => builder = builder.add_source(cfg::File::from(p)),
        Some(p) => return Err(ConfigError::PathNotFound(p.display().to_string())),
        None => builder = builder.add_source(cfg::File::with_name(DEFAULT_FILE).required(false)),
    }
    builder = builder.add_source(cfg::Environment::with_prefix(ENV_PREFIX).separator("__"));

    Ok(builder.build()?.try_deserialize()?)
}

/// Load configuration and turn it into validated deployment parameters.
pub fn load_deployment(explicit_file: Option<&Path>) -> Result<Deployment, ConfigError> {
    Ok(load(explicit_file)?.into_deployment()?)
}

/// Parse a TOML document on top of the defaults. Environment is not consulted.
pub fn from_toml_str(toml: &str) -> Result<DeploymentConfig, ConfigError> {
    let built = cfg::Config::builder()
        .add_source(cfg::File::from_str(toml, cfg::FileFormat::Toml))
        .build()?;
    Ok(built.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [roles]
        owner = "0x0101010101010101010101010101010101010101"
        wallet = "0x0202020202020202020202020202020202020202"
        bounty_admin = "0x0303030303030303030303030303030303030303"

        [tokenomics]
        max_supply_tokens = 10000
        decimals = 0

        [schedule]
        stage1_start = 1700000100
        stage2_start = 1700000200
        stage3_start = 1700000300
        sale_end = 1700000400
        rate_stage1 = 10
        rate_stage2 = 20
        rate_stage3 = 40
        unlock_phase1 = 1700001000
        unlock_phase2 = 1700002000
        unlock_phase3 = 1700003000
        unlock_phase4 = 1700004000

        [telemetry]
        json = false
        env_filter = "crowdsale=debug"
    "#;

    #[test]
    fn full_file_yields_immediate_deployment() {
        let cfg = from_toml_str(FULL).unwrap();
        assert_eq!(cfg.tokenomics.max_supply_tokens, 10_000);
        // untouched fields keep defaults
        assert_eq!(cfg.tokenomics.total_bps, 7_500);
        assert!(!cfg.telemetry.json);
        assert_eq!(cfg.telemetry.env_filter.as_deref(), Some("crowdsale=debug"));

        let d = cfg.into_deployment().unwrap();
        assert_eq!(d.owner, Address([1; 20]));
        assert_eq!(d.holding, DEFAULT_HOLDING_ADDRESS);
        let spec = d.spec.unwrap();
        assert_eq!(spec.rate_stage3, 40);
        assert_eq!(spec.unlock_phase4, 1_700_004_000);
    }

    #[test]
    fn missing_schedule_means_deferred() {
        let without: String = FULL.split("[schedule]").next().unwrap_or_default().to_string();
        let d = from_toml_str(&without).unwrap().into_deployment().unwrap();
        assert!(d.spec.is_none());
    }

    #[test]
    fn defaults_alone_are_rejected_for_missing_roles() {
        let err = DeploymentConfig::default().into_deployment().unwrap_err();
        assert_eq!(err, CrowdsaleError::ZeroAddress);
    }

    #[test]
    fn bad_address_fails_to_parse() {
        let doc = r#"
            [roles]
            owner = "0x1234"
        "#;
        assert!(matches!(from_toml_str(doc), Err(ConfigError::Build(_))));
    }

    #[test]
    fn invalid_schedule_fails_conversion() {
        let broken = FULL.replace("rate_stage2 = 20", "rate_stage2 = 5");
        let err = from_toml_str(&broken).unwrap().into_deployment().unwrap_err();
        assert!(matches!(err, CrowdsaleError::Spec(_)));
    }

    #[test]
    fn environment_overrides_file() {
        let dir = std::env::temp_dir().join(format!("crowdsale-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("deploy.toml");
        std::fs::write(&path, FULL).unwrap();

        std::env::set_var("CROWDSALE__TOKENOMICS__DECIMALS", "6");
        let cfg = load(Some(&path)).unwrap();
        std::env::remove_var("CROWDSALE__TOKENOMICS__DECIMALS");

        assert_eq!(cfg.tokenomics.decimals, 6);
        assert_eq!(cfg.tokenomics.max_supply_tokens, 10_000);

        assert!(matches!(load(Some(&dir.join("missing.toml"))), Err(ConfigError::PathNotFound(_))));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_deployment_reports_invalid_parameters() {
        let dir = std::env::temp_dir().join(format!("crowdsale-deploy-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let good = dir.join("good.toml");
        std::fs::write(&good, FULL).unwrap();
        let d = load_deployment(Some(&good)).unwrap();
        assert_eq!(d.wallet, Address([2; 20]));
        assert!(d.spec.is_some());

        let bad = dir.join("bad.toml");
        let early_end = FULL.replace("sale_end = 1700000400", "sale_end = 1700000250");
        std::fs::write(&bad, early_end).unwrap();
        let err = load_deployment(Some(&bad)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(CrowdsaleError::Spec(_))));
        assert!(err.to_string().starts_with("invalid deployment"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
