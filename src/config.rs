//! `eac.toml` configuration.
//!
//! ```toml
//! year = 2025
//! project = "P-100"
//! data_dir = "data"
//! revenue_source = "policy"   # or "rows"
//!
//! [scenario]
//! delay_months = 1
//! revenue_pct_delta = -5.0
//! cost_pct_delta = 3.0
//! overhead_addition = 1500.0
//!
//! [output]
//! csv = "projection.csv"
//! json = "projection.json"
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{EacError, Result};
use crate::scenario::Scenario;

pub const DEFAULT_CONFIG_FILE: &str = "eac.toml";

/// Where monthly revenue comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RevenueSource {
    /// Recognize revenue from cost with the project's revenue policy.
    #[default]
    Policy,
    /// Use recorded revenue rows as they are.
    Rows,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    pub delay_months: i64,
    pub revenue_pct_delta: f64,
    pub cost_pct_delta: f64,
    pub overhead_addition: f64,
}

impl ScenarioConfig {
    pub fn to_scenario(&self) -> Result<Scenario> {
        Scenario::from_inputs(
            self.delay_months,
            self.revenue_pct_delta,
            self.cost_pct_delta,
            self.overhead_addition,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub csv: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EacConfig {
    pub year: Option<i32>,
    pub project: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub revenue_source: Option<RevenueSource>,
    pub scenario: Option<ScenarioConfig>,
    pub output: OutputConfig,
}

/// Parse configuration from TOML text.
pub fn parse_config(contents: &str) -> Result<EacConfig> {
    let config: EacConfig = toml::from_str(contents)
        .map_err(|e| EacError::Config(format!("failed to parse config: {e}")))?;
    if let Some(scenario) = &config.scenario {
        scenario.to_scenario()?;
    }
    Ok(config)
}

/// Load configuration.
///
/// An explicitly named file must exist and parse. Without one, `eac.toml` in
/// the working directory is used if present; if it is missing or invalid the
/// defaults apply.
pub fn load_config(explicit: Option<&Path>) -> Result<EacConfig> {
    if let Some(path) = explicit {
        let contents = fs::read_to_string(path).map_err(|e| {
            EacError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = parse_config(&contents)?;
        log::debug!("loaded config from {}", path.display());
        return Ok(config);
    }

    let path = Path::new(DEFAULT_CONFIG_FILE);
    match fs::read_to_string(path) {
        Ok(contents) => match parse_config(&contents) {
            Ok(config) => {
                log::debug!("loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) => {
                log::warn!("{}: {e}. Using defaults.", path.display());
                Ok(EacConfig::default())
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
            Ok(EacConfig::default())
        }
        Err(e) => {
            log::warn!("failed to read {}: {e}. Using defaults.", path.display());
            Ok(EacConfig::default())
        }
    }
}
