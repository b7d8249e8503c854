//! Node configuration

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

use surety::{Amount, SuretyConfig, UNIT};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Ledger parameters
    #[serde(default)]
    pub ledger: SuretyConfig,

    /// Reporter simulation
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl NodeConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.ledger.validate()?;
        let sim = &self.simulation;
        if !(0.0..=1.0).contains(&sim.late_airline_probability) {
            anyhow::bail!(
                "late_airline_probability {} is outside [0, 1]",
                sim.late_airline_probability
            );
        }
        if sim.premium == 0 || sim.premium > self.ledger.insurance.max_insurance_amount {
            anyhow::bail!(
                "premium {} must be positive and at most {}",
                sim.premium,
                self.ledger.insurance.max_insurance_amount
            );
        }
        Ok(())
    }
}

/// Reporter simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Reporting agents to register
    #[serde(default = "default_oracles")]
    pub oracles: usize,

    /// Flights operated by the genesis airline
    #[serde(default = "default_flights")]
    pub flights: usize,

    /// Passengers insuring every flight
    #[serde(default = "default_passengers")]
    pub passengers: usize,

    /// Premium each passenger pays per flight
    #[serde(default = "default_premium")]
    pub premium: Amount,

    /// Chance a reporter blames the airline
    #[serde(default = "default_late_airline_probability")]
    pub late_airline_probability: f64,

    /// Status requests per flight before giving up
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    /// How long to wait for quorum on one request
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Hex entropy seed for index draws; random when unset
    #[serde(default)]
    pub entropy_seed: Option<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            oracles: default_oracles(),
            flights: default_flights(),
            passengers: default_passengers(),
            premium: default_premium(),
            late_airline_probability: default_late_airline_probability(),
            max_requests: default_max_requests(),
            response_timeout_ms: default_response_timeout_ms(),
            entropy_seed: None,
        }
    }
}

fn default_oracles() -> usize { 20 }
fn default_flights() -> usize { 3 }
fn default_passengers() -> usize { 4 }
fn default_premium() -> Amount { UNIT / 2 }
fn default_late_airline_probability() -> f64 { 0.5 }
fn default_max_requests() -> usize { 10 }
fn default_response_timeout_ms() -> u64 { 250 }
