//! Configuration for the surety ledger.

use serde::{Deserialize, Serialize};

use crate::types::{AccountId, Amount, SuretyError, UNIT};

/// Configuration for a surety ledger instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuretyConfig {
    /// Identities installed at construction
    #[serde(default)]
    pub genesis: GenesisConfig,
    /// Airline admission rules
    #[serde(default)]
    pub airlines: AirlineConfig,
    /// Insurance limits and payout ratio
    #[serde(default)]
    pub insurance: InsuranceConfig,
    /// Oracle quorum parameters
    #[serde(default)]
    pub oracles: OracleConfig,
    /// Notification bus settings
    #[serde(default)]
    pub events: EventConfig,
}

impl SuretyConfig {
    /// Load config from a TOML document.
    pub fn from_toml(toml_str: &str) -> Result<Self, SuretyError> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| SuretyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String, SuretyError> {
        toml::to_string_pretty(self).map_err(|e| SuretyError::Config(e.to_string()))
    }

    /// Reject parameter combinations the engine cannot honour.
    pub fn validate(&self) -> Result<(), SuretyError> {
        let o = &self.oracles;
        if o.indexes_per_oracle == 0 {
            return Err(SuretyError::Config("indexes_per_oracle must be positive".into()));
        }
        if o.index_range > 256 {
            return Err(SuretyError::Config(format!(
                "index_range {} exceeds 256",
                o.index_range
            )));
        }
        if o.index_range < o.indexes_per_oracle as u16 {
            return Err(SuretyError::Config(format!(
                "index_range {} cannot hold {} distinct indexes",
                o.index_range, o.indexes_per_oracle
            )));
        }
        if o.min_responses == 0 {
            return Err(SuretyError::Config("min_responses must be positive".into()));
        }
        if self.insurance.max_insurance_amount == 0 {
            return Err(SuretyError::Config("max_insurance_amount must be positive".into()));
        }
        if self.genesis.owner == self.genesis.engine_id {
            return Err(SuretyError::Config("owner and engine_id must differ".into()));
        }
        Ok(())
    }
}

/// Identities installed when the ledger is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Ledger owner
    #[serde(default = "default_owner")]
    pub owner: AccountId,
    /// Airline registered at construction
    #[serde(default = "default_first_airline")]
    pub first_airline: AccountId,
    /// Display name of the first airline
    #[serde(default = "default_first_airline_name")]
    pub first_airline_name: String,
    /// Identity the oracle engine uses for privileged calls
    #[serde(default = "default_engine_id")]
    pub engine_id: AccountId,
    /// Put the engine on the allow-list at construction
    #[serde(default = "default_true")]
    pub authorize_engine: bool,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            first_airline: default_first_airline(),
            first_airline_name: default_first_airline_name(),
            engine_id: default_engine_id(),
            authorize_engine: true,
        }
    }
}

fn default_owner() -> AccountId {
    AccountId::new("owner")
}
fn default_first_airline() -> AccountId {
    AccountId::new("airline-one")
}
fn default_first_airline_name() -> String {
    "Airline One".to_string()
}
fn default_engine_id() -> AccountId {
    AccountId::new("oracle-engine")
}
fn default_true() -> bool {
    true
}

/// Airline admission configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirlineConfig {
    /// Balance an airline needs before it may act
    #[serde(default = "default_minimum_funds")]
    pub minimum_funds: Amount,
    /// Registered count below which admission needs no votes
    #[serde(default = "default_admission_limit")]
    pub unconditional_admission_limit: usize,
}

impl Default for AirlineConfig {
    fn default() -> Self {
        Self {
            minimum_funds: default_minimum_funds(),
            unconditional_admission_limit: default_admission_limit(),
        }
    }
}

fn default_minimum_funds() -> Amount {
    10 * UNIT
}
fn default_admission_limit() -> usize {
    4
}

/// Insurance configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceConfig {
    /// Premium cap per policy
    #[serde(default = "default_max_insurance")]
    pub max_insurance_amount: Amount,
    /// Payout percentage applied when the airline is at fault
    #[serde(default = "default_payout_percent")]
    pub late_airline_payout_percent: u32,
}

impl Default for InsuranceConfig {
    fn default() -> Self {
        Self {
            max_insurance_amount: default_max_insurance(),
            late_airline_payout_percent: default_payout_percent(),
        }
    }
}

fn default_max_insurance() -> Amount {
    UNIT
}
fn default_payout_percent() -> u32 {
    150
}

/// Oracle consensus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Exact stake required to register
    #[serde(default = "default_registration_fee")]
    pub registration_fee: Amount,
    /// Distinct indexes assigned per oracle
    #[serde(default = "default_indexes_per_oracle")]
    pub indexes_per_oracle: u8,
    /// Indexes are drawn from `[0, index_range)`
    #[serde(default = "default_index_range")]
    pub index_range: u16,
    /// Matching responses needed to finalize a status
    #[serde(default = "default_min_responses")]
    pub min_responses: usize,
    /// Nonce wraps back to zero past this value
    #[serde(default = "default_nonce_reset")]
    pub nonce_reset: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            registration_fee: default_registration_fee(),
            indexes_per_oracle: default_indexes_per_oracle(),
            index_range: default_index_range(),
            min_responses: default_min_responses(),
            nonce_reset: default_nonce_reset(),
        }
    }
}

fn default_registration_fee() -> Amount {
    UNIT
}
fn default_indexes_per_oracle() -> u8 {
    3
}
fn default_index_range() -> u16 {
    10
}
fn default_min_responses() -> usize {
    3
}
fn default_nonce_reset() -> u64 {
    250
}

/// Notification bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Buffered notifications per subscriber before it lags
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    1024
}
