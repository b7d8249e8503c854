//! Core types for the surety ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Amount in the smallest currency unit.
pub type Amount = u64;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Smallest units per whole currency unit.
pub const UNIT: Amount = 1_000_000_000;

/// Caller identity (airline, passenger, oracle, owner or engine).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Create a new account id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identity.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Composite key of a scheduled flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlightKey {
    /// Operating airline
    pub airline: AccountId,
    /// Flight code, e.g. `AD4061`
    pub code: String,
    /// Scheduled departure
    pub departure: Timestamp,
}

impl FlightKey {
    /// Create a new flight key.
    pub fn new(airline: impl Into<AccountId>, code: impl Into<String>, departure: Timestamp) -> Self {
        Self {
            airline: airline.into(),
            code: code.into(),
            departure,
        }
    }
}

impl fmt::Display for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.airline, self.code, self.departure)
    }
}

/// Reported status of a flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightStatus {
    /// No quorum reached yet
    #[default]
    Unknown,
    /// Departed on schedule
    OnTime,
    /// Delayed, airline at fault
    LateAirline,
    /// Delayed by weather
    LateWeather,
    /// Delayed by a technical problem
    LateTechnical,
    /// Delayed for any other reason
    LateOther,
}

impl FlightStatus {
    /// All status codes in ascending order.
    pub const ALL: [FlightStatus; 6] = [
        FlightStatus::Unknown,
        FlightStatus::OnTime,
        FlightStatus::LateAirline,
        FlightStatus::LateWeather,
        FlightStatus::LateTechnical,
        FlightStatus::LateOther,
    ];

    /// Numeric wire code.
    pub fn code(&self) -> u8 {
        match self {
            FlightStatus::Unknown => 0,
            FlightStatus::OnTime => 10,
            FlightStatus::LateAirline => 20,
            FlightStatus::LateWeather => 30,
            FlightStatus::LateTechnical => 40,
            FlightStatus::LateOther => 50,
        }
    }

    /// Parse a numeric wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Human readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightStatus::Unknown => "unknown",
            FlightStatus::OnTime => "on_time",
            FlightStatus::LateAirline => "late_airline",
            FlightStatus::LateWeather => "late_weather",
            FlightStatus::LateTechnical => "late_technical",
            FlightStatus::LateOther => "late_other",
        }
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types for the surety ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuretyError {
    /// Operational gate is closed
    #[error("Ledger is not operational")]
    NotOperational,

    /// Wrong caller identity or role
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Business rule violated
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Referenced record absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Payout could not be delivered after the balance was debited
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SuretyError>;

pub(crate) fn precondition(msg: impl Into<String>) -> SuretyError {
    SuretyError::PreconditionFailed(msg.into())
}

pub(crate) fn unauthorized(msg: impl Into<String>) -> SuretyError {
    SuretyError::Unauthorized(msg.into())
}

pub(crate) fn not_found(msg: impl Into<String>) -> SuretyError {
    SuretyError::NotFound(msg.into())
}
