//! surety-node: reporter simulation for the flight surety ledger
//!
//! Runs a ledger in-process together with a population of simulated oracle
//! reporters that answer status requests concurrently.

pub mod config;
pub mod simulation;

pub use config::{NodeConfig, SimulationConfig};
pub use simulation::{run, FlightOutcome, SimulationReport};
