//! Surety - flight-delay insurance ledger.
//!
//! Airlines are admitted by their peers, register flights and underwrite
//! passenger policies from their own escrow. Flight status is resolved by a
//! quorum of independent oracles; when a delay is the airline's fault the
//! affected passengers are credited automatically.
//!
//! - **Access gate**: operational switch plus an owner-managed allow-list
//! - **Airline registry**: unconditional admission for the first few airlines,
//!   peer voting afterwards
//! - **Flight registry**: flights keyed by airline, code and departure
//! - **Insurance ledger**: premiums, credit rounds, passenger withdrawals
//! - **Oracle engine**: index assignment and first-to-quorum status resolution
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      SuretyLedger                        │
//! │  ┌────────────────────── Store ───────────────────────┐  │
//! │  │ AccessGate │ Airlines │ Flights │ Insurance │ Oracles│ │
//! │  └────────────────────────────────────────────────────┘  │
//! │        │ commit                        │ transfer         │
//! │   ┌────▼─────┐                    ┌────▼────┐            │
//! │   │ EventBus │                    │ Payout  │            │
//! │   └──────────┘                    └─────────┘            │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod access;
pub mod airlines;
pub mod clock;
pub mod config;
pub mod events;
pub mod flights;
pub mod insurance;
pub mod ledger;
pub mod oracles;
pub mod payout;
pub mod random;
pub mod store;
pub mod types;

// Re-export main types
pub use airlines::Admission;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SuretyConfig;
pub use events::{EventEnvelope, SuretyEvent};
pub use flights::FlightPlan;
pub use ledger::SuretyLedger;
pub use oracles::ResponseOutcome;
pub use payout::{InMemoryWallet, Payout, TransferError};
pub use random::{CyclingIndexGenerator, EntropyIndexGenerator, IndexGenerator};
pub use types::*;
