//! Notifications published after a command commits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{AccountId, Amount, FlightKey, FlightStatus, Timestamp};

/// State change observed by listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuretyEvent {
    AirlineRegistered {
        airline: AccountId,
        name: String,
    },
    AirlineFunded {
        airline: AccountId,
        amount: Amount,
        balance: Amount,
    },
    FlightRegistered {
        flight: FlightKey,
    },
    InsuranceBought {
        passenger: AccountId,
        flight: FlightKey,
        amount: Amount,
    },
    InsureesCredited {
        flight: FlightKey,
        percentage: u32,
        policies: usize,
        total: Amount,
    },
    CompensationWithdrawn {
        passenger: AccountId,
        amount: Amount,
    },
    OracleRegistered {
        oracle: AccountId,
        indexes: Vec<u8>,
    },
    /// Reporters holding `index` should answer for `flight`.
    OracleRequest {
        index: u8,
        flight: FlightKey,
    },
    OracleReport {
        oracle: AccountId,
        index: u8,
        flight: FlightKey,
        status: FlightStatus,
    },
    /// Quorum reached; the flight's status is final for this request.
    FlightStatusInfo {
        index: u8,
        flight: FlightKey,
        status: FlightStatus,
        updated_at: Timestamp,
    },
}

/// Published form of an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// Position in the ledger's commit order
    pub sequence: u64,
    /// When the event was published
    pub emitted_at: DateTime<Utc>,
    /// The event itself
    pub event: SuretyEvent,
}

/// Fan-out of committed events. Publishing never blocks; a listener that
/// falls more than `capacity` events behind observes a lag on its receiver.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    sequence: u64,
}

impl EventBus {
    /// Create a bus with the given per-listener buffer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: 0,
        }
    }

    /// Register a new listener. It sees events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Number of events published so far.
    pub fn published(&self) -> u64 {
        self.sequence
    }

    /// Publish a batch of committed events in order.
    pub fn publish(&mut self, events: Vec<SuretyEvent>) {
        for event in events {
            let envelope = EventEnvelope {
                id: Uuid::new_v4(),
                sequence: self.sequence,
                emitted_at: Utc::now(),
                event,
            };
            self.sequence += 1;
            // No listeners is not an error.
            let _ = self.sender.send(envelope);
        }
    }
}
