//! Catalogue of scheduled flights.

use std::collections::HashMap;

use crate::airlines::AirlineRegistry;
use crate::types::{
    not_found, precondition, unauthorized, AccountId, FlightKey, FlightStatus, Result, Timestamp,
};

/// A scheduled flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flight {
    pub key: FlightKey,
    pub arrival: Timestamp,
    pub origin: String,
    pub destination: String,
    pub status: FlightStatus,
    /// Registration time, then the time of the last finalized status
    pub updated_at: Timestamp,
}

/// Details supplied when registering a flight.
#[derive(Debug, Clone)]
pub struct FlightPlan {
    pub code: String,
    pub departure: Timestamp,
    pub arrival: Timestamp,
    pub origin: String,
    pub destination: String,
}

impl FlightPlan {
    pub fn new(
        code: impl Into<String>,
        departure: Timestamp,
        arrival: Timestamp,
        origin: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            departure,
            arrival,
            origin: origin.into(),
            destination: destination.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlightRegistry {
    flights: HashMap<FlightKey, Flight>,
    order: Vec<FlightKey>,
}

impl FlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flight on behalf of `plan`'s airline.
    pub fn register(
        &mut self,
        airlines: &AirlineRegistry,
        airline: &AccountId,
        plan: FlightPlan,
        now: Timestamp,
    ) -> Result<FlightKey> {
        if !airlines.is_registered(airline) {
            return Err(unauthorized(format!("{} is not a registered airline", airline)));
        }
        if !airlines.is_funded(airline) {
            return Err(precondition(format!(
                "{} has not provided the minimum funds",
                airline
            )));
        }
        if plan.departure <= now {
            return Err(precondition(format!(
                "departure {} is not after current time {}",
                plan.departure, now
            )));
        }

        let key = FlightKey::new(airline.clone(), plan.code, plan.departure);
        if self.flights.contains_key(&key) {
            return Err(precondition(format!("flight {} already registered", key)));
        }

        self.flights.insert(
            key.clone(),
            Flight {
                key: key.clone(),
                arrival: plan.arrival,
                origin: plan.origin,
                destination: plan.destination,
                status: FlightStatus::Unknown,
                updated_at: now,
            },
        );
        self.order.push(key.clone());
        Ok(key)
    }

    pub fn get(&self, key: &FlightKey) -> Option<&Flight> {
        self.flights.get(key)
    }

    pub fn require(&self, key: &FlightKey) -> Result<&Flight> {
        self.flights
            .get(key)
            .ok_or_else(|| not_found(format!("flight {}", key)))
    }

    /// Status and time of its last update.
    pub fn status_info(&self, key: &FlightKey) -> Result<(FlightStatus, Timestamp)> {
        self.require(key).map(|f| (f.status, f.updated_at))
    }

    pub fn set_status(&mut self, key: &FlightKey, status: FlightStatus, now: Timestamp) -> Result<()> {
        let flight = self
            .flights
            .get_mut(key)
            .ok_or_else(|| not_found(format!("flight {}", key)))?;
        flight.status = status;
        flight.updated_at = now;
        Ok(())
    }

    /// Flights in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Flight> {
        self.order.iter().filter_map(|k| self.flights.get(k))
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}
