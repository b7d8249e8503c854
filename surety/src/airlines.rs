//! Airline admission and escrow balances.
//!
//! The first `unconditional_admission_limit` airlines are admitted on the
//! word of any registered, funded sponsor. Past that limit a candidate needs
//! distinct sponsor votes until `votes * 2 >= registered_count`.

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::config::AirlineConfig;
use crate::types::{precondition, unauthorized, AccountId, Amount, Result};

/// An airline record, registered or pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Airline {
    pub id: AccountId,
    pub name: String,
    pub registered: bool,
    /// Escrow backing the airline's policies
    pub funds: Amount,
    /// Sponsors that voted for admission; cleared once admitted
    pub votes: BTreeSet<AccountId>,
}

impl Airline {
    fn new(id: AccountId) -> Self {
        Self {
            id,
            name: String::new(),
            registered: false,
            funds: 0,
            votes: BTreeSet::new(),
        }
    }
}

/// Result of a `register` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Candidate is now registered
    Registered,
    /// Vote counted, candidate still pending
    VoteRecorded {
        votes: usize,
        registered_count: usize,
    },
    /// Candidate was registered before this call
    AlreadyRegistered,
}

#[derive(Debug, Clone)]
pub struct AirlineRegistry {
    airlines: HashMap<AccountId, Airline>,
    /// Registered airlines in admission order
    registered: Vec<AccountId>,
    minimum_funds: Amount,
    admission_limit: usize,
}

impl AirlineRegistry {
    pub fn new(config: &AirlineConfig) -> Self {
        Self {
            airlines: HashMap::new(),
            registered: Vec::new(),
            minimum_funds: config.minimum_funds,
            admission_limit: config.unconditional_admission_limit,
        }
    }

    /// Register an airline without sponsorship. Used for the genesis airline.
    pub fn seed(&mut self, id: AccountId, name: impl Into<String>) {
        let airline = self
            .airlines
            .entry(id.clone())
            .or_insert_with(|| Airline::new(id.clone()));
        airline.name = name.into();
        if !airline.registered {
            airline.registered = true;
            airline.votes.clear();
            self.registered.push(id);
        }
    }

    /// Sponsor `candidate` for admission.
    pub fn register(
        &mut self,
        candidate: &AccountId,
        name: &str,
        sponsor: &AccountId,
    ) -> Result<Admission> {
        if !self.is_registered(sponsor) {
            return Err(unauthorized(format!("sponsor {} is not a registered airline", sponsor)));
        }
        if !self.is_funded(sponsor) {
            return Err(precondition(format!(
                "sponsor {} has not provided the minimum funds",
                sponsor
            )));
        }
        if self.is_registered(candidate) {
            return Ok(Admission::AlreadyRegistered);
        }

        let registered_count = self.registered.len();
        let airline = self
            .airlines
            .entry(candidate.clone())
            .or_insert_with(|| Airline::new(candidate.clone()));
        if airline.name.is_empty() {
            airline.name = name.to_string();
        }

        if registered_count < self.admission_limit {
            airline.registered = true;
            airline.votes.clear();
            self.registered.push(candidate.clone());
            return Ok(Admission::Registered);
        }

        if !airline.votes.insert(sponsor.clone()) {
            return Err(precondition(format!(
                "{} already voted for {}",
                sponsor, candidate
            )));
        }
        let votes = airline.votes.len();
        debug!(
            candidate = %candidate,
            sponsor = %sponsor,
            votes,
            registered_count,
            "Admission vote recorded"
        );

        if votes * 2 >= registered_count {
            airline.registered = true;
            airline.votes.clear();
            self.registered.push(candidate.clone());
            Ok(Admission::Registered)
        } else {
            Ok(Admission::VoteRecorded {
                votes,
                registered_count,
            })
        }
    }

    /// Add to an airline's escrow, creating the record if needed.
    pub fn fund(&mut self, id: &AccountId, amount: Amount) -> Result<Amount> {
        let airline = self
            .airlines
            .entry(id.clone())
            .or_insert_with(|| Airline::new(id.clone()));
        airline.funds = airline
            .funds
            .checked_add(amount)
            .ok_or_else(|| precondition(format!("funds overflow for {}", id)))?;
        Ok(airline.funds)
    }

    /// Take `amount` out of an airline's escrow.
    pub fn debit(&mut self, id: &AccountId, amount: Amount) -> Result<Amount> {
        let airline = self
            .airlines
            .get_mut(id)
            .ok_or_else(|| precondition(format!("{} holds no funds", id)))?;
        let held = airline.funds;
        airline.funds = held.checked_sub(amount).ok_or_else(|| {
            precondition(format!("{} holds {} but {} is owed", id, held, amount))
        })?;
        Ok(airline.funds)
    }

    pub fn is_registered(&self, id: &AccountId) -> bool {
        self.airlines.get(id).is_some_and(|a| a.registered)
    }

    pub fn is_funded(&self, id: &AccountId) -> bool {
        self.funds(id) >= self.minimum_funds
    }

    /// Escrow balance; zero for unknown airlines.
    pub fn funds(&self, id: &AccountId) -> Amount {
        self.airlines.get(id).map(|a| a.funds).unwrap_or(0)
    }

    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    pub fn get(&self, id: &AccountId) -> Option<&Airline> {
        self.airlines.get(id)
    }

    /// Registered airlines in admission order.
    pub fn registered(&self) -> impl Iterator<Item = &Airline> {
        self.registered.iter().filter_map(|id| self.airlines.get(id))
    }

    /// Votes collected by a pending candidate.
    pub fn pending_votes(&self, candidate: &AccountId) -> usize {
        self.airlines.get(candidate).map(|a| a.votes.len()).unwrap_or(0)
    }

    pub fn minimum_funds(&self) -> Amount {
        self.minimum_funds
    }
}
