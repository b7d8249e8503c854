//! Oracle registry and status quorum.
//!
//! Each oracle holds a handful of distinct indexes. A status request is routed
//! to one index; only oracles holding it may answer, and the first status to
//! collect `min_responses` distinct reporters is final for that request.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::config::OracleConfig;
use crate::flights::FlightRegistry;
use crate::random::IndexGenerator;
use crate::types::{
    not_found, precondition, unauthorized, AccountId, Amount, FlightKey, FlightStatus, Result,
    Timestamp,
};

/// Redraws tolerated per index before probing for a free slot.
const MAX_REDRAWS: usize = 16;

/// A registered reporting agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Oracle {
    pub id: AccountId,
    pub indexes: Vec<u8>,
    pub stake: Amount,
    pub registered_at: Timestamp,
}

/// Identifies an open status request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub index: u8,
    pub flight: FlightKey,
}

/// Tally of an unresolved request.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    /// Last caller that opened or refreshed the request
    pub requester: AccountId,
    pub opened_at: Timestamp,
    /// Reporters per status in arrival order
    pub responses: BTreeMap<FlightStatus, Vec<AccountId>>,
}

impl OpenRequest {
    fn has_responded(&self, oracle: &AccountId) -> bool {
        self.responses.values().any(|r| r.contains(oracle))
    }
}

/// Result of an accepted response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Counted; quorum not yet reached for `status`
    Recorded { status: FlightStatus, count: usize },
    /// `status` reached quorum and the request is closed
    Finalized { status: FlightStatus },
}

impl ResponseOutcome {
    pub fn is_final(&self) -> bool {
        matches!(self, ResponseOutcome::Finalized { .. })
    }
}

#[derive(Debug, Clone)]
pub struct OracleEngine {
    oracles: HashMap<AccountId, Oracle>,
    requests: HashMap<RequestKey, OpenRequest>,
    nonce: u64,
    config: OracleConfig,
}

impl OracleEngine {
    pub fn new(config: OracleConfig) -> Self {
        Self {
            oracles: HashMap::new(),
            requests: HashMap::new(),
            nonce: 0,
            config,
        }
    }

    /// Register `caller` against its stake and assign its indexes.
    pub fn register(
        &mut self,
        generator: &dyn IndexGenerator,
        caller: &AccountId,
        stake: Amount,
        now: Timestamp,
    ) -> Result<Vec<u8>> {
        if stake != self.config.registration_fee {
            return Err(precondition(format!(
                "registration requires a stake of exactly {}, got {}",
                self.config.registration_fee, stake
            )));
        }
        if self.oracles.contains_key(caller) {
            return Err(precondition(format!("oracle {} already registered", caller)));
        }

        let indexes = self.assign_indexes(generator, caller);
        self.oracles.insert(
            caller.clone(),
            Oracle {
                id: caller.clone(),
                indexes: indexes.clone(),
                stake,
                registered_at: now,
            },
        );
        Ok(indexes)
    }

    /// Indexes held by a registered oracle.
    pub fn indexes_of(&self, oracle: &AccountId) -> Result<&[u8]> {
        self.oracles
            .get(oracle)
            .map(|o| o.indexes.as_slice())
            .ok_or_else(|| not_found(format!("oracle {}", oracle)))
    }

    pub fn is_registered(&self, oracle: &AccountId) -> bool {
        self.oracles.contains_key(oracle)
    }

    pub fn oracle_count(&self) -> usize {
        self.oracles.len()
    }

    /// Open a request for `key`, or refresh it if already open. Returns the
    /// index reporters should answer on.
    pub fn open_request(
        &mut self,
        generator: &dyn IndexGenerator,
        flights: &FlightRegistry,
        caller: &AccountId,
        key: &FlightKey,
        now: Timestamp,
    ) -> Result<u8> {
        flights.require(key)?;
        let index = self.next_index(generator, caller);
        let request_key = RequestKey {
            index,
            flight: key.clone(),
        };
        match self.requests.get_mut(&request_key) {
            Some(open) => {
                open.requester = caller.clone();
                debug!(index, flight = %key, "Refreshed open oracle request");
            }
            None => {
                self.requests.insert(
                    request_key,
                    OpenRequest {
                        requester: caller.clone(),
                        opened_at: now,
                        responses: BTreeMap::new(),
                    },
                );
                debug!(index, flight = %key, "Opened oracle request");
            }
        }
        Ok(index)
    }

    /// Count one oracle's answer to an open request.
    pub fn submit(
        &mut self,
        caller: &AccountId,
        index: u8,
        key: &FlightKey,
        status: FlightStatus,
    ) -> Result<ResponseOutcome> {
        let holds_index = self
            .oracles
            .get(caller)
            .is_some_and(|o| o.indexes.contains(&index));
        if !holds_index {
            return Err(unauthorized(format!(
                "{} is not a registered oracle holding index {}",
                caller, index
            )));
        }

        let request_key = RequestKey {
            index,
            flight: key.clone(),
        };
        let open = self.requests.get_mut(&request_key).ok_or_else(|| {
            precondition(format!("no open request for {} on index {}", key, index))
        })?;
        if open.has_responded(caller) {
            return Err(precondition(format!(
                "{} already responded to {} on index {}",
                caller, key, index
            )));
        }

        let reporters = open.responses.entry(status).or_default();
        reporters.push(caller.clone());
        let count = reporters.len();
        debug!(oracle = %caller, index, flight = %key, %status, count, "Oracle response recorded");

        if count >= self.config.min_responses {
            self.requests.remove(&request_key);
            return Ok(ResponseOutcome::Finalized { status });
        }
        Ok(ResponseOutcome::Recorded { status, count })
    }

    pub fn is_open(&self, index: u8, key: &FlightKey) -> bool {
        self.requests.contains_key(&RequestKey {
            index,
            flight: key.clone(),
        })
    }

    pub fn request(&self, index: u8, key: &FlightKey) -> Option<&OpenRequest> {
        self.requests.get(&RequestKey {
            index,
            flight: key.clone(),
        })
    }

    pub fn open_requests(&self) -> usize {
        self.requests.len()
    }

    fn assign_indexes(&mut self, generator: &dyn IndexGenerator, caller: &AccountId) -> Vec<u8> {
        let wanted = self.config.indexes_per_oracle as usize;
        let range = self.config.index_range;
        let mut taken = BTreeSet::new();
        let mut indexes = Vec::with_capacity(wanted);

        while indexes.len() < wanted {
            let mut index = self.next_index(generator, caller);
            let mut redraws = 0;
            while taken.contains(&index) && redraws < MAX_REDRAWS {
                index = self.next_index(generator, caller);
                redraws += 1;
            }
            // Config validation guarantees range >= wanted, so a free slot exists.
            while taken.contains(&index) {
                index = ((index as u16 + 1) % range) as u8;
            }
            taken.insert(index);
            indexes.push(index);
        }
        indexes
    }

    fn next_index(&mut self, generator: &dyn IndexGenerator, account: &AccountId) -> u8 {
        let nonce = self.nonce;
        self.nonce = if nonce >= self.config.nonce_reset {
            0
        } else {
            nonce + 1
        };
        generator.draw(account, nonce, self.config.index_range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airlines::AirlineRegistry;
    use crate::config::AirlineConfig;
    use crate::flights::FlightPlan;
    use crate::random::{CyclingIndexGenerator, EntropyIndexGenerator};
    use crate::types::{SuretyError, UNIT};

    const NOW: Timestamp = 1_700_000_000;

    fn flights() -> (FlightRegistry, FlightKey) {
        let airline = AccountId::new("a1");
        let mut airlines = AirlineRegistry::new(&AirlineConfig::default());
        airlines.seed(airline.clone(), "Airline One");
        airlines.fund(&airline, 10 * UNIT).unwrap();
        let mut flights = FlightRegistry::new();
        let key = flights
            .register(
                &airlines,
                &airline,
                FlightPlan::new("AD4061", NOW + 3600, NOW + 7200, "VCP", "POA"),
                NOW,
            )
            .unwrap();
        (flights, key)
    }

    fn oracle(n: usize) -> AccountId {
        AccountId::new(format!("oracle-{}", n))
    }

    #[test]
    fn test_register_assigns_distinct_indexes() {
        let generator = EntropyIndexGenerator::from_seed([3u8; 32]);
        let mut engine = OracleEngine::new(OracleConfig::default());
        for n in 0..20 {
            let indexes = engine.register(&generator, &oracle(n), UNIT, NOW).unwrap();
            assert_eq!(indexes.len(), 3);
            let distinct: BTreeSet<_> = indexes.iter().collect();
            assert_eq!(distinct.len(), 3);
            assert!(indexes.iter().all(|i| *i < 10));
        }
        assert_eq!(engine.oracle_count(), 20);
    }

    #[test]
    fn test_collisions_fall_back_to_next_free_slot() {
        let generator = CyclingIndexGenerator::new(vec![4]).unwrap();
        let mut engine = OracleEngine::new(OracleConfig::default());
        let indexes = engine.register(&generator, &oracle(1), UNIT, NOW).unwrap();
        assert_eq!(indexes, vec![4, 5, 6]);
    }

    #[test]
    fn test_register_rejections() {
        let generator = CyclingIndexGenerator::new(vec![0, 1, 2]).unwrap();
        let mut engine = OracleEngine::new(OracleConfig::default());
        assert!(matches!(
            engine.register(&generator, &oracle(1), UNIT - 1, NOW),
            Err(SuretyError::PreconditionFailed(_))
        ));
        engine.register(&generator, &oracle(1), UNIT, NOW).unwrap();
        assert!(matches!(
            engine.register(&generator, &oracle(1), UNIT, NOW),
            Err(SuretyError::PreconditionFailed(_))
        ));
        assert!(matches!(engine.indexes_of(&oracle(2)), Err(SuretyError::NotFound(_))));
    }

    #[test]
    fn test_nonce_wraps() {
        let config = OracleConfig {
            nonce_reset: 2,
            ..OracleConfig::default()
        };
        let generator = CyclingIndexGenerator::new(vec![0]).unwrap();
        let mut engine = OracleEngine::new(config);
        let caller = oracle(0);
        let nonces: Vec<u64> = (0..4)
            .map(|_| {
                let before = engine.nonce;
                engine.next_index(&generator, &caller);
                before
            })
            .collect();
        assert_eq!(nonces, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_quorum_finalizes_and_closes() {
        let (flights, key) = flights();
        let generator = CyclingIndexGenerator::new(vec![0, 1, 2]).unwrap();
        let mut engine = OracleEngine::new(OracleConfig::default());
        for n in 0..4 {
            engine.register(&generator, &oracle(n), UNIT, NOW).unwrap();
        }
        let index = engine
            .open_request(&generator, &flights, &AccountId::new("p1"), &key, NOW)
            .unwrap();
        assert_eq!(index, 0);

        let status = FlightStatus::LateAirline;
        assert_eq!(
            engine.submit(&oracle(0), index, &key, status).unwrap(),
            ResponseOutcome::Recorded { status, count: 1 }
        );
        assert!(matches!(
            engine.submit(&oracle(0), index, &key, FlightStatus::OnTime),
            Err(SuretyError::PreconditionFailed(_))
        ));
        engine.submit(&oracle(1), index, &key, status).unwrap();
        assert!(engine
            .submit(&oracle(2), index, &key, status)
            .unwrap()
            .is_final());
        assert!(!engine.is_open(index, &key));
        assert!(matches!(
            engine.submit(&oracle(3), index, &key, status),
            Err(SuretyError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn test_foreign_index_unauthorized() {
        let (flights, key) = flights();
        let generator = CyclingIndexGenerator::new(vec![0, 1, 2]).unwrap();
        let mut engine = OracleEngine::new(OracleConfig::default());
        engine.register(&generator, &oracle(0), UNIT, NOW).unwrap();
        engine
            .open_request(&generator, &flights, &AccountId::new("p1"), &key, NOW)
            .unwrap();
        assert!(matches!(
            engine.submit(&oracle(0), 7, &key, FlightStatus::OnTime),
            Err(SuretyError::Unauthorized(_))
        ));
        assert!(matches!(
            engine.submit(&oracle(9), 0, &key, FlightStatus::OnTime),
            Err(SuretyError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_request_unknown_flight() {
        let (flights, _) = flights();
        let generator = CyclingIndexGenerator::new(vec![0]).unwrap();
        let mut engine = OracleEngine::new(OracleConfig::default());
        let ghost = FlightKey::new("a1", "ZZ9", NOW + 10);
        assert!(matches!(
            engine.open_request(&generator, &flights, &AccountId::new("p1"), &ghost, NOW),
            Err(SuretyError::NotFound(_))
        ));
        assert_eq!(engine.open_requests(), 0);
    }

    #[test]
    fn test_refresh_keeps_tally() {
        let (flights, key) = flights();
        let generator = CyclingIndexGenerator::new(vec![0, 1, 2]).unwrap();
        let mut engine = OracleEngine::new(OracleConfig::default());
        engine.register(&generator, &oracle(0), UNIT, NOW).unwrap();
        // Cycle is back at 0 for the request draw.
        let first = engine
            .open_request(&generator, &flights, &AccountId::new("p1"), &key, NOW)
            .unwrap();
        engine.submit(&oracle(0), first, &key, FlightStatus::OnTime).unwrap();
        engine
            .open_request(&generator, &flights, &AccountId::new("p2"), &key, NOW)
            .unwrap();
        engine
            .open_request(&generator, &flights, &AccountId::new("p2"), &key, NOW)
            .unwrap();
        let again = engine
            .open_request(&generator, &flights, &AccountId::new("p2"), &key, NOW)
            .unwrap();
        assert_eq!(again, first);
        let open = engine.request(first, &key).unwrap();
        assert_eq!(open.requester.as_str(), "p2");
        assert_eq!(open.responses[&FlightStatus::OnTime].len(), 1);
    }
}
