//! SuretyLedger - command and query surface over the surety state.
//!
//! Every mutating command runs as one transaction against the store: the
//! operational gate is checked, the registries are updated, and the events
//! produced are published only once the whole command has succeeded.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::access::AccessGate;
use crate::airlines::{Admission, Airline, AirlineRegistry};
use crate::clock::{Clock, SystemClock};
use crate::config::SuretyConfig;
use crate::events::{EventBus, EventEnvelope, SuretyEvent};
use crate::flights::{Flight, FlightPlan, FlightRegistry};
use crate::insurance::{CreditRound, InsuranceLedger, InsurancePolicy};
use crate::oracles::{OracleEngine, ResponseOutcome};
use crate::payout::{InMemoryWallet, Payout};
use crate::random::{EntropyIndexGenerator, IndexGenerator};
use crate::store::{Shared, Store, Transaction};
use crate::types::{
    AccountId, Amount, FlightKey, FlightStatus, Result, SuretyError, Timestamp,
};

/// Everything the ledger persists. Components are copy-on-write, so a
/// command only clones what it mutates.
#[derive(Debug, Clone)]
pub struct LedgerState {
    pub gate: Shared<AccessGate>,
    pub airlines: Shared<AirlineRegistry>,
    pub flights: Shared<FlightRegistry>,
    pub insurance: Shared<InsuranceLedger>,
    pub oracles: Shared<OracleEngine>,
}

impl LedgerState {
    fn genesis(config: &SuretyConfig) -> Result<Self> {
        let genesis = &config.genesis;
        let mut gate = AccessGate::new(genesis.owner.clone());
        if genesis.authorize_engine {
            gate.authorize(&genesis.owner, genesis.engine_id.clone())?;
        }
        let mut airlines = AirlineRegistry::new(&config.airlines);
        airlines.seed(genesis.first_airline.clone(), genesis.first_airline_name.clone());

        Ok(Self {
            gate: Shared::new(gate),
            airlines: Shared::new(airlines),
            flights: Shared::new(FlightRegistry::new()),
            insurance: Shared::new(InsuranceLedger::new(config.insurance.max_insurance_amount)),
            oracles: Shared::new(OracleEngine::new(config.oracles.clone())),
        })
    }
}

/// Inputs a command reads besides the state.
struct Env<'a> {
    config: &'a SuretyConfig,
    now: Timestamp,
    indexes: &'a dyn IndexGenerator,
}

/// The flight surety ledger.
pub struct SuretyLedger {
    config: SuretyConfig,
    store: Store<LedgerState>,
    clock: Arc<dyn Clock>,
    indexes: Arc<dyn IndexGenerator>,
    payout: Arc<dyn Payout>,
    bus: EventBus,
}

impl SuretyLedger {
    /// Ledger with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(SuretyConfig::default())
    }

    /// Ledger with custom configuration. Uses the system clock, OS entropy
    /// for index draws and an in-memory wallet for payouts.
    pub fn with_config(config: SuretyConfig) -> Result<Self> {
        config.validate()?;
        let state = LedgerState::genesis(&config)?;
        let bus = EventBus::new(config.events.channel_capacity);

        info!(
            owner = %config.genesis.owner,
            first_airline = %config.genesis.first_airline,
            engine = %config.genesis.engine_id,
            "Surety ledger created"
        );

        Ok(Self {
            config,
            store: Store::new(state),
            clock: Arc::new(SystemClock),
            indexes: Arc::new(EntropyIndexGenerator::from_entropy()),
            payout: Arc::new(InMemoryWallet::new()),
            bus,
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the index generator used for oracle assignment and routing.
    pub fn with_index_generator(mut self, indexes: Arc<dyn IndexGenerator>) -> Self {
        self.indexes = indexes;
        self
    }

    /// Replace the payout channel used by withdrawals.
    pub fn with_payout(mut self, payout: Arc<dyn Payout>) -> Self {
        self.payout = payout;
        self
    }

    pub fn config(&self) -> &SuretyConfig {
        &self.config
    }

    /// Committed state.
    pub fn state(&self) -> &LedgerState {
        self.store.state()
    }

    /// Listen for events committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.bus.subscribe()
    }

    // ------------------------------------------------------------------
    // Access gate
    // ------------------------------------------------------------------

    /// Open or close the ledger. Owner only; allowed while closed.
    pub fn set_operational_status(&mut self, caller: &AccountId, operational: bool) -> Result<()> {
        let changed = self.run(false, |tx, _| tx.state.gate.make_mut().set_operational(caller, operational))?;
        if changed {
            info!(operational, "Operational status changed");
        }
        Ok(())
    }

    pub fn authorize_caller(&mut self, caller: &AccountId, id: &AccountId) -> Result<()> {
        if self.run(true, |tx, _| tx.state.gate.make_mut().authorize(caller, id.clone()))? {
            info!(caller = %id, "Caller authorized");
        }
        Ok(())
    }

    pub fn deauthorize_caller(&mut self, caller: &AccountId, id: &AccountId) -> Result<()> {
        if self.run(true, |tx, _| tx.state.gate.make_mut().deauthorize(caller, id))? {
            info!(caller = %id, "Caller deauthorized");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Airlines
    // ------------------------------------------------------------------

    /// Admit `candidate`, or record `sponsor`'s vote for it.
    pub fn register_airline(
        &mut self,
        candidate: &AccountId,
        name: &str,
        sponsor: &AccountId,
    ) -> Result<Admission> {
        let admission = self.run(true, |tx, _| {
            let admission = tx.state.airlines.make_mut().register(candidate, name, sponsor)?;
            if admission == Admission::Registered {
                let name = tx
                    .state
                    .airlines
                    .get(candidate)
                    .map(|a| a.name.clone())
                    .unwrap_or_default();
                tx.emit(SuretyEvent::AirlineRegistered {
                    airline: candidate.clone(),
                    name,
                });
            }
            Ok(admission)
        })?;

        match admission {
            Admission::Registered => {
                info!(airline = %candidate, sponsor = %sponsor, "Airline registered")
            }
            Admission::VoteRecorded {
                votes,
                registered_count,
            } => debug!(airline = %candidate, votes, registered_count, "Airline pending"),
            Admission::AlreadyRegistered => {}
        }
        Ok(admission)
    }

    /// Add to an airline's escrow. Returns the new balance.
    pub fn fund(&mut self, airline: &AccountId, amount: Amount) -> Result<Amount> {
        let balance = self.run(true, |tx, _| {
            let balance = tx.state.airlines.make_mut().fund(airline, amount)?;
            tx.emit(SuretyEvent::AirlineFunded {
                airline: airline.clone(),
                amount,
                balance,
            });
            Ok(balance)
        })?;
        info!(airline = %airline, amount, balance, "Airline funded");
        Ok(balance)
    }

    // ------------------------------------------------------------------
    // Flights
    // ------------------------------------------------------------------

    pub fn register_flight(&mut self, airline: &AccountId, plan: FlightPlan) -> Result<FlightKey> {
        let key = self.run(true, |tx, env| {
            let key = tx
                .state
                .flights
                .make_mut()
                .register(&tx.state.airlines, airline, plan, env.now)?;
            tx.emit(SuretyEvent::FlightRegistered { flight: key.clone() });
            Ok(key)
        })?;
        info!(flight = %key, "Flight registered");
        Ok(key)
    }

    // ------------------------------------------------------------------
    // Insurance
    // ------------------------------------------------------------------

    pub fn buy_insurance(
        &mut self,
        passenger: &AccountId,
        flight: &FlightKey,
        amount: Amount,
    ) -> Result<InsurancePolicy> {
        let policy = self.run(true, |tx, env| {
            let state = &mut tx.state;
            let policy = state.insurance.make_mut().buy(
                &state.flights,
                state.airlines.make_mut(),
                passenger,
                flight,
                amount,
                env.now,
            )?;
            tx.emit(SuretyEvent::InsuranceBought {
                passenger: passenger.clone(),
                flight: flight.clone(),
                amount,
            });
            Ok(policy)
        })?;
        info!(passenger = %passenger, flight = %flight, amount, "Insurance bought");
        Ok(policy)
    }

    /// Credit every uncredited policy on `flight`. Authorized callers only.
    pub fn credit_insurees(
        &mut self,
        caller: &AccountId,
        percentage: u32,
        flight: &FlightKey,
    ) -> Result<CreditRound> {
        self.run(true, |tx, _| {
            tx.state.gate.require_authorized(caller)?;
            credit(tx, flight, percentage)
        })
    }

    /// Pay out the passenger's whole balance.
    ///
    /// The balance is zeroed and committed before the transfer is attempted.
    /// A failed transfer is reported as `TransferFailed`; the balance stays
    /// at zero.
    pub fn withdraw_compensation(&mut self, passenger: &AccountId) -> Result<Amount> {
        let amount = self.run(true, |tx, _| tx.state.insurance.make_mut().take_balance(passenger))?;

        if let Err(e) = self.payout.transfer(passenger, amount) {
            warn!(passenger = %passenger, amount, error = %e, "Compensation transfer failed");
            return Err(SuretyError::TransferFailed(e.to_string()));
        }

        self.bus.publish(vec![SuretyEvent::CompensationWithdrawn {
            passenger: passenger.clone(),
            amount,
        }]);
        info!(passenger = %passenger, amount, "Compensation withdrawn");
        Ok(amount)
    }

    // ------------------------------------------------------------------
    // Oracles
    // ------------------------------------------------------------------

    /// Register `caller` as an oracle. Returns its indexes.
    pub fn register_oracle(&mut self, caller: &AccountId, stake: Amount) -> Result<Vec<u8>> {
        let indexes = self.run(true, |tx, env| {
            let indexes = tx
                .state
                .oracles
                .make_mut()
                .register(env.indexes, caller, stake, env.now)?;
            tx.emit(SuretyEvent::OracleRegistered {
                oracle: caller.clone(),
                indexes: indexes.clone(),
            });
            Ok(indexes)
        })?;
        info!(oracle = %caller, ?indexes, "Oracle registered");
        Ok(indexes)
    }

    /// Ask oracles for the status of `flight`. Returns the request index.
    pub fn request_flight_status(&mut self, caller: &AccountId, flight: &FlightKey) -> Result<u8> {
        self.run(true, |tx, env| {
            let state = &mut tx.state;
            let index = state
                .oracles
                .make_mut()
                .open_request(env.indexes, &state.flights, caller, flight, env.now)?;
            tx.emit(SuretyEvent::OracleRequest {
                index,
                flight: flight.clone(),
            });
            Ok(index)
        })
    }

    /// Accept one oracle's report. On quorum the flight's status is final and,
    /// when the airline is at fault, its insurees are credited.
    pub fn submit_oracle_response(
        &mut self,
        caller: &AccountId,
        index: u8,
        flight: &FlightKey,
        status: FlightStatus,
    ) -> Result<ResponseOutcome> {
        let outcome = self.run(true, |tx, env| {
            let outcome = tx.state.oracles.make_mut().submit(caller, index, flight, status)?;
            tx.emit(SuretyEvent::OracleReport {
                oracle: caller.clone(),
                index,
                flight: flight.clone(),
                status,
            });
            if let ResponseOutcome::Finalized { status } = outcome {
                finalize(tx, env, index, flight, status)?;
            }
            Ok(outcome)
        })?;

        if let ResponseOutcome::Finalized { status } = outcome {
            info!(flight = %flight, index, %status, "Flight status finalized");
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn is_operational(&self) -> bool {
        self.state().gate.is_operational()
    }

    pub fn owner(&self) -> &AccountId {
        self.state().gate.owner()
    }

    /// Identity the oracle engine uses for credit rounds.
    pub fn engine_id(&self) -> &AccountId {
        &self.config.genesis.engine_id
    }

    pub fn is_authorized(&self, id: &AccountId) -> bool {
        self.state().gate.is_authorized(id)
    }

    pub fn is_airline(&self, id: &AccountId) -> bool {
        self.state().airlines.is_registered(id)
    }

    pub fn num_airlines(&self) -> usize {
        self.state().airlines.registered_count()
    }

    /// Registered airlines in admission order.
    pub fn airlines(&self) -> Vec<&Airline> {
        self.state().airlines.registered().collect()
    }

    pub fn airline(&self, id: &AccountId) -> Option<&Airline> {
        self.state().airlines.get(id)
    }

    pub fn pending_votes(&self, candidate: &AccountId) -> usize {
        self.state().airlines.pending_votes(candidate)
    }

    pub fn current_funds(&self, airline: &AccountId) -> Amount {
        self.state().airlines.funds(airline)
    }

    pub fn flight_status_info(&self, flight: &FlightKey) -> Result<(FlightStatus, Timestamp)> {
        self.state().flights.status_info(flight)
    }

    /// Flights in registration order.
    pub fn flights(&self) -> Vec<&Flight> {
        self.state().flights.iter().collect()
    }

    pub fn amount_paid_by_insuree(&self, passenger: &AccountId, flight: &FlightKey) -> Result<Amount> {
        self.state().insurance.amount_paid(passenger, flight)
    }

    pub fn amount_to_be_received(&self, passenger: &AccountId) -> Amount {
        self.state().insurance.amount_to_be_received(passenger)
    }

    pub fn policies_of(&self, passenger: &AccountId) -> Vec<&InsurancePolicy> {
        self.state().insurance.policies_of(passenger)
    }

    pub fn my_indexes(&self, oracle: &AccountId) -> Result<Vec<u8>> {
        self.state().oracles.indexes_of(oracle).map(|i| i.to_vec())
    }

    pub fn is_request_open(&self, index: u8, flight: &FlightKey) -> bool {
        self.state().oracles.is_open(index, flight)
    }

    /// Run one command as a transaction and publish its events on commit.
    fn run<T>(
        &mut self,
        gated: bool,
        f: impl FnOnce(&mut Transaction<LedgerState>, &Env<'_>) -> Result<T>,
    ) -> Result<T> {
        let env = Env {
            config: &self.config,
            now: self.clock.now(),
            indexes: self.indexes.as_ref(),
        };
        let (value, events) = self.store.transact(|tx| {
            if gated {
                tx.state.gate.require_operational()?;
            }
            f(tx, &env)
        })?;
        self.bus.publish(events);
        Ok(value)
    }
}

/// Pay `percentage` of the uncredited premiums on `flight`.
fn credit(
    tx: &mut Transaction<LedgerState>,
    flight: &FlightKey,
    percentage: u32,
) -> Result<CreditRound> {
    let state = &mut tx.state;
    let round = state
        .insurance
        .make_mut()
        .credit_insurees(state.airlines.make_mut(), flight, percentage)?;
    tx.emit(SuretyEvent::InsureesCredited {
        flight: flight.clone(),
        percentage,
        policies: round.credits.len(),
        total: round.total,
    });
    info!(
        flight = %flight,
        percentage,
        policies = round.credits.len(),
        total = round.total,
        "Insurees credited"
    );
    Ok(round)
}

/// Record a quorum result on the flight and trigger payouts.
///
/// The status is final once quorum is reached. A credit round that cannot
/// run is skipped and its policies stay eligible for a later
/// `credit_insurees` call.
fn finalize(
    tx: &mut Transaction<LedgerState>,
    env: &Env<'_>,
    index: u8,
    flight: &FlightKey,
    status: FlightStatus,
) -> Result<()> {
    tx.state.flights.make_mut().set_status(flight, status, env.now)?;
    tx.emit(SuretyEvent::FlightStatusInfo {
        index,
        flight: flight.clone(),
        status,
        updated_at: env.now,
    });

    if status != FlightStatus::LateAirline {
        return Ok(());
    }
    let engine = &env.config.genesis.engine_id;
    if tx.state.gate.require_authorized(engine).is_err() {
        warn!(flight = %flight, engine = %engine, "Airline at fault but engine may not credit insurees");
        return Ok(());
    }
    if tx.state.insurance.eligible_count(flight) == 0 {
        warn!(flight = %flight, "Airline at fault but no uncredited policies");
        return Ok(());
    }
    let percentage = env.config.insurance.late_airline_payout_percent;
    let owed = tx.state.insurance.round_total(flight, percentage)?;
    let held = tx.state.airlines.funds(&flight.airline);
    if owed > held {
        warn!(flight = %flight, owed, held, "Airline escrow cannot cover credit round");
        return Ok(());
    }
    credit(tx, flight, percentage)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::random::CyclingIndexGenerator;
    use crate::types::UNIT;

    const NOW: Timestamp = 1_700_000_000;

    fn ledger() -> SuretyLedger {
        SuretyLedger::new()
            .unwrap()
            .with_clock(Arc::new(ManualClock::at(NOW)))
            .with_index_generator(Arc::new(CyclingIndexGenerator::new(vec![0, 1, 2]).unwrap()))
    }

    fn id(s: &str) -> AccountId {
        AccountId::new(s)
    }

    #[test]
    fn test_genesis_state() {
        let ledger = ledger();
        assert!(ledger.is_operational());
        assert_eq!(ledger.owner(), &id("owner"));
        assert!(ledger.is_airline(&id("airline-one")));
        assert_eq!(ledger.num_airlines(), 1);
        assert!(ledger.is_authorized(ledger.engine_id()));
        assert_eq!(ledger.current_funds(&id("airline-one")), 0);
    }

    #[test]
    fn test_closed_gate_blocks_commands() {
        let mut ledger = ledger();
        ledger.set_operational_status(&id("owner"), false).unwrap();
        assert_eq!(
            ledger.fund(&id("airline-one"), UNIT),
            Err(SuretyError::NotOperational)
        );
        assert_eq!(
            ledger.register_oracle(&id("o1"), UNIT),
            Err(SuretyError::NotOperational)
        );
        assert!(ledger.set_operational_status(&id("owner"), true).is_ok());
        assert_eq!(ledger.fund(&id("airline-one"), UNIT).unwrap(), UNIT);
    }

    #[test]
    fn test_credit_requires_authorization() {
        let mut ledger = ledger();
        ledger.fund(&id("airline-one"), 10 * UNIT).unwrap();
        let key = ledger
            .register_flight(
                &id("airline-one"),
                FlightPlan::new("AD1", NOW + 100, NOW + 200, "VCP", "POA"),
            )
            .unwrap();
        ledger.buy_insurance(&id("p1"), &key, UNIT).unwrap();
        assert!(matches!(
            ledger.credit_insurees(&id("p1"), 150, &key),
            Err(SuretyError::Unauthorized(_))
        ));
        let round = ledger.credit_insurees(&id("owner"), 150, &key).unwrap();
        assert_eq!(round.total, 1_500_000_000);
    }

    #[test]
    fn test_uncoverable_credit_still_finalizes() {
        let mut config = SuretyConfig::default();
        config.airlines.minimum_funds = 0;
        let mut ledger = SuretyLedger::with_config(config)
            .unwrap()
            .with_clock(Arc::new(ManualClock::at(NOW)))
            .with_index_generator(Arc::new(CyclingIndexGenerator::new(vec![0, 1, 2]).unwrap()));
        let airline = id("airline-one");
        let key = ledger
            .register_flight(&airline, FlightPlan::new("AD2", NOW + 100, NOW + 200, "VCP", "POA"))
            .unwrap();
        ledger.buy_insurance(&id("p1"), &key, UNIT).unwrap();
        assert_eq!(ledger.current_funds(&airline), UNIT);
        for n in 0..3 {
            ledger.register_oracle(&id(&format!("o{}", n)), UNIT).unwrap();
        }
        let index = ledger.request_flight_status(&id("p1"), &key).unwrap();

        let mut rx = ledger.subscribe();
        let late = FlightStatus::LateAirline;
        for n in 0..2 {
            ledger
                .submit_oracle_response(&id(&format!("o{}", n)), index, &key, late)
                .unwrap();
        }
        assert_eq!(
            ledger.submit_oracle_response(&id("o2"), index, &key, late),
            Ok(ResponseOutcome::Finalized { status: late })
        );

        assert_eq!(ledger.flight_status_info(&key).unwrap(), (late, NOW));
        assert!(!ledger.is_request_open(index, &key));
        assert_eq!(ledger.current_funds(&airline), UNIT);
        assert_eq!(ledger.amount_to_be_received(&id("p1")), 0);
        let events: Vec<SuretyEvent> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|envelope| envelope.event)
            .collect();
        assert!(events
            .iter()
            .any(|e| matches!(e, SuretyEvent::FlightStatusInfo { status, .. } if *status == late)));
        assert!(!events
            .iter()
            .any(|e| matches!(e, SuretyEvent::InsureesCredited { .. })));

        ledger.fund(&airline, UNIT).unwrap();
        let round = ledger.credit_insurees(&id("owner"), 150, &key).unwrap();
        assert_eq!(round.total, 1_500_000_000);
        assert_eq!(ledger.amount_to_be_received(&id("p1")), 1_500_000_000);
    }

    #[test]
    fn test_command_clones_only_touched_components() {
        let mut ledger = ledger();
        let before = ledger.state().clone();
        ledger.fund(&id("airline-one"), UNIT).unwrap();
        let after = ledger.state();
        assert!(!Shared::ptr_eq(&after.airlines, &before.airlines));
        assert!(Shared::ptr_eq(&after.flights, &before.flights));
        assert!(Shared::ptr_eq(&after.insurance, &before.insurance));
        assert!(Shared::ptr_eq(&after.oracles, &before.oracles));
        assert!(Shared::ptr_eq(&after.gate, &before.gate));
    }

    #[test]
    fn test_events_only_on_commit() {
        let mut ledger = ledger();
        let mut rx = ledger.subscribe();
        assert!(ledger.fund(&id("airline-one"), UNIT).is_ok());
        assert!(ledger
            .register_airline(&id("a2"), "Two", &id("airline-one"))
            .is_err());
        let envelope = rx.try_recv().unwrap();
        assert!(matches!(envelope.event, SuretyEvent::AirlineFunded { .. }));
        assert!(rx.try_recv().is_err());
    }
}
