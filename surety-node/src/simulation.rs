//! Reporter simulation.
//!
//! Registers a population of oracles, each running as its own task. Reporters
//! listen for `OracleRequest` events, and those holding the requested index
//! race to submit a status. The driver keeps requesting until every flight
//! is resolved or runs out of attempts, then pays out all credited passengers.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use surety::{
    AccountId, Amount, Clock, EntropyIndexGenerator, EventEnvelope, FlightKey, FlightPlan, FlightStatus,
    InMemoryWallet, SuretyEvent, SuretyLedger, SystemClock,
};

use crate::config::NodeConfig;

type SharedLedger = Arc<Mutex<SuretyLedger>>;

/// Outcome of one flight.
#[derive(Debug, Clone, Serialize)]
pub struct FlightOutcome {
    pub flight: String,
    pub status: FlightStatus,
    pub requests: usize,
}

/// Summary printed after a run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Seed of the index generator, for replaying the assignment
    pub entropy_seed: String,
    pub oracles: usize,
    pub flights: Vec<FlightOutcome>,
    pub credited: Amount,
    pub withdrawn: Amount,
    pub airline_funds: Amount,
}

/// Run a full simulation against a fresh ledger.
pub async fn run(config: &NodeConfig) -> anyhow::Result<SimulationReport> {
    config.validate()?;
    let sim = &config.simulation;

    let generator = match &sim.entropy_seed {
        Some(seed) => EntropyIndexGenerator::from_hex(seed)?,
        None => EntropyIndexGenerator::from_entropy(),
    };
    let entropy_seed = generator.seed_hex();
    info!(seed = %entropy_seed, oracles = sim.oracles, flights = sim.flights, "Starting simulation");

    let ledger = SuretyLedger::with_config(config.ledger.clone())?
        .with_clock(Arc::new(SystemClock))
        .with_index_generator(Arc::new(generator.clone()))
        .with_payout(Arc::new(InMemoryWallet::new()));
    let ledger: SharedLedger = Arc::new(Mutex::new(ledger));

    let (airline, keys, passengers) = seed_ledger(&ledger, config).await?;
    let reporters = spawn_reporters(&ledger, config, &generator).await?;

    let mut flights = Vec::with_capacity(keys.len());
    for key in &keys {
        flights.push(resolve_flight(&ledger, config, key).await?);
    }

    for handle in &reporters {
        handle.abort();
    }

    let mut guard = ledger.lock().await;
    let mut credited = 0;
    let mut withdrawn = 0;
    for passenger in &passengers {
        let owed = guard.amount_to_be_received(passenger);
        if owed == 0 {
            continue;
        }
        credited += owed;
        match guard.withdraw_compensation(passenger) {
            Ok(amount) => withdrawn += amount,
            Err(e) => warn!(passenger = %passenger, error = %e, "Withdrawal failed"),
        }
    }

    let report = SimulationReport {
        entropy_seed,
        oracles: sim.oracles,
        flights,
        credited,
        withdrawn,
        airline_funds: guard.current_funds(&airline),
    };
    info!(credited, withdrawn, "Simulation finished");
    Ok(report)
}

/// Fund the genesis airline, schedule its flights and sell the policies.
async fn seed_ledger(
    ledger: &SharedLedger,
    config: &NodeConfig,
) -> anyhow::Result<(AccountId, Vec<FlightKey>, Vec<AccountId>)> {
    let sim = &config.simulation;
    let airline = config.ledger.genesis.first_airline.clone();
    let passengers: Vec<AccountId> = (0..sim.passengers)
        .map(|n| AccountId::new(format!("passenger-{}", n)))
        .collect();

    let mut guard = ledger.lock().await;
    guard.fund(&airline, config.ledger.airlines.minimum_funds)?;

    let departure = SystemClock.now() + 3600;
    let mut keys = Vec::with_capacity(sim.flights);
    for n in 0..sim.flights {
        let plan = FlightPlan::new(
            format!("SF{:03}", n + 1),
            departure + n as u64 * 600,
            departure + n as u64 * 600 + 5400,
            "GRU",
            "SSA",
        );
        let key = guard.register_flight(&airline, plan)?;
        for passenger in &passengers {
            guard.buy_insurance(passenger, &key, sim.premium)?;
        }
        keys.push(key);
    }
    Ok((airline, keys, passengers))
}

/// Register the oracles and start one reporter task per oracle. Each
/// reporter's rng is seeded from the run's entropy.
async fn spawn_reporters(
    ledger: &SharedLedger,
    config: &NodeConfig,
    generator: &EntropyIndexGenerator,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let sim = &config.simulation;
    let fee = config.ledger.oracles.registration_fee;
    let mut handles = Vec::with_capacity(sim.oracles);

    for n in 0..sim.oracles {
        let oracle = AccountId::new(format!("oracle-{}", n));
        let (indexes, events) = {
            let mut guard = ledger.lock().await;
            let indexes = guard.register_oracle(&oracle, fee)?;
            (indexes, guard.subscribe())
        };
        let reporter = Reporter {
            oracle,
            indexes,
            late_airline_probability: sim.late_airline_probability,
            rng: reporter_rng(generator, n),
        };
        handles.push(tokio::spawn(reporter.run(ledger.clone(), events)));
    }
    Ok(handles)
}

fn reporter_rng(generator: &EntropyIndexGenerator, n: usize) -> StdRng {
    StdRng::from_seed(generator.derive_seed(format!("reporter-{}", n).as_bytes()))
}

/// Request statuses for `key` until one finalizes or attempts run out.
async fn resolve_flight(
    ledger: &SharedLedger,
    config: &NodeConfig,
    key: &FlightKey,
) -> anyhow::Result<FlightOutcome> {
    let sim = &config.simulation;
    let requester = config.ledger.genesis.first_airline.clone();
    let timeout = Duration::from_millis(sim.response_timeout_ms);

    for attempt in 1..=sim.max_requests {
        let mut events = {
            let mut guard = ledger.lock().await;
            let (status, _) = guard.flight_status_info(key)?;
            if status != FlightStatus::Unknown {
                return Ok(FlightOutcome {
                    flight: key.to_string(),
                    status,
                    requests: attempt - 1,
                });
            }
            let events = guard.subscribe();
            let index = guard.request_flight_status(&requester, key)?;
            debug!(flight = %key, index, attempt, "Status requested");
            events
        };

        if let Ok(Some(status)) = tokio::time::timeout(timeout, wait_for_status(&mut events, key)).await {
            info!(flight = %key, %status, attempt, "Flight resolved");
            return Ok(FlightOutcome {
                flight: key.to_string(),
                status,
                requests: attempt,
            });
        }
    }

    warn!(flight = %key, attempts = sim.max_requests, "No quorum reached");
    Ok(FlightOutcome {
        flight: key.to_string(),
        status: FlightStatus::Unknown,
        requests: sim.max_requests,
    })
}

async fn wait_for_status(
    events: &mut broadcast::Receiver<EventEnvelope>,
    key: &FlightKey,
) -> Option<FlightStatus> {
    loop {
        match events.recv().await {
            Ok(EventEnvelope {
                event: SuretyEvent::FlightStatusInfo { flight, status, .. },
                ..
            }) if &flight == key => return Some(status),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Driver lagged behind ledger events");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// One simulated reporting agent.
struct Reporter {
    oracle: AccountId,
    indexes: Vec<u8>,
    late_airline_probability: f64,
    rng: StdRng,
}

impl Reporter {
    async fn run(mut self, ledger: SharedLedger, mut events: broadcast::Receiver<EventEnvelope>) {
        loop {
            let (index, flight) = match events.recv().await {
                Ok(EventEnvelope {
                    event: SuretyEvent::OracleRequest { index, flight },
                    ..
                }) => (index, flight),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(oracle = %self.oracle, skipped, "Reporter lagged behind ledger events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if !self.indexes.contains(&index) {
                continue;
            }

            let mut guard = ledger.lock().await;
            if !guard.is_request_open(index, &flight) {
                debug!(oracle = %self.oracle, flight = %flight, index, "Request already closed");
                continue;
            }
            let status = self.observe();
            match guard.submit_oracle_response(&self.oracle, index, &flight, status) {
                Ok(outcome) => {
                    debug!(oracle = %self.oracle, %status, finalized = outcome.is_final(), "Response accepted")
                }
                Err(e) => warn!(oracle = %self.oracle, flight = %flight, error = %e, "Response rejected"),
            }
        }
    }

    fn observe(&mut self) -> FlightStatus {
        if self.rng.gen_bool(self.late_airline_probability) {
            FlightStatus::LateAirline
        } else {
            FlightStatus::OnTime
        }
    }
}
