//! Policies, credit rounds and passenger balances.
//!
//! A premium goes straight into the operating airline's escrow. When a flight
//! is resolved as the airline's fault, every uncredited policy on it is paid
//! `amount_paid * percentage / 100` out of that escrow into the passenger's
//! withdrawable balance.

use std::collections::HashMap;

use crate::airlines::AirlineRegistry;
use crate::flights::FlightRegistry;
use crate::types::{
    not_found, precondition, AccountId, Amount, FlightKey, Result, Timestamp,
};

/// One passenger's cover on one flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsurancePolicy {
    pub passenger: AccountId,
    pub flight: FlightKey,
    pub amount_paid: Amount,
    /// Set once, by the credit round that paid this policy
    pub credited: bool,
    pub purchased_at: Timestamp,
}

/// Outcome of one `credit_insurees` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditRound {
    pub flight: FlightKey,
    pub percentage: u32,
    /// Passenger and amount credited, in purchase order
    pub credits: Vec<(AccountId, Amount)>,
    pub total: Amount,
}

#[derive(Debug, Clone)]
pub struct InsuranceLedger {
    policies: HashMap<(AccountId, FlightKey), InsurancePolicy>,
    /// Passengers per flight in purchase order
    insurees: HashMap<FlightKey, Vec<AccountId>>,
    credits: HashMap<AccountId, Amount>,
    max_insurance_amount: Amount,
}

impl InsuranceLedger {
    pub fn new(max_insurance_amount: Amount) -> Self {
        Self {
            policies: HashMap::new(),
            insurees: HashMap::new(),
            credits: HashMap::new(),
            max_insurance_amount,
        }
    }

    /// Sell a policy and move the premium into the airline's escrow.
    pub fn buy(
        &mut self,
        flights: &FlightRegistry,
        airlines: &mut AirlineRegistry,
        passenger: &AccountId,
        key: &FlightKey,
        amount: Amount,
        now: Timestamp,
    ) -> Result<InsurancePolicy> {
        flights.require(key)?;
        if amount == 0 {
            return Err(precondition("premium must be positive"));
        }
        if amount > self.max_insurance_amount {
            return Err(precondition(format!(
                "premium {} exceeds the cap of {}",
                amount, self.max_insurance_amount
            )));
        }
        if key.departure <= now {
            return Err(precondition(format!("flight {} has already departed", key)));
        }
        let policy_key = (passenger.clone(), key.clone());
        if self.policies.contains_key(&policy_key) {
            return Err(precondition(format!(
                "{} already holds a policy on {}",
                passenger, key
            )));
        }

        airlines.fund(&key.airline, amount)?;

        let policy = InsurancePolicy {
            passenger: passenger.clone(),
            flight: key.clone(),
            amount_paid: amount,
            credited: false,
            purchased_at: now,
        };
        self.policies.insert(policy_key, policy.clone());
        self.insurees
            .entry(key.clone())
            .or_default()
            .push(passenger.clone());
        Ok(policy)
    }

    /// Uncredited policies on `key`.
    pub fn eligible_count(&self, key: &FlightKey) -> usize {
        self.policies_on(key).filter(|p| !p.credited).count()
    }

    /// Pay `percentage` of every uncredited premium on `key` out of the
    /// airline's escrow.
    pub fn credit_insurees(
        &mut self,
        airlines: &mut AirlineRegistry,
        key: &FlightKey,
        percentage: u32,
    ) -> Result<CreditRound> {
        let (credits, total) = self.pending_credits(key, percentage)?;
        if credits.is_empty() {
            return Err(precondition(format!("no uncredited policies on {}", key)));
        }
        airlines.debit(&key.airline, total)?;

        for (passenger, credit) in &credits {
            if let Some(policy) = self.policies.get_mut(&(passenger.clone(), key.clone())) {
                policy.credited = true;
            }
            let balance = self.credits.entry(passenger.clone()).or_insert(0);
            *balance = balance
                .checked_add(*credit)
                .ok_or_else(|| precondition(format!("credit balance overflow for {}", passenger)))?;
        }

        Ok(CreditRound {
            flight: key.clone(),
            percentage,
            credits,
            total,
        })
    }

    /// What a credit round at `percentage` would debit from the airline.
    pub fn round_total(&self, key: &FlightKey, percentage: u32) -> Result<Amount> {
        self.pending_credits(key, percentage).map(|(_, total)| total)
    }

    fn pending_credits(
        &self,
        key: &FlightKey,
        percentage: u32,
    ) -> Result<(Vec<(AccountId, Amount)>, Amount)> {
        let mut credits = Vec::new();
        for policy in self.policies_on(key).filter(|p| !p.credited) {
            credits.push((policy.passenger.clone(), payout(policy.amount_paid, percentage)?));
        }
        let total = credits.iter().try_fold(0 as Amount, |acc, (_, c)| {
            acc.checked_add(*c)
                .ok_or_else(|| precondition("credit total overflows"))
        })?;
        Ok((credits, total))
    }

    /// Zero and return a passenger's balance.
    pub fn take_balance(&mut self, passenger: &AccountId) -> Result<Amount> {
        match self.credits.get_mut(passenger) {
            Some(balance) if *balance > 0 => Ok(std::mem::take(balance)),
            _ => Err(precondition(format!("{} has nothing to withdraw", passenger))),
        }
    }

    pub fn amount_paid(&self, passenger: &AccountId, key: &FlightKey) -> Result<Amount> {
        self.policies
            .get(&(passenger.clone(), key.clone()))
            .map(|p| p.amount_paid)
            .ok_or_else(|| not_found(format!("policy of {} on {}", passenger, key)))
    }

    /// Withdrawable balance; zero if never credited.
    pub fn amount_to_be_received(&self, passenger: &AccountId) -> Amount {
        self.credits.get(passenger).copied().unwrap_or(0)
    }

    /// A passenger's policies, ordered by purchase time.
    pub fn policies_of(&self, passenger: &AccountId) -> Vec<&InsurancePolicy> {
        let mut policies: Vec<_> = self
            .policies
            .values()
            .filter(|p| &p.passenger == passenger)
            .collect();
        policies.sort_by(|a, b| {
            a.purchased_at
                .cmp(&b.purchased_at)
                .then_with(|| a.flight.cmp(&b.flight))
        });
        policies
    }

    fn policies_on<'a>(&'a self, key: &'a FlightKey) -> impl Iterator<Item = &'a InsurancePolicy> {
        self.insurees
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(move |p| self.policies.get(&(p.clone(), key.clone())))
    }
}

/// `amount * percentage / 100`, truncating.
fn payout(amount: Amount, percentage: u32) -> Result<Amount> {
    let credit = amount as u128 * percentage as u128 / 100;
    Amount::try_from(credit).map_err(|_| precondition("credit exceeds the amount range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AirlineConfig;
    use crate::flights::FlightPlan;
    use crate::types::{SuretyError, UNIT};

    const NOW: Timestamp = 1_700_000_000;

    struct Fixture {
        airlines: AirlineRegistry,
        flights: FlightRegistry,
        ledger: InsuranceLedger,
        key: FlightKey,
    }

    fn fixture() -> Fixture {
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
        Fixture {
            airlines,
            flights,
            ledger: InsuranceLedger::new(UNIT),
            key,
        }
    }

    fn buy(f: &mut Fixture, passenger: &str, amount: Amount) -> Result<InsurancePolicy> {
        f.ledger.buy(
            &f.flights,
            &mut f.airlines,
            &AccountId::new(passenger),
            &f.key,
            amount,
            NOW,
        )
    }

    #[test]
    fn test_payout_truncates() {
        assert_eq!(payout(3, 150).unwrap(), 4);
        assert_eq!(payout(UNIT, 150).unwrap(), 1_500_000_000);
        assert_eq!(payout(1, 50).unwrap(), 0);
    }

    #[test]
    fn test_premium_moves_into_escrow() {
        let mut f = fixture();
        buy(&mut f, "p1", UNIT / 2).unwrap();
        assert_eq!(f.airlines.funds(&f.key.airline), 10 * UNIT + UNIT / 2);
        assert_eq!(
            f.ledger.amount_paid(&AccountId::new("p1"), &f.key).unwrap(),
            UNIT / 2
        );
    }

    #[test]
    fn test_buy_rejections() {
        let mut f = fixture();
        assert!(matches!(buy(&mut f, "p1", 0), Err(SuretyError::PreconditionFailed(_))));
        assert!(matches!(
            buy(&mut f, "p1", UNIT + 1),
            Err(SuretyError::PreconditionFailed(_))
        ));
        buy(&mut f, "p1", UNIT).unwrap();
        assert!(matches!(buy(&mut f, "p1", 1), Err(SuretyError::PreconditionFailed(_))));

        let ghost = FlightKey::new("a1", "XX1", NOW + 10);
        let missing = f.ledger.buy(
            &f.flights,
            &mut f.airlines,
            &AccountId::new("p2"),
            &ghost,
            1,
            NOW,
        );
        assert!(matches!(missing, Err(SuretyError::NotFound(_))));

        let late = f.ledger.buy(
            &f.flights,
            &mut f.airlines,
            &AccountId::new("p2"),
            &f.key.clone(),
            1,
            NOW + 3600,
        );
        assert!(matches!(late, Err(SuretyError::PreconditionFailed(_))));
    }

    #[test]
    fn test_credit_round_once() {
        let mut f = fixture();
        buy(&mut f, "p1", 600_000_000).unwrap();
        buy(&mut f, "p2", 400_000_000).unwrap();
        let before = f.airlines.funds(&f.key.airline);

        let round = f.ledger.credit_insurees(&mut f.airlines, &f.key, 150).unwrap();
        assert_eq!(round.total, 1_500_000_000);
        assert_eq!(round.credits[0], (AccountId::new("p1"), 900_000_000));
        assert_eq!(round.credits[1], (AccountId::new("p2"), 600_000_000));
        assert_eq!(f.airlines.funds(&f.key.airline), before - 1_500_000_000);
        assert_eq!(f.ledger.eligible_count(&f.key), 0);

        let again = f.ledger.credit_insurees(&mut f.airlines, &f.key, 150);
        assert!(matches!(again, Err(SuretyError::PreconditionFailed(_))));
        assert_eq!(f.ledger.amount_to_be_received(&AccountId::new("p1")), 900_000_000);
    }

    #[test]
    fn test_overdraw_leaves_policies_uncredited() {
        let mut f = fixture();
        buy(&mut f, "p1", UNIT).unwrap();
        assert_eq!(f.ledger.round_total(&f.key, 2000).unwrap(), 20 * UNIT);
        assert!(f.ledger.round_total(&f.key, 2000).unwrap() > f.airlines.funds(&f.key.airline));
        let round = f.ledger.credit_insurees(&mut f.airlines, &f.key, 2000);
        assert!(matches!(round, Err(SuretyError::PreconditionFailed(_))));
        assert_eq!(f.ledger.eligible_count(&f.key), 1);
        assert_eq!(f.ledger.amount_to_be_received(&AccountId::new("p1")), 0);
    }

    #[test]
    fn test_take_balance_zeroes() {
        let mut f = fixture();
        let p1 = AccountId::new("p1");
        assert!(f.ledger.take_balance(&p1).is_err());
        buy(&mut f, "p1", UNIT).unwrap();
        f.ledger.credit_insurees(&mut f.airlines, &f.key, 150).unwrap();
        assert_eq!(f.ledger.take_balance(&p1).unwrap(), 1_500_000_000);
        assert_eq!(f.ledger.amount_to_be_received(&p1), 0);
        assert!(f.ledger.take_balance(&p1).is_err());
    }

    #[test]
    fn test_policies_of() {
        let mut f = fixture();
        buy(&mut f, "p1", 10).unwrap();
        let policies = f.ledger.policies_of(&AccountId::new("p1"));
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].flight, f.key);
        assert!(f.ledger.policies_of(&AccountId::new("p9")).is_empty());
    }
}
