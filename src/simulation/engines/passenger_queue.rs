use crate::simulation::agents::{RideState, SimulationAgent};
use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::population::InternalPerson;
use crate::simulation::time_queue::Identifiable;
use std::collections::{BTreeMap, BTreeSet};

/// Pick-up link and driver of a joint trip.
type RideKey = (Id<Link>, Id<InternalPerson>);

struct Waiting {
    agent: SimulationAgent,
    deadline: u32,
}

/// Passengers waiting for their driver and drivers waiting for their passengers, keyed by (pick-up
/// link, driver). Waiting is a state kept across simulation steps, nothing blocks.
#[derive(Default)]
pub struct PassengerQueue {
    waiting: BTreeMap<RideKey, Vec<Waiting>>,
    drivers: BTreeMap<RideKey, Waiting>,
    gave_up: BTreeSet<(RideKey, Id<InternalPerson>)>,
}

fn passenger_key(agent: &SimulationAgent) -> RideKey {
    let route = agent
        .curr_leg()
        .passenger_route()
        .unwrap_or_else(|| panic!("Agent {} is not on a passenger leg.", agent.id()));
    (
        route.generic_delegate().start_link().clone(),
        route.driver().clone(),
    )
}

fn driver_key(agent: &SimulationAgent) -> RideKey {
    let route = agent
        .curr_leg()
        .driver_route()
        .unwrap_or_else(|| panic!("Agent {} is not on a driver leg.", agent.id()));
    (
        route.network_delegate().generic_delegate().start_link().clone(),
        agent.id().clone(),
    )
}

impl PassengerQueue {
    pub fn new() -> Self {
        PassengerQueue::default()
    }

    /// Parks a passenger at its pick-up link until `deadline`.
    pub fn register(&mut self, mut agent: SimulationAgent, deadline: u32) {
        let key = passenger_key(&agent);
        agent.set_ride_state(RideState::AwaitingPickup);
        self.waiting
            .entry(key)
            .or_default()
            .push(Waiting { agent, deadline });
    }

    /// Whether every passenger of the driver leg of `driver` either waits at its pick-up link or
    /// has already given up waiting.
    pub fn all_present(&self, driver: &SimulationAgent) -> bool {
        let key = driver_key(driver);
        let passengers = driver
            .curr_leg()
            .driver_route()
            .map(|r| r.passengers())
            .unwrap_or_else(|| panic!("Agent {} is not on a driver leg.", driver.id()));
        let waiting = self.waiting.get(&key);
        passengers.iter().all(|p| {
            waiting.is_some_and(|ws| ws.iter().any(|w| w.agent.id() == p))
                || self.gave_up.contains(&(key.clone(), p.clone()))
        })
    }

    /// Parks a driver at its pick-up link until all of its passengers are present, or until
    /// `deadline`.
    pub fn hold_driver(&mut self, agent: SimulationAgent, deadline: u32) {
        let key = driver_key(&agent);
        self.drivers.insert(key, Waiting { agent, deadline });
    }

    /// Removes and returns the held drivers who may leave at `now`, ordered by pick-up link and
    /// driver.
    pub fn release_drivers(&mut self, now: u32) -> Vec<SimulationAgent> {
        let ready: Vec<RideKey> = self
            .drivers
            .iter()
            .filter(|(_, d)| d.deadline <= now || self.all_present(&d.agent))
            .map(|(key, _)| key.clone())
            .collect();
        ready
            .into_iter()
            .filter_map(|key| self.drivers.remove(&key))
            .map(|d| d.agent)
            .collect()
    }

    /// Removes the passengers of `driver` waiting at `link` who are part of `passengers`. The
    /// boarded agents are `Riding` afterwards.
    pub fn board(
        &mut self,
        link: &Id<Link>,
        driver: &Id<InternalPerson>,
        passengers: &BTreeSet<Id<InternalPerson>>,
    ) -> Vec<SimulationAgent> {
        let key = (link.clone(), driver.clone());
        self.gave_up
            .retain(|(k, p)| k != &key || !passengers.contains(p));
        let Some(waiting) = self.waiting.remove(&key) else {
            return Vec::new();
        };
        let (boarding, remaining): (Vec<_>, Vec<_>) = waiting
            .into_iter()
            .partition(|w| passengers.contains(w.agent.id()));
        if !remaining.is_empty() {
            self.waiting.insert(key, remaining);
        }
        boarding
            .into_iter()
            .map(|w| {
                let mut agent = w.agent;
                agent.set_ride_state(RideState::Riding);
                agent
            })
            .collect()
    }

    /// Removes and returns all passengers whose deadline is reached, ordered by pick-up link and
    /// driver. Their drivers no longer wait for them.
    pub fn expire(&mut self, now: u32) -> Vec<SimulationAgent> {
        let mut expired = Vec::new();
        let gave_up = &mut self.gave_up;
        self.waiting.retain(|key, waiting| {
            let (due, rest): (Vec<_>, Vec<_>) =
                std::mem::take(waiting).into_iter().partition(|w| w.deadline <= now);
            for w in due {
                gave_up.insert((key.clone(), w.agent.id().clone()));
                expired.push(w.agent);
            }
            *waiting = rest;
            !waiting.is_empty()
        });
        expired
    }

    /// Waiting passengers and held drivers.
    pub fn len(&self) -> usize {
        self.waiting.values().map(|w| w.len()).sum::<usize>() + self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::agents::{RideState, SimulationAgent};
    use crate::simulation::engines::passenger_queue::PassengerQueue;
    use crate::simulation::id::Id;
    use crate::simulation::population::{
        DriverRoute, InternalActivity, InternalGenericRoute, InternalLeg, InternalNetworkRoute,
        InternalPerson, InternalPlan, InternalRoute, PassengerRoute,
    };
    use crate::simulation::time_queue::Identifiable;
    use std::collections::BTreeSet;

    fn passenger(id: &str, driver: &str) -> SimulationAgent {
        let mut plan = InternalPlan::default();
        plan.add_act(InternalActivity::new(
            0.,
            0.,
            "pick_up",
            Id::create("pq-l1"),
            None,
            None,
            Some(0),
        ));
        let generic = InternalGenericRoute::new(
            Id::create("pq-l1"),
            Id::create("pq-l3"),
            Some(20),
            Some(200.),
            None,
        );
        let walk = InternalLeg::new(InternalRoute::Generic(generic.clone()), "walk", 150, None);
        plan.add_leg(InternalLeg::new(
            InternalRoute::Passenger(PassengerRoute::new(generic, Id::create(driver), walk)),
            "passenger",
            20,
            None,
        ));
        plan.add_act(InternalActivity::new(
            0.,
            0.,
            "drop_off",
            Id::create("pq-l3"),
            None,
            None,
            Some(0),
        ));
        let mut agent = SimulationAgent::new(InternalPerson::new(Id::create(id), plan));
        agent.advance_plan();
        agent
    }

    fn driver(id: &str, passengers: &[&str]) -> SimulationAgent {
        let mut plan = InternalPlan::default();
        plan.add_act(InternalActivity::new_stage("pick_up", Id::create("pq-l1"), 0., 0.));
        plan.add_leg(InternalLeg::new(
            InternalRoute::Driver(DriverRoute::new(
                InternalNetworkRoute::new(
                    InternalGenericRoute::new(
                        Id::create("pq-l1"),
                        Id::create("pq-l3"),
                        Some(20),
                        Some(200.),
                        None,
                    ),
                    vec![Id::create("pq-l1"), Id::create("pq-l2"), Id::create("pq-l3")],
                ),
                passengers.iter().map(|p| Id::create(p)).collect(),
            )),
            "driver",
            20,
            None,
        ));
        plan.add_act(InternalActivity::new_stage("drop_off", Id::create("pq-l3"), 0., 0.));
        let mut agent = SimulationAgent::new(InternalPerson::new(Id::create(id), plan));
        agent.advance_plan();
        agent
    }

    #[test]
    fn driver_waits_until_all_passengers_are_present() {
        let mut queue = PassengerQueue::new();
        let held = driver("pq-hd", &["pq-h1", "pq-h2"]);
        assert!(!queue.all_present(&held));
        queue.hold_driver(held, 400);

        queue.register(passenger("pq-h1", "pq-hd"), 400);
        assert!(queue.release_drivers(10).is_empty());
        assert_eq!(2, queue.len());

        queue.register(passenger("pq-h2", "pq-hd"), 400);
        let released = queue.release_drivers(11);
        assert_eq!(1, released.len());
        assert_eq!("pq-hd", released[0].id().external());
        assert_eq!(2, queue.len());
    }

    #[test]
    fn driver_leaves_at_deadline() {
        let mut queue = PassengerQueue::new();
        queue.hold_driver(driver("pq-dd", &["pq-late"]), 300);
        assert!(queue.release_drivers(299).is_empty());
        assert_eq!(1, queue.release_drivers(300).len());
        assert!(queue.is_empty());
    }

    #[test]
    fn passenger_who_gave_up_is_not_waited_for() {
        let mut queue = PassengerQueue::new();
        queue.register(passenger("pq-g1", "pq-gd"), 50);
        assert_eq!(1, queue.expire(50).len());

        let gd = driver("pq-gd", &["pq-g1"]);
        assert!(queue.all_present(&gd));
        let passengers = BTreeSet::from([Id::create("pq-g1")]);
        assert!(queue
            .board(&Id::create("pq-l1"), &Id::create("pq-gd"), &passengers)
            .is_empty());

        // the next ride of the same pair waits again
        assert!(!queue.all_present(&gd));
    }

    #[test]
    fn board_only_own_passengers() {
        let mut queue = PassengerQueue::new();
        queue.register(passenger("pq-p1", "pq-d"), 100);
        queue.register(passenger("pq-p2", "pq-d"), 100);
        queue.register(passenger("pq-p3", "pq-other"), 100);
        assert_eq!(3, queue.len());

        let passengers = BTreeSet::from([Id::create("pq-p1")]);
        let boarded = queue.board(&Id::create("pq-l1"), &Id::create("pq-d"), &passengers);
        assert_eq!(1, boarded.len());
        assert_eq!("pq-p1", boarded[0].id().external());
        assert_eq!(RideState::Riding, boarded[0].ride_state());
        assert_eq!(2, queue.len());

        let none = queue.board(&Id::create("pq-l2"), &Id::create("pq-d"), &passengers);
        assert!(none.is_empty());
    }

    #[test]
    fn expire_at_deadline() {
        let mut queue = PassengerQueue::new();
        queue.register(passenger("pq-e1", "pq-d"), 50);
        queue.register(passenger("pq-e2", "pq-d"), 60);

        assert!(queue.expire(49).is_empty());
        let expired = queue.expire(50);
        assert_eq!(1, expired.len());
        assert_eq!(RideState::AwaitingPickup, expired[0].ride_state());
        assert_eq!(1, queue.len());

        assert_eq!(1, queue.expire(100).len());
        assert!(queue.is_empty());
    }
}
