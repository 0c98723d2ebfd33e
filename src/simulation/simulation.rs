use crate::simulation::agents::{LegHandler, SimulationAgent};
use crate::simulation::config::Config;
use crate::simulation::engines::activity_engine::ActivityEngine;
use crate::simulation::engines::leg_engine::LegEngine;
use crate::simulation::events::EventsManager;
use crate::simulation::network::Network;
use crate::simulation::population::Population;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SimulationSummary {
    pub agents: usize,
    /// Agents on a leg or waiting for their driver when the simulation ended.
    pub agents_en_route: usize,
    pub synchronization_timeouts: usize,
}

/// Time stepped movement simulation of the selected plans. All state transitions happen at whole
/// seconds.
pub struct Simulation {
    activity_engine: ActivityEngine,
    leg_engine: LegEngine,
    events: Rc<RefCell<EventsManager>>,
    agents: usize,
    start_time: u32,
    end_time: u32,
}

impl Simulation {
    pub fn new(
        config: &Config,
        network: Arc<Network>,
        population: &Population,
        events: Rc<RefCell<EventsManager>>,
    ) -> Self {
        let simulation = config.simulation();
        let agents: Vec<SimulationAgent> = population
            .persons
            .values()
            .filter(|p| p.total_elements() > 0)
            .map(|p| SimulationAgent::new(p.clone()))
            .collect();
        let agent_count = agents.len();

        Simulation {
            activity_engine: ActivityEngine::new(agents, simulation.start_time, events.clone()),
            leg_engine: LegEngine::new(
                network,
                events.clone(),
                &simulation,
                config.joint_trips().maximum_detour_fraction,
            ),
            events,
            agents: agent_count,
            start_time: simulation.start_time,
            end_time: simulation.end_time,
        }
    }

    #[instrument(level = "info", skip(self))]
    pub fn run(&mut self) -> SimulationSummary {
        let mut now = self.start_time;
        info!(
            "Starting simulation. Start time {}, End time {}",
            self.start_time, self.end_time
        );

        while now <= self.end_time {
            if now % 3600 == 0 {
                debug!(
                    "Simulation at {}:00. Agents en route: {}",
                    now / 3600,
                    self.leg_engine.agents_en_route()
                );
            }
            self.do_step(now);
            now = self.next_time(now);
        }

        self.events.borrow_mut().finish();
        let summary = SimulationSummary {
            agents: self.agents,
            agents_en_route: self.leg_engine.agents_en_route(),
            synchronization_timeouts: self.leg_engine.timeouts(),
        };
        info!(?summary, "Simulation finished");
        summary
    }

    /// Arrivals are processed before departures. Agents whose next activity or leg takes no time
    /// are handled within the same step until no agent moves anymore. Passengers depart before
    /// drivers, so that a driver meets a passenger departing in the same second. Timeouts are
    /// checked last.
    pub(crate) fn do_step(&mut self, now: u32) {
        let mut arrived = self.leg_engine.do_step(now);

        loop {
            for agent in &mut arrived {
                agent.advance_plan();
            }
            let mut departing = self.activity_engine.do_step(now, arrived);

            if departing.is_empty() {
                arrived = self.leg_engine.check_timeouts(now);
                if arrived.is_empty() {
                    break;
                }
                continue;
            }

            for agent in &mut departing {
                agent.advance_plan();
            }
            departing.sort_by_key(|a| a.leg_handler() != LegHandler::Passenger);
            arrived = self.leg_engine.receive_departures(now, departing);
        }
    }

    /// Without agents on the move, nothing happens until the next activity ends.
    fn next_time(&self, now: u32) -> u32 {
        if self.leg_engine.agents_en_route() > 0 {
            return now + 1;
        }
        match self.activity_engine.next_wakeup() {
            Some(wakeup) => wakeup.max(now + 1),
            None => self.end_time.saturating_add(1).max(now + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::config::{Config, Simulation as SimulationConfig};
    use crate::simulation::events::EventsManager;
    use crate::simulation::id::Id;
    use crate::simulation::population::{
        DriverRoute, InternalActivity, InternalGenericRoute, InternalLeg, InternalNetworkRoute,
        InternalPerson, InternalPlan, InternalRoute, PassengerRoute, Population, DRIVER_MODE,
        PASSENGER_MODE,
    };
    use crate::simulation::simulation::Simulation;
    use crate::test_utils::{record_events, three_link_network, RecordedEvent};
    use std::cell::RefCell;
    use std::collections::BTreeSet;
    use std::rc::Rc;
    use std::sync::Arc;

    const PREFIX: &str = "sim";

    fn link(name: &str) -> Id<crate::simulation::network::Link> {
        Id::create(&format!("{PREFIX}-{name}"))
    }

    fn act(act_type: &str, link_name: &str, end_time: Option<u32>) -> InternalActivity {
        InternalActivity::new(0., 0., act_type, link(link_name), None, end_time, None)
    }

    fn population(driver_departure: u32) -> Population {
        let driver_id = Id::create("sim-driver");
        let passenger_id = Id::create("sim-passenger");

        let mut driver_plan = InternalPlan::default();
        driver_plan.add_act(act("home", "l1", Some(driver_departure)));
        driver_plan.add_leg(InternalLeg::new(
            InternalRoute::Driver(DriverRoute::new(
                InternalNetworkRoute::new(
                    InternalGenericRoute::new(link("l1"), link("l3"), Some(20), Some(200.), None),
                    vec![link("l1"), link("l2"), link("l3")],
                ),
                BTreeSet::from([passenger_id.clone()]),
            )),
            DRIVER_MODE,
            20,
            Some(driver_departure),
        ));
        driver_plan.add_act(act("work", "l3", None));

        let mut passenger_plan = InternalPlan::default();
        passenger_plan.add_act(act("home", "l1", Some(50)));
        let generic = InternalGenericRoute::new(link("l1"), link("l3"), Some(20), Some(200.), None);
        let walk = InternalLeg::new(InternalRoute::Generic(generic.clone()), "walk", 150, None);
        passenger_plan.add_leg(InternalLeg::new(
            InternalRoute::Passenger(PassengerRoute::new(generic, driver_id.clone(), walk)),
            PASSENGER_MODE,
            20,
            Some(100),
        ));
        passenger_plan.add_act(act("work", "l3", None));

        let mut population = Population::new();
        population.add_person(InternalPerson::new(driver_id, driver_plan));
        population.add_person(InternalPerson::new(passenger_id, passenger_plan));
        population
    }

    fn run(driver_departure: u32) -> (Vec<RecordedEvent>, usize) {
        let mut config = Config::default();
        config.set_simulation(SimulationConfig {
            start_time: 0,
            end_time: 2000,
            ..SimulationConfig::default()
        });
        let mut events = EventsManager::new();
        let recorded = record_events(&mut events);
        let mut simulation = Simulation::new(
            &config,
            Arc::new(three_link_network(PREFIX)),
            &population(driver_departure),
            Rc::new(RefCell::new(events)),
        );
        let summary = simulation.run();
        assert_eq!(0, summary.agents_en_route);
        let recorded = recorded.borrow().clone();
        (recorded, summary.synchronization_timeouts)
    }

    fn of(events: &[RecordedEvent], person: &str, type_: &str) -> Vec<u32> {
        events
            .iter()
            .filter(|e| e.person.as_deref() == Some(person) && e.type_ == type_)
            .map(|e| e.time)
            .collect()
    }

    #[test]
    fn passenger_rides_with_driver() {
        let (events, timeouts) = run(100);
        assert_eq!(0, timeouts);

        assert_eq!(vec![100], of(&events, "sim-passenger", "departure"));
        assert_eq!(vec![120], of(&events, "sim-passenger", "arrival"));
        assert_eq!(vec![100], of(&events, "sim-driver", "departure"));
        assert_eq!(vec![120], of(&events, "sim-driver", "arrival"));
        assert_eq!(vec![100], of(&events, "sim-passenger", "PersonEntersVehicle"));

        // link events belong to the vehicle only
        let link_events = events
            .iter()
            .filter(|e| e.type_ == "entered link" || e.type_ == "left link")
            .count();
        assert_eq!(4, link_events);
        assert!(events
            .iter()
            .filter(|e| e.type_ == "entered link")
            .all(|e| e.person.is_none()));
    }

    #[test]
    fn passenger_times_out() {
        let (events, timeouts) = run(1000);
        assert_eq!(1, timeouts);

        assert_eq!(vec![355], of(&events, "sim-passenger", "synchronization timeout"));
        assert_eq!(vec![355], of(&events, "sim-passenger", "departure"));
        assert_eq!(vec![375], of(&events, "sim-passenger", "arrival"));
        assert_eq!(vec![1020], of(&events, "sim-driver", "arrival"));
        assert!(of(&events, "sim-passenger", "PersonEntersVehicle").is_empty());
    }

    #[test]
    fn driver_waits_for_passenger() {
        let (events, timeouts) = run(20);
        assert_eq!(0, timeouts);

        assert_eq!(vec![20], of(&events, "sim-driver", "actend"));
        assert_eq!(vec![50], of(&events, "sim-driver", "departure"));
        assert_eq!(vec![50], of(&events, "sim-passenger", "PersonEntersVehicle"));
        assert_eq!(vec![70], of(&events, "sim-passenger", "arrival"));
        assert_eq!(vec![70], of(&events, "sim-driver", "arrival"));
    }

    #[test]
    fn activities_start_and_end() {
        let (events, _) = run(100);
        assert_eq!(vec![100], of(&events, "sim-driver", "actend"));
        assert_eq!(vec![120], of(&events, "sim-driver", "actstart"));
        assert_eq!(vec![50], of(&events, "sim-passenger", "actend"));
    }
}
