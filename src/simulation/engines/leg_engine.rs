use crate::simulation::agents::{LegHandler, SimulationAgent};
use crate::simulation::config::Simulation;
use crate::simulation::engines::network_engine::NetworkEngine;
use crate::simulation::engines::passenger_queue::PassengerQueue;
use crate::simulation::engines::teleportation_engine::TeleportationEngine;
use crate::simulation::events::{
    EventsManager, PersonDepartureEventBuilder, PersonEntersVehicleEventBuilder,
    SynchronizationTimeoutEventBuilder,
};
use crate::simulation::id::Id;
use crate::simulation::network::Network;
use crate::simulation::population::InternalPerson;
use crate::simulation::time_queue::Identifiable;
use crate::simulation::vehicles::InternalVehicle;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Dispatches departing agents by the handler of their leg. Independent legs go to the network or
/// are teleported. Drivers and passengers wait for each other at the pick-up link, each for a bounded
/// time.
pub struct LegEngine {
    network_engine: NetworkEngine,
    teleportation_engine: TeleportationEngine,
    passenger_queue: PassengerQueue,
    events: Rc<RefCell<EventsManager>>,
    main_modes: Vec<String>,
    min_wait_time: u32,
    maximum_detour_fraction: f64,
    timeouts: usize,
}

impl LegEngine {
    pub fn new(
        network: Arc<Network>,
        events: Rc<RefCell<EventsManager>>,
        config: &Simulation,
        maximum_detour_fraction: f64,
    ) -> Self {
        LegEngine {
            network_engine: NetworkEngine::new(network, events.clone()),
            teleportation_engine: TeleportationEngine::new(events.clone()),
            passenger_queue: PassengerQueue::new(),
            events,
            main_modes: config.main_modes.clone(),
            min_wait_time: config.min_wait_time,
            maximum_detour_fraction,
            timeouts: 0,
        }
    }

    /// Agents whose leg ends at `now`.
    pub(crate) fn do_step(&mut self, now: u32) -> Vec<SimulationAgent> {
        let mut arrived = self.network_engine.do_step(now);
        arrived.extend(self.teleportation_engine.do_step(now));
        arrived
    }

    /// Starts the legs of the departing agents. Agents whose leg ends within the same second are
    /// returned.
    pub(crate) fn receive_departures(
        &mut self,
        now: u32,
        agents: Vec<SimulationAgent>,
    ) -> Vec<SimulationAgent> {
        let mut arrived = Vec::new();
        for agent in agents {
            match agent.leg_handler() {
                LegHandler::Independent => arrived.extend(self.depart_independent(now, agent)),
                LegHandler::Driver => arrived.extend(self.depart_driver(now, agent)),
                LegHandler::Passenger => self.wait_for_driver(now, agent),
            }
        }
        arrived.extend(self.release_drivers(now));
        arrived
    }

    /// Passengers whose driver did not show up in time are teleported to their drop-off link.
    pub(crate) fn check_timeouts(&mut self, now: u32) -> Vec<SimulationAgent> {
        let mut arrived = Vec::new();
        for agent in self.passenger_queue.expire(now) {
            let route = agent
                .curr_leg()
                .passenger_route()
                .unwrap_or_else(|| panic!("Agent {} is not on a passenger leg.", agent.id()));
            debug!(
                person = %agent.id(),
                driver = %route.driver(),
                "Synchronization timeout at {now}"
            );
            self.events.borrow_mut().publish_event(
                &SynchronizationTimeoutEventBuilder::default()
                    .time(now)
                    .person(agent.id().clone())
                    .driver(route.driver().clone())
                    .link(route.generic_delegate().start_link().clone())
                    .build()
                    .unwrap(),
            );
            self.timeouts += 1;

            self.publish_departure(now, &agent);
            arrived.extend(self.teleportation_engine.receive_agent(now, agent));
        }
        arrived.extend(self.release_drivers(now));
        arrived
    }

    pub fn timeouts(&self) -> usize {
        self.timeouts
    }

    /// Number of agents currently on a leg, waiting passengers and drivers included.
    pub fn agents_en_route(&self) -> usize {
        self.network_engine.len() + self.teleportation_engine.len() + self.passenger_queue.len()
    }

    fn depart_independent(&mut self, now: u32, agent: SimulationAgent) -> Vec<SimulationAgent> {
        self.publish_departure(now, &agent);

        let leg = agent.curr_leg();
        let on_network = self.main_modes.contains(&leg.mode.external().to_string())
            && leg.route.as_ref().and_then(|r| r.as_network()).is_some();
        if on_network {
            let vehicle = InternalVehicle::new(InternalVehicle::id_for(&agent), agent);
            self.publish_enters_vehicle(now, vehicle.driver().id(), &vehicle.id);
            self.network_engine.receive_vehicle(now, vehicle)
        } else {
            self.teleportation_engine
                .receive_agent(now, agent)
                .into_iter()
                .collect()
        }
    }

    /// A driver whose passengers are not all at the pick-up link yet waits for them.
    fn depart_driver(&mut self, now: u32, agent: SimulationAgent) -> Vec<SimulationAgent> {
        if self.passenger_queue.all_present(&agent) {
            return self.drive_off(now, agent);
        }
        let deadline = self.wait_deadline(now, &agent);
        debug!(person = %agent.id(), "Driver waits for passengers until {deadline}");
        self.passenger_queue.hold_driver(agent, deadline);
        Vec::new()
    }

    fn release_drivers(&mut self, now: u32) -> Vec<SimulationAgent> {
        let mut arrived = Vec::new();
        for agent in self.passenger_queue.release_drivers(now) {
            arrived.extend(self.drive_off(now, agent));
        }
        arrived
    }

    fn drive_off(&mut self, now: u32, agent: SimulationAgent) -> Vec<SimulationAgent> {
        self.publish_departure(now, &agent);

        let route = agent
            .curr_leg()
            .driver_route()
            .unwrap_or_else(|| panic!("Agent {} is not on a driver leg.", agent.id()));
        let start_link = route.network_delegate().generic_delegate().start_link().clone();
        let boarding = self
            .passenger_queue
            .board(&start_link, agent.id(), route.passengers());

        let mut vehicle = InternalVehicle::new(InternalVehicle::id_for(&agent), agent);
        self.publish_enters_vehicle(now, vehicle.driver().id(), &vehicle.id);
        for passenger in boarding {
            self.publish_departure(now, &passenger);
            self.publish_enters_vehicle(now, passenger.id(), &vehicle.id);
            vehicle.passengers.push(passenger);
        }
        self.network_engine.receive_vehicle(now, vehicle)
    }

    /// The passenger waits silently. Its departure is published once it boards, or once it gives
    /// up waiting.
    fn wait_for_driver(&mut self, now: u32, agent: SimulationAgent) {
        let deadline = self.wait_deadline(now, &agent);
        self.passenger_queue.register(agent, deadline);
    }

    /// Waiting ends after the minimum wait time plus the admissible detour of the shared leg.
    fn wait_deadline(&self, now: u32, agent: &SimulationAgent) -> u32 {
        let shared_travel_time = agent.curr_leg().travel_time();
        now + self.min_wait_time
            + (self.maximum_detour_fraction * shared_travel_time as f64).ceil() as u32
    }

    fn publish_departure(&mut self, now: u32, agent: &SimulationAgent) {
        let leg = agent.curr_leg();
        let link = leg
            .route
            .as_ref()
            .map(|r| r.start_link().clone())
            .unwrap_or_else(|| panic!("Leg of agent {} has no route.", agent.id()));
        self.events.borrow_mut().publish_event(
            &PersonDepartureEventBuilder::default()
                .time(now)
                .person(agent.id().clone())
                .link(link)
                .leg_mode(leg.mode.clone())
                .routing_mode(leg.routing_mode.clone().unwrap_or_else(|| leg.mode.clone()))
                .build()
                .unwrap(),
        );
    }

    fn publish_enters_vehicle(
        &mut self,
        now: u32,
        person: &Id<InternalPerson>,
        vehicle: &Id<InternalVehicle>,
    ) {
        self.events.borrow_mut().publish_event(
            &PersonEntersVehicleEventBuilder::default()
                .time(now)
                .person(person.clone())
                .vehicle(vehicle.clone())
                .build()
                .unwrap(),
        );
    }
}
