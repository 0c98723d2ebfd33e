use crate::simulation::agents::{RideState, SimulationAgent};
use crate::simulation::events::{
    EventsManager, LinkEnterEventBuilder, LinkLeaveEventBuilder, PersonArrivalEventBuilder,
    PersonLeavesVehicleEventBuilder,
};
use crate::simulation::network::Network;
use crate::simulation::time_queue::{EndTime, Identifiable, TimeQueue};
use crate::simulation::vehicles::InternalVehicle;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// A vehicle on its current link, waiting until it may leave it.
struct MovingVehicle {
    vehicle: InternalVehicle,
    exit_time: u32,
}

impl EndTime for MovingVehicle {
    fn end_time(&self, _now: u32) -> u32 {
        self.exit_time
    }
}

/// Moves vehicles link by link with free speed. Only vehicles produce link events, passengers ride
/// along without events of their own.
pub struct NetworkEngine {
    network: Arc<Network>,
    queue: TimeQueue<MovingVehicle>,
    events: Rc<RefCell<EventsManager>>,
}

impl NetworkEngine {
    pub fn new(network: Arc<Network>, events: Rc<RefCell<EventsManager>>) -> Self {
        NetworkEngine {
            network,
            queue: TimeQueue::new(),
            events,
        }
    }

    /// Puts a departing vehicle onto its start link. The vehicle leaves the start link right away.
    /// A route consisting of the start link only ends immediately, in which case the agents are
    /// returned.
    pub fn receive_vehicle(&mut self, now: u32, vehicle: InternalVehicle) -> Vec<SimulationAgent> {
        self.move_vehicle(now, vehicle)
    }

    pub fn do_step(&mut self, now: u32) -> Vec<SimulationAgent> {
        let mut arrived = Vec::new();
        for moving in self.queue.pop(now) {
            arrived.extend(self.move_vehicle(now, moving.vehicle));
        }
        arrived
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    fn move_vehicle(&mut self, now: u32, mut vehicle: InternalVehicle) -> Vec<SimulationAgent> {
        let Some(next) = vehicle.peek_next_link_id().cloned() else {
            return self.arrive(now, vehicle);
        };
        let curr = vehicle
            .curr_link_id()
            .cloned()
            .unwrap_or_else(|| panic!("Vehicle {} is not on a link.", vehicle.id));

        let mut events = self.events.borrow_mut();
        events.publish_event(
            &LinkLeaveEventBuilder::default()
                .time(now)
                .link(curr)
                .vehicle(vehicle.id.clone())
                .build()
                .unwrap(),
        );
        events.publish_event(
            &LinkEnterEventBuilder::default()
                .time(now)
                .link(next.clone())
                .vehicle(vehicle.id.clone())
                .build()
                .unwrap(),
        );
        drop(events);

        vehicle.register_moved_to_next_link();
        let exit_time = now + self.network.link_travel_time(&next);
        self.queue.add(MovingVehicle { vehicle, exit_time }, now);
        Vec::new()
    }

    fn arrive(&mut self, now: u32, vehicle: InternalVehicle) -> Vec<SimulationAgent> {
        let veh_id = vehicle.id.clone();
        let mut agents = vehicle.into_agents();
        let mut events = self.events.borrow_mut();

        for (i, agent) in agents.iter_mut().enumerate() {
            if i > 0 {
                agent.set_curr_route_element_to_last();
                agent.set_ride_state(RideState::AwaitingDropoff);
            }
            let leg = agent.curr_leg();
            let link = leg
                .route
                .as_ref()
                .map(|r| r.end_link().clone())
                .unwrap_or_else(|| panic!("Leg of agent {} has no route.", agent.id()));

            events.publish_event(
                &PersonLeavesVehicleEventBuilder::default()
                    .time(now)
                    .person(agent.id().clone())
                    .vehicle(veh_id.clone())
                    .build()
                    .unwrap(),
            );
            events.publish_event(
                &PersonArrivalEventBuilder::default()
                    .time(now)
                    .person(agent.id().clone())
                    .link(link)
                    .leg_mode(leg.mode.clone())
                    .build()
                    .unwrap(),
            );
        }
        agents
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::agents::SimulationAgent;
    use crate::simulation::engines::network_engine::NetworkEngine;
    use crate::simulation::events::EventsManager;
    use crate::simulation::id::Id;
    use crate::simulation::population::{
        InternalActivity, InternalGenericRoute, InternalLeg, InternalNetworkRoute, InternalPerson,
        InternalPlan, InternalRoute,
    };
    use crate::simulation::vehicles::InternalVehicle;
    use crate::test_utils::{record_events, three_link_network};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn driver(prefix: &str, links: &[&str]) -> SimulationAgent {
        let route: Vec<Id<_>> = links
            .iter()
            .map(|l| Id::create(&format!("{prefix}-{l}")))
            .collect();
        let mut plan = InternalPlan::default();
        plan.add_act(InternalActivity::new(
            0.,
            0.,
            "home",
            route[0].clone(),
            None,
            Some(0),
            None,
        ));
        plan.add_leg(InternalLeg::new(
            InternalRoute::Network(InternalNetworkRoute::new(
                InternalGenericRoute::new(
                    route[0].clone(),
                    route[route.len() - 1].clone(),
                    Some(20),
                    Some(200.),
                    None,
                ),
                route.clone(),
            )),
            "car",
            20,
            Some(0),
        ));
        plan.add_act(InternalActivity::new(
            0.,
            0.,
            "work",
            route[route.len() - 1].clone(),
            None,
            None,
            None,
        ));
        let mut agent =
            SimulationAgent::new(InternalPerson::new(Id::create(&format!("{prefix}-p")), plan));
        agent.advance_plan();
        agent
    }

    #[test]
    fn free_speed_traversal() {
        let prefix = "net-engine";
        let mut events = EventsManager::new();
        let recorded = record_events(&mut events);
        let mut engine = NetworkEngine::new(
            Arc::new(three_link_network(prefix)),
            Rc::new(RefCell::new(events)),
        );

        let agent = driver(prefix, &["l1", "l2", "l3"]);
        let vehicle = InternalVehicle::new(InternalVehicle::id_for(&agent), agent);
        assert!(engine.receive_vehicle(100, vehicle).is_empty());
        assert!(engine.do_step(109).is_empty());
        assert!(engine.do_step(110).is_empty());
        let arrived = engine.do_step(120);
        assert_eq!(1, arrived.len());
        assert!(engine.is_empty());

        let types: Vec<(&str, u32)> = recorded.borrow().iter().map(|e| (e.type_, e.time)).collect();
        assert_eq!(
            vec![
                ("left link", 100),
                ("entered link", 100),
                ("left link", 110),
                ("entered link", 110),
                ("PersonLeavesVehicle", 120),
                ("arrival", 120),
            ],
            types
        );
    }

    #[test]
    fn single_link_route_arrives_immediately() {
        let prefix = "net-engine-single";
        let mut engine = NetworkEngine::new(
            Arc::new(three_link_network(prefix)),
            Rc::new(RefCell::new(EventsManager::new())),
        );
        let agent = driver(prefix, &["l2"]);
        let vehicle = InternalVehicle::new(InternalVehicle::id_for(&agent), agent);
        assert_eq!(1, engine.receive_vehicle(5, vehicle).len());
        assert_eq!(0, engine.len());
    }
}
