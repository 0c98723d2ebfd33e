use crate::simulation::agents::SimulationAgent;
use crate::simulation::events::{
    EventsManager, PersonArrivalEventBuilder, TeleportationArrivalEventBuilder,
};
use crate::simulation::time_queue::{Identifiable, TimeQueue};
use std::cell::RefCell;
use std::rc::Rc;

/// Moves agents to the end of their leg after the planned travel time, without touching the
/// network.
pub struct TeleportationEngine {
    queue: TimeQueue<SimulationAgent>,
    events: Rc<RefCell<EventsManager>>,
}

impl TeleportationEngine {
    pub fn new(events: Rc<RefCell<EventsManager>>) -> Self {
        TeleportationEngine {
            queue: TimeQueue::new(),
            events,
        }
    }

    /// Returns the agent right away if the leg takes no time.
    pub fn receive_agent(&mut self, now: u32, agent: SimulationAgent) -> Option<SimulationAgent> {
        if agent.curr_leg().travel_time() == 0 {
            return Some(self.arrive(now, agent));
        }
        self.queue.add(agent, now);
        None
    }

    pub fn do_step(&mut self, now: u32) -> Vec<SimulationAgent> {
        self.queue
            .pop(now)
            .into_iter()
            .map(|agent| self.arrive(now, agent))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    fn arrive(&mut self, now: u32, mut agent: SimulationAgent) -> SimulationAgent {
        // the route pointer points to the destination afterwards, whatever kind of route the leg
        // has.
        agent.set_curr_route_element_to_last();

        let leg = agent.curr_leg();
        let route = leg
            .route
            .as_ref()
            .unwrap_or_else(|| panic!("Teleported leg of agent {} has no route.", agent.id()));
        let mut events = self.events.borrow_mut();
        events.publish_event(
            &TeleportationArrivalEventBuilder::default()
                .time(now)
                .person(agent.id().clone())
                .mode(leg.mode.clone())
                .distance(route.as_generic().distance().unwrap_or(0.))
                .build()
                .unwrap(),
        );
        events.publish_event(
            &PersonArrivalEventBuilder::default()
                .time(now)
                .person(agent.id().clone())
                .link(route.end_link().clone())
                .leg_mode(leg.mode.clone())
                .build()
                .unwrap(),
        );
        drop(events);
        agent
    }
}
