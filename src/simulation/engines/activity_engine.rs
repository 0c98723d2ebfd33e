use crate::simulation::agents::SimulationAgent;
use crate::simulation::events::{
    ActivityEndEventBuilder, ActivityStartEventBuilder, EventsManager,
};
use crate::simulation::time_queue::{EndTime, Identifiable, TimeQueue};
use std::cell::RefCell;
use std::rc::Rc;

/// Holds agents performing an activity until the activity ends. Agents on their last activity
/// stay until the simulation ends.
pub struct ActivityEngine {
    asleep_q: TimeQueue<AsleepSimulationAgent>,
    finished: Vec<SimulationAgent>,
    events: Rc<RefCell<EventsManager>>,
}

impl ActivityEngine {
    /// The agents start with their first activity. No start events are published for it.
    pub fn new(agents: Vec<SimulationAgent>, now: u32, events: Rc<RefCell<EventsManager>>) -> Self {
        let mut engine = ActivityEngine {
            asleep_q: TimeQueue::new(),
            finished: Vec::new(),
            events,
        };
        for agent in agents {
            engine.park(agent, now);
        }
        engine
    }

    /// Starts the activities of the arriving agents and returns all agents whose activity ends at
    /// `now`. Activities without duration end within the same call.
    pub(crate) fn do_step(&mut self, now: u32, agents: Vec<SimulationAgent>) -> Vec<SimulationAgent> {
        for agent in agents {
            self.receive_agent(now, agent);
        }

        let ending = self.asleep_q.pop(now);
        let mut res = Vec::with_capacity(ending.len());
        for asleep in ending {
            let agent = asleep.agent;
            let act = agent.curr_act();
            self.events.borrow_mut().publish_event(
                &ActivityEndEventBuilder::default()
                    .time(now)
                    .person(agent.id().clone())
                    .link(act.link_id.clone())
                    .act_type(act.act_type.clone())
                    .build()
                    .unwrap(),
            );
            res.push(agent);
        }
        res
    }

    pub fn next_wakeup(&self) -> Option<u32> {
        self.asleep_q.next_end_time()
    }

    /// Agents currently performing an activity, the finished ones included.
    pub fn len(&self) -> usize {
        self.asleep_q.len() + self.finished.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn receive_agent(&mut self, now: u32, agent: SimulationAgent) {
        let act = agent.curr_act();
        self.events.borrow_mut().publish_event(
            &ActivityStartEventBuilder::default()
                .time(now)
                .person(agent.id().clone())
                .link(act.link_id.clone())
                .act_type(act.act_type.clone())
                .build()
                .unwrap(),
        );
        self.park(agent, now);
    }

    fn park(&mut self, agent: SimulationAgent, now: u32) {
        if agent.has_next_element() {
            self.asleep_q.add(AsleepSimulationAgent::build(agent, now), now);
        } else {
            self.finished.push(agent);
        }
    }
}

struct AsleepSimulationAgent {
    agent: SimulationAgent,
    wakeup_time: u32,
}

impl AsleepSimulationAgent {
    fn build(agent: SimulationAgent, now: u32) -> Self {
        // activities which should have ended already end right away
        let wakeup_time = agent.wakeup_time(now).max(now);
        AsleepSimulationAgent { agent, wakeup_time }
    }
}

impl EndTime for AsleepSimulationAgent {
    fn end_time(&self, _now: u32) -> u32 {
        self.wakeup_time
    }
}
