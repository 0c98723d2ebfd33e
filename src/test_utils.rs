use crate::simulation::events::{EventTrait, EventsManager};
use crate::simulation::id::Id;
use crate::simulation::network::{Link, Network, Node};
use crate::simulation::population::{InternalPerson, Population};
use crate::simulation::routing::dijkstra::DijkstraRouter;
use crate::simulation::scenario;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

pub use crate::simulation::scenario::{
    corridor_network, couples_social_network, COUPLE_DEPARTURE,
};

pub fn corridor_router(prefix: &str) -> Arc<DijkstraRouter> {
    Arc::new(DijkstraRouter::new(Arc::new(corridor_network(prefix))))
}

/// Driver "{prefix}-driver-{index}" going home -> work by car and passenger
/// "{prefix}-passenger-{index}" walking the same trip. With `shared` the passenger rides with the
/// driver.
pub fn couple_persons(prefix: &str, index: usize, shared: bool) -> (InternalPerson, InternalPerson) {
    scenario::couple_persons(corridor_router(prefix).as_ref(), prefix, index, shared)
        .expect("The corridor connects home and work")
}

pub fn couples_population(prefix: &str, couples: usize, shared: bool) -> Population {
    let mut population = Population::new();
    for i in 0..couples {
        let (driver, passenger) = couple_persons(prefix, i, shared);
        population.add_person(driver);
        population.add_person(passenger);
    }
    population
}

/// Three consecutive links l1 -> l2 -> l3, each 100m long with a free speed of 10 m/s.
pub fn three_link_network(prefix: &str) -> Network {
    let mut network = Network::new();
    let nodes: Vec<Node> = (0..4)
        .map(|i| Node::new(Id::create(&format!("{prefix}-n{i}")), i as f64 * 100., 0.))
        .collect();
    for node in &nodes {
        network.add_node(node.clone());
    }
    for i in 1..4 {
        network.add_link(Link::new(
            Id::create(&format!("{prefix}-l{i}")),
            nodes[i - 1].id.clone(),
            nodes[i].id.clone(),
            100.,
            10.,
        ));
    }
    network
}

/// A simplified view on an event, sufficient for assertions in tests.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub type_: &'static str,
    pub time: u32,
    pub person: Option<String>,
}

/// Registers a catch-all handler recording every published event.
pub fn record_events(events: &mut EventsManager) -> Rc<RefCell<Vec<RecordedEvent>>> {
    let recorded = Rc::new(RefCell::new(Vec::new()));
    let recorded_clone = recorded.clone();
    events.on_any(move |e: &dyn EventTrait| {
        recorded_clone.borrow_mut().push(RecordedEvent {
            type_: e.type_(),
            time: e.time(),
            person: e.person().map(|p| p.external().to_string()),
        })
    });
    recorded
}
