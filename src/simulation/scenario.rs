use crate::simulation::error::JointTripResult;
use crate::simulation::id::Id;
use crate::simulation::joint::joint_trip::{apply_splices, plan_joint_trip_insertion};
use crate::simulation::network::{Link, Network, Node};
use crate::simulation::population::{
    InternalActivity, InternalGenericRoute, InternalLeg, InternalNetworkRoute, InternalPerson,
    InternalPlan, InternalRoute, Population,
};
use crate::simulation::routing::dijkstra::DijkstraRouter;
use crate::simulation::routing::Router;
use crate::simulation::social_network::SocialNetwork;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Departure time of the synthetic couples.
pub const COUPLE_DEPARTURE: u32 = 8 * 3600;

/// Everything a run operates on.
pub struct Scenario {
    pub network: Arc<Network>,
    pub population: Population,
    pub social_network: Option<Arc<SocialNetwork>>,
}

impl Scenario {
    pub fn new(
        network: Arc<Network>,
        population: Population,
        social_network: Option<Arc<SocialNetwork>>,
    ) -> Self {
        Scenario {
            network,
            population,
            social_network,
        }
    }

    /// Driver/passenger couples on a corridor network. Each driver knows its own passenger only.
    pub fn corridor_couples(prefix: &str, couples: usize, shared: bool) -> JointTripResult<Self> {
        let network = Arc::new(corridor_network(prefix));
        let router = DijkstraRouter::new(network.clone());
        let mut population = Population::new();
        for i in 0..couples {
            let (driver, passenger) = couple_persons(&router, prefix, i, shared)?;
            population.add_person(driver);
            population.add_person(passenger);
        }
        info!(
            "Created corridor scenario with {couples} couples. Network has {} links.",
            network.links().len()
        );
        Ok(Scenario::new(
            network,
            population,
            Some(Arc::new(couples_social_network(prefix, couples))),
        ))
    }

    pub fn router(&self) -> Arc<DijkstraRouter> {
        Arc::new(DijkstraRouter::new(self.network.clone()))
    }
}

/// Corridor home -> mid -> work with a link back to the start. Each link is 1000m long with a free
/// speed of 10 m/s, the back link is 3000m long.
pub fn corridor_network(prefix: &str) -> Network {
    let mut network = Network::new();
    let nodes: Vec<Node> = (0..4)
        .map(|i| Node::new(Id::create(&format!("{prefix}-n{i}")), i as f64 * 1000., 0.))
        .collect();
    for node in &nodes {
        network.add_node(node.clone());
    }
    for (name, from, to, length) in [
        ("home", 0, 1, 1000.),
        ("mid", 1, 2, 1000.),
        ("work", 2, 3, 1000.),
        ("back", 3, 0, 3000.),
    ] {
        network.add_link(Link::new(
            Id::create(&format!("{prefix}-{name}")),
            nodes[from].id.clone(),
            nodes[to].id.clone(),
            length,
            10.,
        ));
    }
    network
}

fn home_work_plan(prefix: &str, leg: InternalLeg) -> InternalPlan {
    let mut plan = InternalPlan::default();
    plan.add_act(InternalActivity::new(
        500.,
        0.,
        "home",
        Id::create(&format!("{prefix}-home")),
        None,
        Some(COUPLE_DEPARTURE),
        None,
    ));
    plan.add_leg(leg);
    plan.add_act(InternalActivity::new(
        2500.,
        0.,
        "work",
        Id::create(&format!("{prefix}-work")),
        None,
        None,
        None,
    ));
    plan
}

/// Driver "{prefix}-driver-{index}" going home -> work by car and passenger
/// "{prefix}-passenger-{index}" walking the same trip. With `shared` the passenger rides with the
/// driver.
pub fn couple_persons(
    router: &dyn Router,
    prefix: &str,
    index: usize,
    shared: bool,
) -> JointTripResult<(InternalPerson, InternalPerson)> {
    let home: Id<Link> = Id::create(&format!("{prefix}-home"));
    let mid: Id<Link> = Id::create(&format!("{prefix}-mid"));
    let work: Id<Link> = Id::create(&format!("{prefix}-work"));

    let car = InternalLeg::new(
        InternalRoute::Network(InternalNetworkRoute::new(
            InternalGenericRoute::new(home.clone(), work.clone(), Some(200), Some(2000.), None),
            vec![home.clone(), mid, work.clone()],
        )),
        "car",
        200,
        Some(COUPLE_DEPARTURE),
    );
    let walk = InternalLeg::new(
        InternalRoute::Generic(InternalGenericRoute::new(
            home,
            work,
            Some(3120),
            Some(2600.),
            None,
        )),
        "walk",
        3120,
        Some(COUPLE_DEPARTURE),
    );

    let driver = InternalPerson::new(
        Id::create(&format!("{prefix}-driver-{index}")),
        home_work_plan(prefix, car),
    );
    let passenger = InternalPerson::new(
        Id::create(&format!("{prefix}-passenger-{index}")),
        home_work_plan(prefix, walk),
    );
    if !shared {
        return Ok((driver, passenger));
    }

    let splices = plan_joint_trip_insertion(router, &driver, 1, &passenger, 1)?;
    let driver_id = driver.id().clone();
    let passenger_id = passenger.id().clone();
    let mut persons = BTreeMap::from([
        (driver_id.clone(), driver),
        (passenger_id.clone(), passenger),
    ]);
    apply_splices(&mut persons, Vec::from(splices))?;
    let driver = persons.remove(&driver_id).expect("Driver was inserted above");
    let passenger = persons
        .remove(&passenger_id)
        .expect("Passenger was inserted above");
    Ok((driver, passenger))
}

/// Reflective social network where each driver only knows its own passenger.
pub fn couples_social_network(prefix: &str, couples: usize) -> SocialNetwork {
    let mut network = SocialNetwork::new(true);
    for i in 0..couples {
        network.add_tie(
            &Id::create(&format!("{prefix}-driver-{i}")),
            &Id::create(&format!("{prefix}-passenger-{i}")),
        );
    }
    network
}
