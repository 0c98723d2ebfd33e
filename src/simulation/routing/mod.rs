use crate::simulation::id::Id;
use crate::simulation::network::Link;
use thiserror::Error;

pub mod dijkstra;

/// A path through the network. `links` contains the start link and the end link. The start link is
/// not traversed, the agent departs at its end, so neither travel time nor distance include it.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkPath {
    pub links: Vec<Id<Link>>,
    pub travel_time: u32,
    pub distance: f64,
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("No route from link {from} to link {to}")]
pub struct RoutingError {
    pub from: String,
    pub to: String,
}

impl RoutingError {
    pub fn new(from: &Id<Link>, to: &Id<Link>) -> Self {
        RoutingError {
            from: from.external().to_string(),
            to: to.external().to_string(),
        }
    }
}

/// Routing collaborator used when legs are spliced or restored. Implementations are shared between
/// replanning workers.
pub trait Router: Send + Sync {
    fn route(
        &self,
        from: &Id<Link>,
        to: &Id<Link>,
        departure_time: u32,
    ) -> Result<NetworkPath, RoutingError>;
}
