use crate::simulation::id::Id;
use crate::simulation::network::{Link, Network};
use crate::simulation::routing::{NetworkPath, Router, RoutingError};
use keyed_priority_queue::{Entry, KeyedPriorityQueue};
use nohash_hasher::IntMap;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::instrument;

#[derive(Eq, PartialEq, Debug)]
pub struct Distance(pub u32);

impl Ord for Distance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0).reverse()
    }
}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Distance {
    pub fn get(&self) -> u32 {
        self.0
    }
}

/// Link based dijkstra on free speed travel times. The network is static, so the departure time
/// does not influence the result.
#[derive(Debug, Clone)]
pub struct DijkstraRouter {
    network: Arc<Network>,
}

impl DijkstraRouter {
    pub fn new(network: Arc<Network>) -> Self {
        DijkstraRouter { network }
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    fn search(&self, from: &Id<Link>, to: &Id<Link>) -> Option<IntMap<Id<Link>, Id<Link>>> {
        let mut queue: KeyedPriorityQueue<Id<Link>, Distance> = KeyedPriorityQueue::new();
        let mut settled: IntMap<Id<Link>, u32> = IntMap::default();
        let mut predecessors: IntMap<Id<Link>, Id<Link>> = IntMap::default();
        queue.push(from.clone(), Distance(0));

        while let Some((current, distance)) = queue.pop() {
            settled.insert(current.clone(), distance.get());
            if current.eq(to) {
                return Some(predecessors);
            }

            let link = self.network.get_link(&current);
            for next in self.network.out_links(link) {
                if settled.contains_key(next) {
                    continue;
                }
                let candidate = distance.get() + self.network.link_travel_time(next);
                match queue.entry(next.clone()) {
                    Entry::Occupied(e) => {
                        if e.get_priority().get() > candidate {
                            e.set_priority(Distance(candidate));
                            predecessors.insert(next.clone(), current.clone());
                        }
                    }
                    Entry::Vacant(e) => {
                        e.set_priority(Distance(candidate));
                        predecessors.insert(next.clone(), current.clone());
                    }
                }
            }
        }
        None
    }
}

impl Router for DijkstraRouter {
    #[instrument(level = "trace", skip(self))]
    fn route(
        &self,
        from: &Id<Link>,
        to: &Id<Link>,
        _departure_time: u32,
    ) -> Result<NetworkPath, RoutingError> {
        if self.network.try_get_link(from).is_none() || self.network.try_get_link(to).is_none() {
            return Err(RoutingError::new(from, to));
        }

        let predecessors = self
            .search(from, to)
            .ok_or_else(|| RoutingError::new(from, to))?;

        let mut links = vec![to.clone()];
        let mut current = to;
        while current != from {
            // the search only returns if `to` was reached, so the chain ends at `from`
            current = predecessors
                .get(current)
                .ok_or_else(|| RoutingError::new(from, to))?;
            links.push(current.clone());
        }
        links.reverse();

        let (travel_time, distance) =
            links
                .iter()
                .skip(1)
                .fold((0, 0.), |(tt, dist), id| {
                    let link = self.network.get_link(id);
                    (tt + link.free_speed_travel_time(), dist + link.length)
                });

        Ok(NetworkPath {
            links,
            travel_time,
            distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::id::Id;
    use crate::simulation::network::{Link, Network, Node};
    use crate::simulation::routing::dijkstra::DijkstraRouter;
    use crate::simulation::routing::Router;
    use std::sync::Arc;

    /// n1 -> n2 -> n3 with a slow direct link n1 -> n3 and a dead end n4.
    fn network() -> Arc<Network> {
        let mut network = Network::new();
        for (id, x) in [("dij-n1", 0.), ("dij-n2", 100.), ("dij-n3", 200.), ("dij-n4", 300.)] {
            network.add_node(Node::new(Id::create(id), x, 0.));
        }
        let links = [
            ("dij-l0", "dij-n2", "dij-n1", 100., 10.),
            ("dij-l1", "dij-n1", "dij-n2", 100., 10.),
            ("dij-l2", "dij-n2", "dij-n3", 100., 10.),
            ("dij-slow", "dij-n1", "dij-n3", 200., 1.),
            ("dij-l3", "dij-n3", "dij-n4", 100., 10.),
        ];
        for (id, from, to, length, speed) in links {
            network.add_link(Link::new(
                Id::create(id),
                Id::get_from_ext(from),
                Id::get_from_ext(to),
                length,
                speed,
            ));
        }
        Arc::new(network)
    }

    fn ids(links: &[Id<Link>]) -> Vec<&str> {
        links.iter().map(|l| l.external()).collect()
    }

    #[test]
    fn fastest_path_includes_start_and_end() {
        let router = DijkstraRouter::new(network());
        let path = router
            .route(&Id::get_from_ext("dij-l0"), &Id::get_from_ext("dij-l3"), 0)
            .unwrap();

        assert_eq!(vec!["dij-l0", "dij-l1", "dij-l2", "dij-l3"], ids(&path.links));
        assert_eq!(30, path.travel_time);
        assert_eq!(300., path.distance);
    }

    #[test]
    fn same_link() {
        let router = DijkstraRouter::new(network());
        let path = router
            .route(&Id::get_from_ext("dij-l1"), &Id::get_from_ext("dij-l1"), 0)
            .unwrap();
        assert_eq!(vec!["dij-l1"], ids(&path.links));
        assert_eq!(0, path.travel_time);
    }

    #[test]
    fn unreachable_is_error() {
        let router = DijkstraRouter::new(network());
        let result = router.route(&Id::get_from_ext("dij-l3"), &Id::get_from_ext("dij-l0"), 0);
        let err = result.unwrap_err();
        assert_eq!("dij-l3", err.from);
        assert_eq!("dij-l0", err.to);
    }

    #[test]
    fn unknown_link_is_error() {
        let router = DijkstraRouter::new(network());
        let unknown = Id::create("dij-unknown");
        assert!(router.route(&unknown, &Id::get_from_ext("dij-l0"), 0).is_err());
    }
}
