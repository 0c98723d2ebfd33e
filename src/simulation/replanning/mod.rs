use crate::simulation::config::JointTrips;
use crate::simulation::error::{JointTripError, JointTripResult};
use crate::simulation::id::Id;
use crate::simulation::joint::group_plans::{
    connected_components, joint_trip_edges, recompose_joint_plans,
};
use crate::simulation::joint::plan_links::PlanLinks;
use crate::simulation::population::InternalPerson;
use crate::simulation::random::worker_rnd;
use crate::simulation::replanning::algorithm::GroupReplanningAlgorithm;
use crate::simulation::routing::Router;
use crate::simulation::social_network::SocialNetworkStore;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, instrument};

pub mod algorithm;
pub mod insertion;
pub mod removal;

/// Everything an operator needs besides the plans it mutates. Passed explicitly into every call.
#[derive(Clone)]
pub struct ReplanningContext {
    plan_links: Arc<PlanLinks>,
    router: Arc<dyn Router>,
    social_network: Option<Arc<dyn SocialNetworkStore>>,
    config: JointTrips,
}

impl ReplanningContext {
    /// Fails if the social network constraint is enabled but no social network is available.
    pub fn new(
        plan_links: Arc<PlanLinks>,
        router: Arc<dyn Router>,
        social_network: Option<Arc<dyn SocialNetworkStore>>,
        config: JointTrips,
    ) -> JointTripResult<Self> {
        if config.use_social_network_constraint && social_network.is_none() {
            return Err(JointTripError::Configuration(
                "the social network constraint is enabled, but no social network was provided"
                    .to_string(),
            ));
        }
        Ok(ReplanningContext {
            plan_links,
            router,
            social_network,
            config,
        })
    }

    pub fn plan_links(&self) -> &Arc<PlanLinks> {
        &self.plan_links
    }

    pub fn router(&self) -> &dyn Router {
        self.router.as_ref()
    }

    pub fn config(&self) -> &JointTrips {
        &self.config
    }

    /// The social network, if pairs must be socially connected.
    pub fn social_constraint(&self) -> Option<&dyn SocialNetworkStore> {
        if self.config.use_social_network_constraint {
            self.social_network.as_deref()
        } else {
            None
        }
    }
}

/// Persons whose plans are mutated together. A group always contains all members of the joint
/// plans its persons belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplanningGroup {
    pub id: usize,
    pub persons: BTreeMap<Id<InternalPerson>, InternalPerson>,
}

impl ReplanningGroup {
    pub fn new(id: usize, persons: impl IntoIterator<Item = InternalPerson>) -> Self {
        ReplanningGroup {
            id,
            persons: persons.into_iter().map(|p| (p.id().clone(), p)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    pub fn into_persons(self) -> impl Iterator<Item = InternalPerson> {
        self.persons.into_values()
    }
}

/// Splits the persons into replanning groups. Persons connected by joint trips or by a clique end up
/// in the same group, all remaining persons are chunked into groups of `group_size` in id order.
/// Group ids follow the order of the returned vector.
pub fn build_groups(
    mut persons: BTreeMap<Id<InternalPerson>, InternalPerson>,
    cliques: &BTreeMap<String, Vec<Id<InternalPerson>>>,
    group_size: usize,
) -> Vec<ReplanningGroup> {
    let clique_edges = cliques
        .values()
        .flat_map(|members| members.iter().cloned().tuple_windows::<(_, _)>());
    let edges: Vec<_> = joint_trip_edges(persons.values())
        .into_iter()
        .chain(clique_edges)
        .filter(|(a, b)| persons.contains_key(a) && persons.contains_key(b))
        .collect();
    let (coupled, singles): (Vec<_>, Vec<_>) =
        connected_components(persons.keys().cloned(), edges)
            .into_iter()
            .partition(|c| c.len() > 1);

    let mut members: Vec<Vec<Id<InternalPerson>>> = coupled
        .into_iter()
        .map(|c| c.into_iter().collect())
        .collect();
    for chunk in &singles
        .into_iter()
        .flat_map(|c| c.into_iter())
        .chunks(group_size.max(1))
    {
        members.push(chunk.collect());
    }

    members
        .into_iter()
        .enumerate()
        .map(|(id, ids)| {
            ReplanningGroup::new(
                id,
                ids.iter()
                    .map(|p| persons.remove(p).expect("Components only contain known persons")),
            )
        })
        .collect()
}

/// Runs the algorithm on one group and recomposes the joint plans of the group afterwards.
/// Returns the number of moves.
pub fn replan_group(
    context: &ReplanningContext,
    algorithm: &dyn GroupReplanningAlgorithm,
    group: &mut ReplanningGroup,
) -> JointTripResult<usize> {
    let mut rng = worker_rnd(context.config().random_seed, group.id);
    let moves = algorithm.run(context, &mut group.persons, &mut rng)?;
    recompose_joint_plans(context.plan_links(), &group.persons)?;
    debug!(group = group.id, moves, "replanned group");
    Ok(moves)
}

/// Distributes the groups over `workers` threads. Each group draws from its own generator seeded
/// with (master seed, group id), so the outcome does not depend on the number of workers or on
/// how the threads are scheduled. Returns the number of moves per group, in group order.
#[instrument(level = "debug", skip(context, algorithm, groups))]
pub fn replan_groups_parallel(
    context: &ReplanningContext,
    algorithm: &dyn GroupReplanningAlgorithm,
    groups: &mut [ReplanningGroup],
    workers: usize,
) -> JointTripResult<Vec<usize>> {
    if groups.is_empty() {
        return Ok(Vec::new());
    }
    let chunk_size = groups.len().div_ceil(workers.max(1));

    let results: Vec<JointTripResult<Vec<usize>>> = thread::scope(|scope| {
        let handles: Vec<_> = groups
            .chunks_mut(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter_mut()
                        .map(|group| replan_group(context, algorithm, group))
                        .collect::<JointTripResult<Vec<usize>>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("Replanning worker panicked"))
            .collect()
    });

    let mut moves = Vec::with_capacity(groups.len());
    for result in results {
        moves.extend(result?);
    }
    info!(
        groups = groups.len(),
        moves = moves.iter().sum::<usize>(),
        "Finished replanning of groups"
    );
    Ok(moves)
}

#[cfg(test)]
mod tests {
    use crate::simulation::config::JointTrips;
    use crate::simulation::error::JointTripError;
    use crate::simulation::joint::plan_links::PlanLinks;
    use crate::simulation::id::Id;
    use crate::simulation::replanning::{build_groups, ReplanningContext};
    use crate::test_utils::{corridor_router, couple_persons, couples_social_network};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[test]
    fn social_constraint_needs_store() {
        let config = JointTrips {
            use_social_network_constraint: true,
            ..JointTrips::default()
        };
        let result = ReplanningContext::new(
            Arc::new(PlanLinks::new()),
            corridor_router("repl-ctx"),
            None,
            config.clone(),
        );
        assert!(matches!(result, Err(JointTripError::Configuration(_))));

        let context = ReplanningContext::new(
            Arc::new(PlanLinks::new()),
            corridor_router("repl-ctx"),
            Some(Arc::new(couples_social_network("repl-ctx", 1))),
            config,
        )
        .unwrap();
        assert!(context.social_constraint().is_some());
    }

    #[test]
    fn social_network_ignored_without_constraint() {
        let context = ReplanningContext::new(
            Arc::new(PlanLinks::new()),
            corridor_router("repl-ctx2"),
            Some(Arc::new(couples_social_network("repl-ctx2", 1))),
            JointTrips::default(),
        )
        .unwrap();
        assert!(context.social_constraint().is_none());
    }

    #[test]
    fn groups_keep_partners_together() {
        let mut persons = BTreeMap::new();
        for i in 0..3 {
            let (driver, passenger) = couple_persons("repl-groups", i, i == 0);
            persons.insert(driver.id().clone(), driver);
            persons.insert(passenger.id().clone(), passenger);
        }
        let cliques = BTreeMap::from([(
            "clique-0".to_string(),
            vec![
                Id::create("repl-groups-driver-1"),
                Id::create("repl-groups-passenger-2"),
            ],
        )]);

        let groups = build_groups(persons, &cliques, 10);
        assert_eq!(3, groups.len());
        let ids = |i: usize| -> Vec<String> {
            groups[i]
                .persons
                .keys()
                .map(|id| id.external().to_string())
                .collect()
        };
        assert_eq!(vec!["repl-groups-driver-0", "repl-groups-passenger-0"], ids(0));
        assert_eq!(vec!["repl-groups-driver-1", "repl-groups-passenger-2"], ids(1));
        assert_eq!(vec!["repl-groups-driver-2", "repl-groups-passenger-1"], ids(2));
        assert_eq!(2, groups[2].id);
    }

    #[test]
    fn singles_are_chunked() {
        let mut persons = BTreeMap::new();
        for i in 0..5 {
            let (driver, passenger) = couple_persons("repl-chunks", i, false);
            persons.insert(driver.id().clone(), driver);
            persons.insert(passenger.id().clone(), passenger);
        }
        let groups = build_groups(persons, &BTreeMap::new(), 4);
        let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        assert_eq!(vec![4, 4, 2], sizes);
    }
}
