use crate::simulation::id::Id;
use crate::simulation::joint::group_plans::connected_components;
use crate::simulation::matching::platform::Mating;
use crate::simulation::population::InternalPerson;
use std::collections::BTreeMap;

/// Groups all persons connected by at least one mating. Cliques are numbered in the order of their
/// smallest member.
pub fn build_cliques(matings: &[Mating]) -> BTreeMap<String, Vec<Id<InternalPerson>>> {
    let edges = matings
        .iter()
        .map(|m| (m.driver.clone(), m.passenger.clone()));
    connected_components(Vec::<Id<InternalPerson>>::new(), edges)
        .into_iter()
        .enumerate()
        .map(|(i, members)| (format!("clique-{i}"), members.into_iter().collect()))
        .collect()
}
