use crate::simulation::error::JointTripResult;
use crate::simulation::id::Id;
use crate::simulation::joint::plan_links::PlanLinks;
use crate::simulation::joint::{JointPlan, PlanRef};
use crate::simulation::population::InternalPerson;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

/// Connected components of an undirected graph, ordered by their smallest member. Nodes only
/// mentioned by edges are part of the graph as well.
pub fn connected_components(
    nodes: impl IntoIterator<Item = Id<InternalPerson>>,
    edges: impl IntoIterator<Item = (Id<InternalPerson>, Id<InternalPerson>)>,
) -> Vec<BTreeSet<Id<InternalPerson>>> {
    let mut adjacency: BTreeMap<Id<InternalPerson>, BTreeSet<Id<InternalPerson>>> =
        nodes.into_iter().map(|n| (n, BTreeSet::new())).collect();
    for (a, b) in edges {
        adjacency.entry(a.clone()).or_default().insert(b.clone());
        adjacency.entry(b).or_default().insert(a);
    }

    let mut visited: BTreeSet<Id<InternalPerson>> = BTreeSet::new();
    let mut components = Vec::new();
    for start in adjacency.keys() {
        if visited.contains(start) {
            continue;
        }
        let mut component = BTreeSet::new();
        let mut queue = VecDeque::from([start.clone()]);
        visited.insert(start.clone());
        while let Some(current) = queue.pop_front() {
            for next in &adjacency[&current] {
                if visited.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
            component.insert(current);
        }
        components.push(component);
    }
    components
}

/// Pairs of (driver, passenger) over the selected plans, taken from both sides of each joint trip.
pub fn joint_trip_edges<'a>(
    persons: impl IntoIterator<Item = &'a InternalPerson>,
) -> Vec<(Id<InternalPerson>, Id<InternalPerson>)> {
    let mut edges = Vec::new();
    for person in persons {
        let Some(plan) = person.selected_plan() else {
            continue;
        };
        for leg in plan.legs() {
            if let Some(driver_route) = leg.driver_route() {
                edges.extend(
                    driver_route
                        .passengers()
                        .iter()
                        .map(|p| (person.id().clone(), p.clone())),
                );
            } else if let Some(passenger_route) = leg.passenger_route() {
                edges.push((passenger_route.driver().clone(), person.id().clone()));
            }
        }
    }
    edges
}

/// Replaces the joint plans owning any selected plan of `persons` by one joint plan per group of
/// persons connected through joint trips. Persons without joint trips end up without a joint plan.
/// The persons must contain whole joint plans, partners outside of `persons` are not linked.
pub fn recompose_joint_plans(
    plan_links: &PlanLinks,
    persons: &BTreeMap<Id<InternalPerson>, InternalPerson>,
) -> JointTripResult<Vec<JointPlan>> {
    let refs: BTreeMap<Id<InternalPerson>, PlanRef> = persons
        .values()
        .map(|p| (p.id().clone(), PlanRef::selected(p)))
        .collect();

    let mut stale: BTreeMap<Id<JointPlan>, JointPlan> = BTreeMap::new();
    for plan_ref in refs.values() {
        if let Some(owner) = plan_links.owner_of(plan_ref) {
            stale.insert(owner.id().clone(), owner);
        }
    }
    for joint_plan in stale.values() {
        plan_links.unlink(joint_plan)?;
    }

    let edges = joint_trip_edges(persons.values())
        .into_iter()
        .filter(|(d, p)| refs.contains_key(d) && refs.contains_key(p));
    let mut linked = Vec::new();
    for component in connected_components(refs.keys().cloned(), edges) {
        if component.len() < 2 {
            continue;
        }
        let joint_plan = JointPlan::new(component.iter().map(|id| refs[id].clone()));
        plan_links.link(joint_plan.clone())?;
        linked.push(joint_plan);
    }

    debug!(
        unlinked = stale.len(),
        linked = linked.len(),
        "recomposed joint plans"
    );
    Ok(linked)
}
