use crate::simulation::error::JointTripResult;
use crate::simulation::id::Id;
use crate::simulation::joint::joint_trip::{apply_splices, plan_joint_trip_removal};
use crate::simulation::population::InternalPerson;
use crate::simulation::replanning::ReplanningContext;
use rand::rngs::SmallRng;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{instrument, trace};

/// One passenger served on one driver leg.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SharedLeg {
    pub driver: Id<InternalPerson>,
    pub leg_index: usize,
    pub passenger: Id<InternalPerson>,
}

/// All (driver, leg, passenger) combinations where neither driver nor passenger were acted upon
/// and both are part of `persons`. Sorted by driver, leg and passenger.
pub fn shared_legs(
    persons: &BTreeMap<Id<InternalPerson>, InternalPerson>,
    acted_upon: &BTreeSet<Id<InternalPerson>>,
) -> Vec<SharedLeg> {
    let mut shared = Vec::new();
    for (id, person) in persons {
        if acted_upon.contains(id) {
            continue;
        }
        let Some(plan) = person.selected_plan() else {
            continue;
        };
        for (leg_index, element) in plan.elements.iter().enumerate() {
            let Some(route) = element.as_leg().and_then(|l| l.driver_route()) else {
                continue;
            };
            shared.extend(
                route
                    .passengers()
                    .iter()
                    .filter(|p| persons.contains_key(*p) && !acted_upon.contains(*p))
                    .map(|p| SharedLeg {
                        driver: id.clone(),
                        leg_index,
                        passenger: p.clone(),
                    }),
            );
        }
    }
    shared
}

/// Detaches one passenger from one driver leg, chosen uniformly among all shared legs.
/// Returns `Ok(None)` if there is nothing to remove.
#[instrument(level = "trace", skip_all)]
pub fn remove_joint_trip(
    context: &ReplanningContext,
    persons: &mut BTreeMap<Id<InternalPerson>, InternalPerson>,
    acted_upon: &BTreeSet<Id<InternalPerson>>,
    rng: &mut SmallRng,
) -> JointTripResult<Option<SharedLeg>> {
    let candidates = shared_legs(persons, acted_upon);
    if candidates.is_empty() {
        return Ok(None);
    }
    let chosen = candidates[rng.random_range(0..candidates.len())].clone();

    let splices = plan_joint_trip_removal(
        context.router(),
        &persons[&chosen.driver],
        chosen.leg_index,
        &persons[&chosen.passenger],
    )?;
    apply_splices(persons, Vec::from(splices))?;

    trace!(driver = %chosen.driver, passenger = %chosen.passenger, "removed joint trip");
    Ok(Some(chosen))
}

#[cfg(test)]
mod tests {
    use crate::simulation::config::JointTrips;
    use crate::simulation::id::Id;
    use crate::simulation::joint::consistency::check_driver_passenger_consistency;
    use crate::simulation::joint::plan_links::PlanLinks;
    use crate::simulation::population::InternalPerson;
    use crate::simulation::random::worker_rnd;
    use crate::simulation::replanning::removal::{remove_joint_trip, shared_legs};
    use crate::simulation::replanning::ReplanningContext;
    use crate::test_utils::{corridor_router, couple_persons};
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;

    fn persons(prefix: &str, couples: usize) -> BTreeMap<Id<InternalPerson>, InternalPerson> {
        let mut persons = BTreeMap::new();
        for i in 0..couples {
            let (d, p) = couple_persons(prefix, i, true);
            persons.insert(d.id().clone(), d);
            persons.insert(p.id().clone(), p);
        }
        persons
    }

    #[test]
    fn shared_legs_are_sorted() {
        let persons = persons("rem-sorted", 3);
        let legs = shared_legs(&persons, &BTreeSet::from([Id::create("rem-sorted-passenger-1")]));
        assert_eq!(2, legs.len());
        assert_eq!("rem-sorted-driver-0", legs[0].driver.external());
        assert_eq!(3, legs[0].leg_index);
        assert_eq!("rem-sorted-passenger-2", legs[1].passenger.external());
    }

    #[test]
    fn remove_one() {
        let prefix = "rem-one";
        let context = ReplanningContext::new(
            Arc::new(PlanLinks::new()),
            corridor_router(prefix),
            None,
            JointTrips::default(),
        )
        .unwrap();
        let mut persons = persons(prefix, 2);
        let mut rng = worker_rnd(7, 0);

        let removed = remove_joint_trip(&context, &mut persons, &BTreeSet::new(), &mut rng)
            .unwrap()
            .unwrap();
        check_driver_passenger_consistency(persons.values()).unwrap();
        let driver = &persons[&removed.driver];
        assert_eq!(3, driver.total_elements());
        assert_eq!("car", driver.selected_plan().unwrap().leg_at(1).unwrap().mode.external());
        let passenger = &persons[&removed.passenger];
        assert_eq!("walk", passenger.selected_plan().unwrap().leg_at(1).unwrap().mode.external());
        assert_eq!(1, shared_legs(&persons, &BTreeSet::new()).len());
    }
}
