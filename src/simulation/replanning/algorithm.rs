use crate::simulation::config::JointTrips;
use crate::simulation::error::JointTripResult;
use crate::simulation::id::Id;
use crate::simulation::population::trip_structure_utils::get_trips_default;
use crate::simulation::population::InternalPerson;
use crate::simulation::replanning::insertion::insert_joint_trip;
use crate::simulation::replanning::removal::remove_joint_trip;
use crate::simulation::replanning::ReplanningContext;
use rand::rngs::SmallRng;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{trace, warn};

/// Mutates the plans of one replanning group. Returns the number of moves.
pub trait GroupReplanningAlgorithm: Send + Sync {
    fn run(
        &self,
        context: &ReplanningContext,
        persons: &mut BTreeMap<Id<InternalPerson>, InternalPerson>,
        rng: &mut SmallRng,
    ) -> JointTripResult<usize>;
}

/// A move touching a driver and a passenger.
type Move = (Id<InternalPerson>, Id<InternalPerson>);

/// Repeats `step` until it reports no possible action, or once if not iterative. The persons of a
/// move are excluded from all later steps of the same run. Routing failures abandon the move and
/// end the run.
fn run_moves<F>(
    iterative: bool,
    persons: &mut BTreeMap<Id<InternalPerson>, InternalPerson>,
    rng: &mut SmallRng,
    mut step: F,
) -> JointTripResult<usize>
where
    F: FnMut(
        &mut BTreeMap<Id<InternalPerson>, InternalPerson>,
        &BTreeSet<Id<InternalPerson>>,
        &mut SmallRng,
    ) -> JointTripResult<Option<Move>>,
{
    let mut acted_upon = BTreeSet::new();
    let mut moves = 0;
    loop {
        match step(persons, &acted_upon, rng) {
            Ok(Some((driver, passenger))) => {
                acted_upon.insert(driver);
                acted_upon.insert(passenger);
                moves += 1;
                if !iterative {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) if !e.is_fatal() => {
                warn!("Abandoning joint trip move: {e}");
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(moves)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointTripInsertorAlgorithm {
    pub iterative: bool,
}

impl GroupReplanningAlgorithm for JointTripInsertorAlgorithm {
    fn run(
        &self,
        context: &ReplanningContext,
        persons: &mut BTreeMap<Id<InternalPerson>, InternalPerson>,
        rng: &mut SmallRng,
    ) -> JointTripResult<usize> {
        run_moves(self.iterative, persons, rng, |persons, acted, rng| {
            Ok(insert_joint_trip(context, persons, acted, rng)?.map(|m| (m.driver, m.passenger)))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointTripRemoverAlgorithm {
    pub iterative: bool,
}

impl GroupReplanningAlgorithm for JointTripRemoverAlgorithm {
    fn run(
        &self,
        context: &ReplanningContext,
        persons: &mut BTreeMap<Id<InternalPerson>, InternalPerson>,
        rng: &mut SmallRng,
    ) -> JointTripResult<usize> {
        run_moves(self.iterative, persons, rng, |persons, acted, rng| {
            Ok(remove_joint_trip(context, persons, acted, rng)?.map(|m| (m.driver, m.passenger)))
        })
    }
}

/// Chooses between removal and insertion with probability
/// `passenger trips / (passenger trips + solo trips)` over the persons not acted upon yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointTripInsertorAndRemoverAlgorithm {
    pub iterative: bool,
}

impl JointTripInsertorAndRemoverAlgorithm {
    pub fn from_config(config: &JointTrips) -> Self {
        JointTripInsertorAndRemoverAlgorithm {
            iterative: config.iterative,
        }
    }
}

impl GroupReplanningAlgorithm for JointTripInsertorAndRemoverAlgorithm {
    fn run(
        &self,
        context: &ReplanningContext,
        persons: &mut BTreeMap<Id<InternalPerson>, InternalPerson>,
        rng: &mut SmallRng,
    ) -> JointTripResult<usize> {
        run_moves(self.iterative, persons, rng, |persons, acted, rng| {
            let p_removal = removal_probability(persons, acted);
            let draw: f64 = rng.random();
            trace!(p_removal, draw, "choose joint trip move");
            if draw < p_removal {
                Ok(remove_joint_trip(context, persons, acted, rng)?.map(|m| (m.driver, m.passenger)))
            } else {
                Ok(insert_joint_trip(context, persons, acted, rng)?.map(|m| (m.driver, m.passenger)))
            }
        })
    }
}

/// Share of trips containing a passenger leg among passenger trips and solo trips. Solo trips
/// consist of a single leg. Trips of persons acted upon are not counted.
pub fn removal_probability(
    persons: &BTreeMap<Id<InternalPerson>, InternalPerson>,
    acted_upon: &BTreeSet<Id<InternalPerson>>,
) -> f64 {
    let mut passenger_trips = 0usize;
    let mut solo_trips = 0usize;
    for (id, person) in persons {
        if acted_upon.contains(id) {
            continue;
        }
        let Some(plan) = person.selected_plan() else {
            continue;
        };
        for trip in get_trips_default(&plan.elements) {
            let has_passenger_leg = trip
                .legs
                .iter()
                .filter_map(|e| e.as_leg())
                .any(|l| l.is_passenger_leg());
            if has_passenger_leg {
                passenger_trips += 1;
            } else if trip.single_leg().is_some() {
                solo_trips += 1;
            }
        }
    }
    if passenger_trips + solo_trips == 0 {
        return 0.;
    }
    passenger_trips as f64 / (passenger_trips + solo_trips) as f64
}
