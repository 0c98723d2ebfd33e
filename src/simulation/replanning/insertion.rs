use crate::simulation::config::JointTrips;
use crate::simulation::error::JointTripResult;
use crate::simulation::id::Id;
use crate::simulation::joint::joint_trip::{apply_splices, plan_joint_trip_insertion};
use crate::simulation::population::trip_structure_utils::{get_trips_default, Trip};
use crate::simulation::population::{InternalPerson, DRIVER_MODE, PASSENGER_MODE};
use crate::simulation::replanning::ReplanningContext;
use crate::simulation::social_network::SocialNetworkStore;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{instrument, trace};

pub(crate) const TIE_TOLERANCE: f64 = 1e-9;

/// A single leg trip which could take part in a joint trip.
#[derive(Debug, Clone, PartialEq)]
pub struct TripCandidate {
    pub person: Id<InternalPerson>,
    pub leg_index: usize,
    pub origin: (f64, f64),
    pub destination: (f64, f64),
    pub departure: Option<u32>,
}

impl TripCandidate {
    /// Candidate for a trip consisting of a single leg that is not yet part of a joint trip.
    pub fn from_trip(person: &Id<InternalPerson>, trip: &Trip) -> Option<Self> {
        let leg = trip.single_leg()?;
        if leg.is_joint() {
            return None;
        }
        Some(TripCandidate {
            person: person.clone(),
            leg_index: trip.single_leg_index()?,
            origin: trip.origin.coord(),
            destination: trip.destination.coord(),
            departure: trip.departure_time(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertionMove {
    pub driver: Id<InternalPerson>,
    pub passenger: Id<InternalPerson>,
    pub detour_fraction: f64,
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Relative increase of the driver's beeline trip length when serving the passenger on the way.
pub fn detour_fraction(
    driver_origin: (f64, f64),
    driver_destination: (f64, f64),
    passenger_origin: (f64, f64),
    passenger_destination: (f64, f64),
) -> f64 {
    let direct = distance(driver_origin, driver_destination);
    let with_passenger = distance(driver_origin, passenger_origin)
        + distance(passenger_origin, passenger_destination)
        + distance(passenger_destination, driver_destination);
    let detour = with_passenger - direct;
    if direct < TIE_TOLERANCE {
        return if detour < TIE_TOLERANCE {
            0.
        } else {
            f64::INFINITY
        };
    }
    detour / direct
}

/// Single leg trips of persons not acted upon whose mode matches `accept`, in (person, leg) order.
fn single_leg_trips<F>(
    persons: &BTreeMap<Id<InternalPerson>, InternalPerson>,
    acted_upon: &BTreeSet<Id<InternalPerson>>,
    accept: F,
) -> Vec<TripCandidate>
where
    F: Fn(&str) -> bool,
{
    let mut candidates = Vec::new();
    for (id, person) in persons {
        if acted_upon.contains(id) {
            continue;
        }
        let Some(plan) = person.selected_plan() else {
            continue;
        };
        for trip in get_trips_default(&plan.elements) {
            let Some(candidate) = TripCandidate::from_trip(id, &trip) else {
                continue;
            };
            if accept(trip.single_leg().map(|l| l.mode.external()).unwrap_or_default()) {
                candidates.push(candidate);
            }
        }
    }
    candidates
}

/// Trips which could be served as passenger: single leg trips with a mode that is neither chain
/// based nor a joint trip mode.
pub fn passenger_candidates(
    context: &ReplanningContext,
    persons: &BTreeMap<Id<InternalPerson>, InternalPerson>,
    acted_upon: &BTreeSet<Id<InternalPerson>>,
) -> Vec<TripCandidate> {
    let chain_based = &context.config().chain_based_modes;
    single_leg_trips(persons, acted_upon, |mode| {
        mode != DRIVER_MODE && mode != PASSENGER_MODE && !chain_based.iter().any(|m| m == mode)
    })
}

/// Trips which could pick up a passenger: single leg trips with a driver mode.
pub fn driver_candidates(
    context: &ReplanningContext,
    persons: &BTreeMap<Id<InternalPerson>, InternalPerson>,
    acted_upon: &BTreeSet<Id<InternalPerson>>,
) -> Vec<TripCandidate> {
    let driver_modes = &context.config().driver_modes;
    single_leg_trips(persons, acted_upon, |mode| {
        driver_modes.iter().any(|m| m == mode)
    })
}

/// Detour fraction of `driver` serving `passenger`, or None if the pair is not feasible.
pub fn evaluate_pair(
    context: &ReplanningContext,
    driver: &TripCandidate,
    passenger: &TripCandidate,
) -> Option<f64> {
    pair_detour(context.config(), context.social_constraint(), driver, passenger)
}

/// Checks the spatial, temporal and social filters and the detour bound. Shared with the matching
/// platform.
pub fn pair_detour(
    config: &JointTrips,
    social_network: Option<&dyn SocialNetworkStore>,
    driver: &TripCandidate,
    passenger: &TripCandidate,
) -> Option<f64> {
    if driver.person == passenger.person {
        return None;
    }
    if distance(driver.origin, passenger.origin) > config.local_search_radius {
        return None;
    }
    if let (Some(d), Some(p)) = (driver.departure, passenger.departure) {
        if d.abs_diff(p) > config.departure_time_tolerance {
            return None;
        }
    }
    if let Some(social_network) = social_network {
        if !social_network.are_connected(&passenger.person, &driver.person) {
            return None;
        }
    }
    let fraction = detour_fraction(
        driver.origin,
        driver.destination,
        passenger.origin,
        passenger.destination,
    );
    (fraction <= config.maximum_detour_fraction).then_some(fraction)
}

/// Inserts one joint trip between persons not acted upon yet. Passenger candidates are visited in
/// random order. For the first passenger with feasible drivers, the driver with the smallest detour
/// is chosen. Equal detours are ordered by (person, leg) and one of them is picked at random.
/// Returns `Ok(None)` if no feasible pair exists.
#[instrument(level = "trace", skip_all)]
pub fn insert_joint_trip(
    context: &ReplanningContext,
    persons: &mut BTreeMap<Id<InternalPerson>, InternalPerson>,
    acted_upon: &BTreeSet<Id<InternalPerson>>,
    rng: &mut SmallRng,
) -> JointTripResult<Option<InsertionMove>> {
    let mut passengers = passenger_candidates(context, persons, acted_upon);
    let drivers = driver_candidates(context, persons, acted_upon);
    if passengers.is_empty() || drivers.is_empty() {
        return Ok(None);
    }
    passengers.shuffle(rng);

    for passenger in &passengers {
        let feasible: Vec<(&TripCandidate, f64)> = drivers
            .iter()
            .filter_map(|d| evaluate_pair(context, d, passenger).map(|f| (d, f)))
            .collect();
        let Some(best) = feasible.iter().map(|(_, f)| *f).reduce(f64::min) else {
            continue;
        };
        let tied: Vec<&TripCandidate> = feasible
            .iter()
            .filter(|(_, f)| *f - best <= TIE_TOLERANCE)
            .map(|(d, _)| *d)
            .collect();
        let driver = tied[rng.random_range(0..tied.len())];

        let splices = plan_joint_trip_insertion(
            context.router(),
            &persons[&driver.person],
            driver.leg_index,
            &persons[&passenger.person],
            passenger.leg_index,
        )?;
        apply_splices(persons, Vec::from(splices))?;

        trace!(driver = %driver.person, passenger = %passenger.person, detour = best, "inserted joint trip");
        return Ok(Some(InsertionMove {
            driver: driver.person.clone(),
            passenger: passenger.person.clone(),
            detour_fraction: best,
        }));
    }
    Ok(None)
}
