use crate::simulation::error::{JointTripError, JointTripResult};
use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::population::trip_structure_utils::find_trip_containing_index;
use crate::simulation::population::{
    DriverRoute, InternalActivity, InternalGenericRoute, InternalLeg, InternalNetworkRoute,
    InternalPerson, InternalPlanElement, InternalRoute, PassengerRoute, ACCESS_WALK_MODE,
    DRIVER_MODE, DROP_OFF, PASSENGER_MODE, PICK_UP,
};
use crate::simulation::routing::{NetworkPath, Router};
use crate::simulation::vehicles::InternalVehicle;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

const ACCESS_WALK_SPEED: f64 = 0.833333333;
const BEELINE_DISTANCE_FACTOR: f64 = 1.3;

/// Replaces the plan elements `start..end` of the selected plan of `person` by `replacement`.
#[derive(Debug, Clone, PartialEq)]
pub struct Splice {
    pub person: Id<InternalPerson>,
    pub start: usize,
    pub end: usize,
    pub replacement: Vec<InternalPlanElement>,
}

/// Location where driver and passenger meet.
#[derive(Debug, Clone, PartialEq)]
pub struct MeetingPoint {
    pub link: Id<Link>,
    pub x: f64,
    pub y: f64,
}

impl MeetingPoint {
    pub fn at(act: &InternalActivity) -> Self {
        MeetingPoint {
            link: act.link_id.clone(),
            x: act.x,
            y: act.y,
        }
    }

    fn stage(&self, act_type: &str) -> InternalPlanElement {
        InternalPlanElement::Activity(InternalActivity::new_stage(
            act_type,
            self.link.clone(),
            self.x,
            self.y,
        ))
    }

    /// Stage activity which is left at `end_time` at the earliest.
    fn stage_until(&self, act_type: &str, end_time: u32) -> InternalPlanElement {
        let mut act = InternalActivity::new_stage(act_type, self.link.clone(), self.x, self.y);
        act.end_time = Some(end_time);
        InternalPlanElement::Activity(act)
    }
}

/// Applies all splices. Splices of one person are applied from the back of the plan to the front, so
/// that the indices of each splice refer to the plan as it was before any of them was applied.
/// Everything is validated before the first plan is touched.
pub fn apply_splices(
    persons: &mut BTreeMap<Id<InternalPerson>, InternalPerson>,
    splices: Vec<Splice>,
) -> JointTripResult<()> {
    let mut per_person: BTreeMap<Id<InternalPerson>, Vec<Splice>> = BTreeMap::new();
    for splice in splices {
        per_person
            .entry(splice.person.clone())
            .or_default()
            .push(splice);
    }

    for (id, splices) in per_person.iter_mut() {
        let person = persons.get(id).ok_or_else(|| {
            JointTripError::ConsistencyViolation(format!("cannot splice plan of unknown person {id}"))
        })?;
        let len = person.total_elements();
        splices.sort_by(|a, b| b.start.cmp(&a.start));
        let mut upper = len;
        for splice in splices.iter() {
            if splice.start > splice.end || splice.end > upper {
                return Err(JointTripError::ConsistencyViolation(format!(
                    "invalid or overlapping splice {}..{} in plan of person {id} with {len} elements",
                    splice.start, splice.end
                )));
            }
            upper = splice.start;
        }
    }

    for (id, splices) in per_person {
        let plan = persons
            .get_mut(&id)
            .expect("Persons were checked above")
            .selected_plan_mut();
        for splice in splices {
            trace!(person = %id, start = splice.start, end = splice.end, "splice plan");
            plan.elements.splice(splice.start..splice.end, splice.replacement);
        }
    }
    Ok(())
}

fn departure_of(origin: &InternalActivity, leg: &InternalLeg) -> u32 {
    origin.end_time.or(leg.dep_time).unwrap_or(0)
}

fn vehicle_of(leg: &InternalLeg) -> Option<Id<InternalVehicle>> {
    leg.route
        .as_ref()
        .and_then(|r| r.as_generic().vehicle().clone())
}

fn network_route(path: &NetworkPath, vehicle: Option<Id<InternalVehicle>>) -> InternalNetworkRoute {
    let start = path.links.first().expect("A path contains at least one link");
    let end = path.links.last().expect("A path contains at least one link");
    InternalNetworkRoute::new(
        InternalGenericRoute::new(
            start.clone(),
            end.clone(),
            Some(path.travel_time),
            Some(path.distance),
            vehicle,
        ),
        path.links.clone(),
    )
}

/// Routes a leg of the given mode through the network.
pub fn routed_leg(
    router: &dyn Router,
    mode: &str,
    from: &Id<Link>,
    to: &Id<Link>,
    departure: u32,
    vehicle: Option<Id<InternalVehicle>>,
) -> JointTripResult<InternalLeg> {
    let path = router.route(from, to, departure)?;
    Ok(InternalLeg::new(
        InternalRoute::Network(network_route(&path, vehicle)),
        mode,
        path.travel_time,
        Some(departure),
    ))
}

fn access_walk(from: &MeetingPoint, to: &MeetingPoint, departure: u32) -> InternalLeg {
    let distance =
        ((from.x - to.x).powi(2) + (from.y - to.y).powi(2)).sqrt() * BEELINE_DISTANCE_FACTOR;
    let trav_time = (distance / ACCESS_WALK_SPEED).ceil() as u32;
    InternalLeg::new(
        InternalRoute::Generic(InternalGenericRoute::new(
            from.link.clone(),
            to.link.clone(),
            Some(trav_time),
            Some(distance),
            None,
        )),
        ACCESS_WALK_MODE,
        trav_time,
        Some(departure),
    )
}

fn single_leg_trip<'a>(
    person: &'a InternalPerson,
    leg_index: usize,
) -> JointTripResult<(&'a InternalActivity, &'a InternalLeg, &'a InternalActivity)> {
    let plan = person.selected_plan().ok_or_else(|| {
        JointTripError::ConsistencyViolation(format!("person {} has no selected plan", person.id()))
    })?;
    let element = |index: usize| {
        plan.elements.get(index).ok_or_else(|| {
            JointTripError::ConsistencyViolation(format!(
                "plan of person {} has no element {index}",
                person.id()
            ))
        })
    };
    let origin = leg_index
        .checked_sub(1)
        .ok_or_else(|| {
            JointTripError::ConsistencyViolation(format!(
                "plan of person {} starts with a leg",
                person.id()
            ))
        })
        .and_then(element)?
        .as_activity();
    let leg = element(leg_index)?.as_leg();
    let destination = element(leg_index + 1)?.as_activity();
    match (origin, leg, destination) {
        (Some(o), Some(l), Some(d)) => Ok((o, l, d)),
        _ => Err(JointTripError::ConsistencyViolation(format!(
            "element {leg_index} of person {} is not a leg between two activities",
            person.id()
        ))),
    }
}

/// The shared part of a joint trip, as planned for the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedRide {
    pub pickup: MeetingPoint,
    pub dropoff: MeetingPoint,
    pub departure: u32,
    pub travel_time: u32,
    pub distance: f64,
}

/// Plans the driver side of a joint trip: the driver's single leg at `leg_index` becomes an access
/// leg to the pick-up, a driver leg serving `passenger` and an egress leg from the drop-off. All legs
/// are routed. The shared leg departs once the driver reached the pick-up, but not before
/// `earliest_pickup`.
pub fn plan_driver_insertion(
    router: &dyn Router,
    driver: &InternalPerson,
    leg_index: usize,
    pickup: &MeetingPoint,
    dropoff: &MeetingPoint,
    passenger: &Id<InternalPerson>,
    earliest_pickup: u32,
) -> JointTripResult<(Splice, SharedRide)> {
    let (origin, leg, destination) = single_leg_trip(driver, leg_index)?;
    let mode = leg.mode.external();
    let vehicle = vehicle_of(leg);

    let mut time = departure_of(origin, leg);
    let access = routed_leg(router, mode, &origin.link_id, &pickup.link, time, vehicle.clone())?;
    let shared_departure = (time + access.travel_time()).max(earliest_pickup);
    time = shared_departure;

    let shared_path = router.route(&pickup.link, &dropoff.link, time)?;
    let driver_leg = InternalLeg::new(
        InternalRoute::Driver(DriverRoute::new(
            network_route(&shared_path, vehicle.clone()),
            BTreeSet::from([passenger.clone()]),
        )),
        DRIVER_MODE,
        shared_path.travel_time,
        Some(shared_departure),
    );
    time += shared_path.travel_time;

    let egress = routed_leg(router, mode, &dropoff.link, &destination.link_id, time, vehicle)?;

    let splice = Splice {
        person: driver.id().clone(),
        start: leg_index,
        end: leg_index + 1,
        replacement: vec![
            InternalPlanElement::Leg(access),
            pickup.stage_until(PICK_UP, shared_departure),
            InternalPlanElement::Leg(driver_leg),
            dropoff.stage(DROP_OFF),
            InternalPlanElement::Leg(egress),
        ],
    };
    let ride = SharedRide {
        pickup: pickup.clone(),
        dropoff: dropoff.clone(),
        departure: shared_departure,
        travel_time: shared_path.travel_time,
        distance: shared_path.distance,
    };
    Ok((splice, ride))
}

/// Plans the passenger side of a joint trip: the passenger's single leg at `leg_index` becomes a walk
/// to the pick-up, a passenger leg with `driver` and a walk from the drop-off. The passenger waits at
/// the pick-up until the departure of the shared ride. The original leg is kept in the passenger
/// route.
pub fn plan_passenger_insertion(
    passenger: &InternalPerson,
    leg_index: usize,
    driver: &Id<InternalPerson>,
    ride: &SharedRide,
) -> JointTripResult<Splice> {
    let (origin, leg, destination) = single_leg_trip(passenger, leg_index)?;

    let access = access_walk(&MeetingPoint::at(origin), &ride.pickup, departure_of(origin, leg));
    let mut time = ride.departure;

    let passenger_leg = InternalLeg::new(
        InternalRoute::Passenger(PassengerRoute::new(
            InternalGenericRoute::new(
                ride.pickup.link.clone(),
                ride.dropoff.link.clone(),
                Some(ride.travel_time),
                Some(ride.distance),
                None,
            ),
            driver.clone(),
            leg.clone(),
        )),
        PASSENGER_MODE,
        ride.travel_time,
        Some(time),
    );
    time += ride.travel_time;

    let egress = access_walk(&ride.dropoff, &MeetingPoint::at(destination), time);

    Ok(Splice {
        person: passenger.id().clone(),
        start: leg_index,
        end: leg_index + 1,
        replacement: vec![
            InternalPlanElement::Leg(access),
            ride.pickup.stage_until(PICK_UP, ride.departure),
            InternalPlanElement::Leg(passenger_leg),
            ride.dropoff.stage(DROP_OFF),
            InternalPlanElement::Leg(egress),
        ],
    })
}

/// Plans both sides of a joint trip where the passenger is picked up at the origin of the passenger's
/// trip and dropped off at its destination. Whoever reaches the pick-up first waits for the other.
pub fn plan_joint_trip_insertion(
    router: &dyn Router,
    driver: &InternalPerson,
    driver_leg_index: usize,
    passenger: &InternalPerson,
    passenger_leg_index: usize,
) -> JointTripResult<[Splice; 2]> {
    let (p_origin, p_leg, p_destination) = single_leg_trip(passenger, passenger_leg_index)?;
    let pickup = MeetingPoint::at(p_origin);
    let dropoff = MeetingPoint::at(p_destination);
    let p_departure = departure_of(p_origin, p_leg);
    let passenger_at_pickup =
        p_departure + access_walk(&MeetingPoint::at(p_origin), &pickup, p_departure).travel_time();

    let (driver_splice, ride) = plan_driver_insertion(
        router,
        driver,
        driver_leg_index,
        &pickup,
        &dropoff,
        passenger.id(),
        passenger_at_pickup,
    )?;
    let passenger_splice =
        plan_passenger_insertion(passenger, passenger_leg_index, driver.id(), &ride)?;
    Ok([driver_splice, passenger_splice])
}

/// Index of the passenger leg of `passenger` that is served by `driver` between the given links.
pub fn find_passenger_leg(
    passenger: &InternalPerson,
    driver: &Id<InternalPerson>,
    start: &Id<Link>,
    end: &Id<Link>,
) -> Option<usize> {
    let plan = passenger.selected_plan()?;
    plan.elements.iter().position(|e| {
        e.as_leg()
            .and_then(|l| l.route.as_ref())
            .is_some_and(|r| {
                r.as_passenger().is_some_and(|p| p.driver() == driver)
                    && r.start_link() == start
                    && r.end_link() == end
            })
    })
}

/// Replaces the whole trip containing the passenger leg at `leg_index` by the leg the passenger used
/// before the joint trip was inserted.
pub fn plan_passenger_restoration(
    passenger: &InternalPerson,
    leg_index: usize,
) -> JointTripResult<Splice> {
    let plan = passenger.selected_plan().ok_or_else(|| {
        JointTripError::ConsistencyViolation(format!("person {} has no selected plan", passenger.id()))
    })?;
    let route = plan
        .leg_at(leg_index)
        .and_then(|l| l.passenger_route())
        .ok_or_else(|| {
            JointTripError::ConsistencyViolation(format!(
                "element {leg_index} of person {} is not a passenger leg",
                passenger.id()
            ))
        })?;
    let trip = find_trip_containing_index(&plan.elements, leg_index).ok_or_else(|| {
        JointTripError::ConsistencyViolation(format!(
            "passenger leg {leg_index} of person {} is not part of a trip",
            passenger.id()
        ))
    })?;

    let mut leg = route.independent_leg().clone();
    leg.dep_time = trip.departure_time().or(leg.dep_time);

    Ok(Splice {
        person: passenger.id().clone(),
        start: trip.origin_index + 1,
        end: trip.destination_index,
        replacement: vec![InternalPlanElement::Leg(leg)],
    })
}

/// Plans the driver side of detaching `passenger` from the driver leg at `leg_index`. If no other
/// passenger remains, the whole trip is replaced by a single routed leg of the driver's access mode.
pub fn plan_driver_removal(
    router: &dyn Router,
    driver: &InternalPerson,
    leg_index: usize,
    passenger: &Id<InternalPerson>,
) -> JointTripResult<Splice> {
    let plan = driver.selected_plan().ok_or_else(|| {
        JointTripError::ConsistencyViolation(format!("person {} has no selected plan", driver.id()))
    })?;
    let leg = plan
        .leg_at(leg_index)
        .filter(|l| l.is_driver_leg())
        .ok_or_else(|| {
            JointTripError::ConsistencyViolation(format!(
                "element {leg_index} of person {} is not a driver leg",
                driver.id()
            ))
        })?;

    let mut updated = leg.clone();
    let route = updated
        .driver_route_mut()
        .expect("Checked to be a driver leg above");
    if !route.remove_passenger(passenger) {
        return Err(JointTripError::ConsistencyViolation(format!(
            "driver {} does not serve passenger {passenger} on leg {leg_index}",
            driver.id()
        )));
    }

    if !route.passengers().is_empty() {
        return Ok(Splice {
            person: driver.id().clone(),
            start: leg_index,
            end: leg_index + 1,
            replacement: vec![InternalPlanElement::Leg(updated)],
        });
    }

    let trip = find_trip_containing_index(&plan.elements, leg_index).ok_or_else(|| {
        JointTripError::ConsistencyViolation(format!(
            "driver leg {leg_index} of person {} is not part of a trip",
            driver.id()
        ))
    })?;
    let access = trip
        .legs
        .first()
        .and_then(|e| e.as_leg())
        .unwrap_or(leg);
    let mode = if access.is_driver_leg() {
        DRIVER_MODE
    } else {
        access.mode.external()
    };
    let departure = trip.departure_time().unwrap_or(0);
    let restored = routed_leg(
        router,
        mode,
        &trip.origin.link_id,
        &trip.destination.link_id,
        departure,
        vehicle_of(leg),
    )?;

    Ok(Splice {
        person: driver.id().clone(),
        start: trip.origin_index + 1,
        end: trip.destination_index,
        replacement: vec![InternalPlanElement::Leg(restored)],
    })
}

/// Plans both sides of removing `passenger` from the driver leg at `driver_leg_index`.
pub fn plan_joint_trip_removal(
    router: &dyn Router,
    driver: &InternalPerson,
    driver_leg_index: usize,
    passenger: &InternalPerson,
) -> JointTripResult<[Splice; 2]> {
    let route = driver
        .selected_plan()
        .and_then(|p| p.leg_at(driver_leg_index))
        .and_then(|l| l.route.as_ref())
        .ok_or_else(|| {
            JointTripError::ConsistencyViolation(format!(
                "element {driver_leg_index} of person {} is not a leg",
                driver.id()
            ))
        })?;
    let passenger_leg_index =
        find_passenger_leg(passenger, driver.id(), route.start_link(), route.end_link()).ok_or_else(
            || {
                JointTripError::ConsistencyViolation(format!(
                    "passenger {} has no leg with driver {}",
                    passenger.id(),
                    driver.id()
                ))
            },
        )?;

    let driver_splice = plan_driver_removal(router, driver, driver_leg_index, passenger.id())?;
    let passenger_splice = plan_passenger_restoration(passenger, passenger_leg_index)?;
    Ok([driver_splice, passenger_splice])
}
