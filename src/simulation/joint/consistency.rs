use crate::simulation::error::{JointTripError, JointTripResult};
use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::population::InternalPerson;
use std::collections::BTreeMap;

/// (driver, passenger, start link, end link) of one side of a joint trip.
type RideKey = (
    Id<InternalPerson>,
    Id<InternalPerson>,
    Id<Link>,
    Id<Link>,
);

/// Verifies that every passenger listed in a driver route has a passenger route referencing that
/// driver with the same start and end link, and vice versa. Only the selected plans are checked.
/// Both partners must be part of `persons`.
pub fn check_driver_passenger_consistency<'a>(
    persons: impl IntoIterator<Item = &'a InternalPerson>,
) -> JointTripResult<()> {
    let mut driver_side: BTreeMap<RideKey, usize> = BTreeMap::new();
    let mut passenger_side: BTreeMap<RideKey, usize> = BTreeMap::new();

    for person in persons {
        let Some(plan) = person.selected_plan() else {
            continue;
        };
        for leg in plan.legs() {
            let Some(route) = leg.route.as_ref() else {
                continue;
            };
            if let Some(driver_route) = route.as_driver() {
                for passenger in driver_route.passengers() {
                    let key = (
                        person.id().clone(),
                        passenger.clone(),
                        route.start_link().clone(),
                        route.end_link().clone(),
                    );
                    *driver_side.entry(key).or_default() += 1;
                }
            } else if let Some(passenger_route) = route.as_passenger() {
                let key = (
                    passenger_route.driver().clone(),
                    person.id().clone(),
                    route.start_link().clone(),
                    route.end_link().clone(),
                );
                *passenger_side.entry(key).or_default() += 1;
            }
        }
    }

    for (key, count) in &driver_side {
        let partner = passenger_side.get(key).copied().unwrap_or(0);
        if partner != *count {
            return Err(violation(key, *count, partner));
        }
    }
    for (key, count) in &passenger_side {
        if !driver_side.contains_key(key) {
            return Err(violation(key, 0, *count));
        }
    }
    Ok(())
}

fn violation(key: &RideKey, driver_legs: usize, passenger_legs: usize) -> JointTripError {
    let (driver, passenger, from, to) = key;
    JointTripError::ConsistencyViolation(format!(
        "driver {driver} and passenger {passenger} disagree on the ride from link {from} to link {to}: \
         {driver_legs} driver legs vs. {passenger_legs} passenger legs"
    ))
}

#[cfg(test)]
mod tests {
    use crate::simulation::error::JointTripError;
    use crate::simulation::id::Id;
    use crate::simulation::joint::consistency::check_driver_passenger_consistency;
    use crate::simulation::population::{
        DriverRoute, InternalActivity, InternalGenericRoute, InternalLeg, InternalNetworkRoute,
        InternalPerson, InternalPlan, InternalRoute, PassengerRoute, DRIVER_MODE, PASSENGER_MODE,
    };
    use std::collections::BTreeSet;

    fn person_with_leg(id: &str, route: InternalRoute, mode: &str) -> InternalPerson {
        let mut plan = InternalPlan::default();
        plan.add_act(InternalActivity::new(0., 0., "home", Id::create("cons-a"), None, Some(0), None));
        plan.add_leg(InternalLeg::new(route, mode, 10, None));
        plan.add_act(InternalActivity::new(0., 0., "work", Id::create("cons-b"), None, None, None));
        InternalPerson::new(Id::create(id), plan)
    }

    fn driver(id: &str, passengers: &[&str]) -> InternalPerson {
        let generic =
            InternalGenericRoute::new(Id::create("cons-a"), Id::create("cons-b"), Some(10), None, None);
        let network =
            InternalNetworkRoute::new(generic, vec![Id::create("cons-a"), Id::create("cons-b")]);
        let passengers: BTreeSet<_> = passengers.iter().map(|p| Id::create(p)).collect();
        person_with_leg(
            id,
            InternalRoute::Driver(DriverRoute::new(network, passengers)),
            DRIVER_MODE,
        )
    }

    fn passenger(id: &str, driver: &str) -> InternalPerson {
        let generic =
            InternalGenericRoute::new(Id::create("cons-a"), Id::create("cons-b"), Some(10), None, None);
        person_with_leg(
            id,
            InternalRoute::Passenger(PassengerRoute::new(
                generic.clone(),
                Id::create(driver),
                InternalLeg::new(InternalRoute::Generic(generic), "walk", 10, None),
            )),
            PASSENGER_MODE,
        )
    }

    #[test]
    fn symmetric_pair_is_consistent() {
        let persons = [driver("cons-d", &["cons-p"]), passenger("cons-p", "cons-d")];
        assert!(check_driver_passenger_consistency(&persons).is_ok());
    }

    #[test]
    fn passenger_without_driver_entry() {
        let persons = [driver("cons-d2", &[]), passenger("cons-p2", "cons-d2")];
        assert!(matches!(
            check_driver_passenger_consistency(&persons),
            Err(JointTripError::ConsistencyViolation(_))
        ));
    }

    #[test]
    fn driver_references_missing_passenger() {
        let persons = [driver("cons-d3", &["cons-p3"])];
        assert!(matches!(
            check_driver_passenger_consistency(&persons),
            Err(JointTripError::ConsistencyViolation(_))
        ));
    }

    #[test]
    fn passenger_references_other_driver() {
        let persons = [
            driver("cons-d4", &["cons-p4"]),
            driver("cons-d5", &[]),
            passenger("cons-p4", "cons-d5"),
        ];
        assert!(check_driver_passenger_consistency(&persons).is_err());
    }
}
