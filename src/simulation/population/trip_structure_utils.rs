use crate::simulation::population::{InternalActivity, InternalLeg, InternalPlanElement};

/// A trip is a sequence of plan elements between two non-stage activities. The indices refer to the
/// positions of the origin and destination activity in the plan.
#[derive(Debug, PartialEq)]
pub struct Trip<'a> {
    pub origin: &'a InternalActivity,
    pub legs: &'a [InternalPlanElement],
    pub destination: &'a InternalActivity,
    pub origin_index: usize,
    pub destination_index: usize,
}

impl Trip<'_> {
    /// The leg of a trip consisting of exactly one leg.
    pub fn single_leg(&self) -> Option<&InternalLeg> {
        match self.legs {
            [InternalPlanElement::Leg(leg)] => Some(leg),
            _ => None,
        }
    }

    /// Plan index of the leg of a single leg trip.
    pub fn single_leg_index(&self) -> Option<usize> {
        self.single_leg().map(|_| self.origin_index + 1)
    }

    pub fn contains_joint_leg(&self) -> bool {
        self.legs
            .iter()
            .filter_map(|e| e.as_leg())
            .any(|leg| leg.is_joint())
    }

    /// Departure time of the trip. Falls back to the departure time of the first leg.
    pub fn departure_time(&self) -> Option<u32> {
        self.origin.end_time.or_else(|| {
            self.legs
                .iter()
                .find_map(|e| e.as_leg())
                .and_then(|leg| leg.dep_time)
        })
    }
}

/// Extracts trips from a plan, using is_stage_activity to identify stage activities.
pub fn get_trips<F>(plan_elements: &[InternalPlanElement], mut is_stage_activity: F) -> Vec<Trip>
where
    F: FnMut(&InternalActivity) -> bool,
{
    let mut trips = Vec::new();
    let mut origin_activity_index: Option<usize> = None;
    for (current_index, pe) in plan_elements.iter().enumerate() {
        let act = match pe.as_activity() {
            Some(a) => a,
            None => continue,
        };
        if is_stage_activity(act) {
            continue;
        }

        if let Some(origin_index) = origin_activity_index {
            // There is at least one leg between activities
            if current_index - origin_index > 1 {
                let origin = plan_elements[origin_index]
                    .as_activity()
                    .expect("Origin index always points to an activity");
                trips.push(Trip {
                    origin,
                    legs: &plan_elements[origin_index + 1..current_index],
                    destination: act,
                    origin_index,
                    destination_index: current_index,
                });
            }
        }
        origin_activity_index = Some(current_index);
    }
    trips
}

/// Extracts trips from a plan. Interaction activities and joint trip stages are stage activities.
pub fn get_trips_default(plan_elements: &[InternalPlanElement]) -> Vec<Trip> {
    get_trips(plan_elements, |a| a.is_stage_activity())
}

/// Finds the trip whose elements contain the given plan index.
pub fn find_trip_containing_index(
    plan_elements: &[InternalPlanElement],
    index: usize,
) -> Option<Trip> {
    get_trips_default(plan_elements)
        .into_iter()
        .find(|t| t.origin_index < index && index < t.destination_index)
}

/// A subtour is a sequence of trips that starts and ends at the same location. Nested subtours
/// are reported separately, their trips are not part of the enclosing subtour. Trips that don't
/// return to an earlier location form a final open subtour.
#[derive(Debug, PartialEq, Clone)]
pub struct Subtour {
    /// Indices into the trip vector the subtour was computed from.
    pub trip_indices: Vec<usize>,
    pub closed: bool,
}

pub fn get_subtours(trips: &[Trip]) -> Vec<Subtour> {
    let mut subtours = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    for (i, trip) in trips.iter().enumerate() {
        open.push(i);
        let destination = &trip.destination.link_id;
        if let Some(start) = open
            .iter()
            .rposition(|&t| trips[t].origin.link_id.eq(destination))
        {
            let trip_indices: Vec<usize> = open.drain(start..).collect();
            subtours.push(Subtour {
                trip_indices,
                closed: true,
            });
        }
    }

    if !open.is_empty() {
        subtours.push(Subtour {
            trip_indices: open,
            closed: false,
        });
    }
    subtours
}
