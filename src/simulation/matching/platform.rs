use crate::simulation::config::JointTrips;
use crate::simulation::id::Id;
use crate::simulation::matching::choice::RideRole;
use crate::simulation::population::InternalPerson;
use crate::simulation::replanning::insertion::{pair_detour, TripCandidate, TIE_TOLERANCE};
use crate::simulation::social_network::SocialNetworkStore;
use rand::rngs::SmallRng;
use rand::Rng;
use tracing::{debug, trace};

/// A request to share the ride of one trip. The leg keeps its current mode if the request stays
/// unmatched.
#[derive(Debug, Clone, PartialEq)]
pub struct RideRequest {
    pub id: usize,
    pub role: RideRole,
    pub trip: TripCandidate,
    pub fallback_mode: String,
}

/// A driver request paired with a passenger request.
#[derive(Debug, Clone, PartialEq)]
pub struct Mating {
    pub driver: Id<InternalPerson>,
    pub driver_leg_index: usize,
    pub passenger: Id<InternalPerson>,
    pub passenger_leg_index: usize,
    pub detour_fraction: f64,
}

/// Collects ride requests during the choice pass and resolves them afterwards.
#[derive(Debug, Default)]
pub struct RidesharingPlatform {
    requests: Vec<RideRequest>,
}

impl RidesharingPlatform {
    pub fn new() -> Self {
        RidesharingPlatform::default()
    }

    /// Queues a request. Request ids follow the submission order.
    pub fn submit(&mut self, role: RideRole, trip: TripCandidate, fallback_mode: &str) -> usize {
        let id = self.requests.len();
        trace!(id, person = %trip.person, ?role, "ride request");
        self.requests.push(RideRequest {
            id,
            role,
            trip,
            fallback_mode: fallback_mode.to_string(),
        });
        id
    }

    pub fn requests(&self) -> &[RideRequest] {
        &self.requests
    }

    /// Passenger requests are processed in submission order. Each one is matched with the open
    /// driver request of smallest detour. Equal detours are ordered by (driver, request id) and
    /// picked at random. A driver request serves at most one passenger. Returns the matings and the
    /// unmatched requests, both in submission order of the passenger or request.
    pub fn resolve(
        &self,
        config: &JointTrips,
        social_network: Option<&dyn SocialNetworkStore>,
        rng: &mut SmallRng,
    ) -> (Vec<Mating>, Vec<RideRequest>) {
        let mut open_drivers: Vec<&RideRequest> = self
            .requests
            .iter()
            .filter(|r| r.role == RideRole::Driver)
            .collect();
        let mut matched = vec![false; self.requests.len()];
        let mut matings = Vec::new();

        for passenger in self
            .requests
            .iter()
            .filter(|r| r.role == RideRole::Passenger)
        {
            let feasible: Vec<(usize, f64)> = open_drivers
                .iter()
                .enumerate()
                .filter_map(|(i, d)| {
                    pair_detour(config, social_network, &d.trip, &passenger.trip).map(|f| (i, f))
                })
                .collect();
            let Some(best) = feasible.iter().map(|(_, f)| *f).reduce(f64::min) else {
                continue;
            };
            let mut tied: Vec<usize> = feasible
                .iter()
                .filter(|(_, f)| *f - best <= TIE_TOLERANCE)
                .map(|(i, _)| *i)
                .collect();
            tied.sort_by(|a, b| {
                let (a, b) = (open_drivers[*a], open_drivers[*b]);
                (&a.trip.person, a.id).cmp(&(&b.trip.person, b.id))
            });
            let chosen = tied[rng.random_range(0..tied.len())];
            let driver = open_drivers.remove(chosen);

            matched[driver.id] = true;
            matched[passenger.id] = true;
            matings.push(Mating {
                driver: driver.trip.person.clone(),
                driver_leg_index: driver.trip.leg_index,
                passenger: passenger.trip.person.clone(),
                passenger_leg_index: passenger.trip.leg_index,
                detour_fraction: best,
            });
        }

        let unmatched: Vec<RideRequest> = self
            .requests
            .iter()
            .filter(|r| !matched[r.id])
            .cloned()
            .collect();
        debug!(
            requests = self.requests.len(),
            matings = matings.len(),
            unmatched = unmatched.len(),
            "resolved ride requests"
        );
        (matings, unmatched)
    }
}
