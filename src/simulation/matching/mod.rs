use crate::simulation::config::{JointTrips, Matching};
use crate::simulation::error::{JointTripError, JointTripResult};
use crate::simulation::id::Id;
use crate::simulation::joint::group_plans::recompose_joint_plans;
use crate::simulation::joint::joint_trip::{apply_splices, plan_joint_trip_insertion, routed_leg};
use crate::simulation::joint::plan_links::PlanLinks;
use crate::simulation::joint::JointPlan;
use crate::simulation::matching::choice::{Alternative, ChoiceModel, LogitChoiceModel, RideRole};
use crate::simulation::matching::cliques::build_cliques;
use crate::simulation::matching::platform::{Mating, RideRequest, RidesharingPlatform};
use crate::simulation::population::trip_structure_utils::{get_subtours, get_trips_default};
use crate::simulation::population::{
    InternalGenericRoute, InternalPerson, InternalRoute, Population,
};
use crate::simulation::replanning::insertion::TripCandidate;
use crate::simulation::routing::Router;
use crate::simulation::social_network::SocialNetworkStore;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub mod choice;
pub mod cliques;
pub mod platform;

/// Mode chosen for the single leg trip whose leg is at `leg_index`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeChoice {
    pub person: Id<InternalPerson>,
    pub leg_index: usize,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchingResult {
    pub mode_choices: Vec<ModeChoice>,
    pub matings: Vec<Mating>,
    pub unmatched: Vec<RideRequest>,
    /// clique id -> members
    pub cliques: BTreeMap<String, Vec<Id<InternalPerson>>>,
}

/// Turns per agent choices into ride requests, resolves them into matings and groups the matched
/// persons into cliques. The scan over the population is sequential and follows the person order,
/// so a fixed seed yields a fixed result. The last result is cached until `mark_changed` is called
/// or a configuration is replaced.
pub struct MatchingEngine {
    matching: Matching,
    joint_trips: JointTrips,
    choice_model: Box<dyn ChoiceModel>,
    social_network: Option<Arc<dyn SocialNetworkStore>>,
    cached: Option<MatchingResult>,
    computations: usize,
}

impl MatchingEngine {
    pub fn new(
        matching: Matching,
        joint_trips: JointTrips,
        social_network: Option<Arc<dyn SocialNetworkStore>>,
    ) -> JointTripResult<Self> {
        let choice_model = Box::new(LogitChoiceModel::from_config(&matching));
        MatchingEngine::with_choice_model(matching, joint_trips, social_network, choice_model)
    }

    pub fn with_choice_model(
        matching: Matching,
        joint_trips: JointTrips,
        social_network: Option<Arc<dyn SocialNetworkStore>>,
        choice_model: Box<dyn ChoiceModel>,
    ) -> JointTripResult<Self> {
        if joint_trips.use_social_network_constraint && social_network.is_none() {
            return Err(JointTripError::Configuration(
                "the social network constraint is enabled, but no social network was provided"
                    .to_string(),
            ));
        }
        Ok(MatchingEngine {
            matching,
            joint_trips,
            choice_model,
            social_network,
            cached: None,
            computations: 0,
        })
    }

    /// Invalidates the cached result.
    pub fn mark_changed(&mut self) {
        self.cached = None;
    }

    pub fn set_matching_config(&mut self, matching: Matching) {
        self.choice_model = Box::new(LogitChoiceModel::from_config(&matching));
        self.matching = matching;
        self.mark_changed();
    }

    pub fn set_joint_trips_config(&mut self, joint_trips: JointTrips) {
        self.joint_trips = joint_trips;
        self.mark_changed();
    }

    /// Number of times the matching was actually computed.
    pub fn computations(&self) -> usize {
        self.computations
    }

    /// The matching result for `population`, computed if nothing is cached.
    pub fn result(&mut self, population: &Population) -> &MatchingResult {
        if self.cached.is_none() {
            let result = self.compute(population);
            self.cached = Some(result);
        }
        self.cached.as_ref().expect("Result was cached above")
    }

    #[instrument(level = "debug", skip_all)]
    fn compute(&mut self, population: &Population) -> MatchingResult {
        self.computations += 1;
        let mut rng = SmallRng::seed_from_u64(self.matching.random_seed);
        let mut platform = RidesharingPlatform::new();
        let mut mode_choices = Vec::new();

        for person in population.persons.values() {
            self.choose_for_person(person, &mut platform, &mut mode_choices, &mut rng);
        }

        let social_network = if self.joint_trips.use_social_network_constraint {
            self.social_network.as_deref()
        } else {
            None
        };
        let (matings, unmatched) = platform.resolve(&self.joint_trips, social_network, &mut rng);
        let cliques = build_cliques(&matings);

        info!(
            mode_choices = mode_choices.len(),
            requests = platform.requests().len(),
            matings = matings.len(),
            cliques = cliques.len(),
            "Computed matching"
        );
        MatchingResult {
            mode_choices,
            matings,
            unmatched,
            cliques,
        }
    }

    /// Only single leg trips that are not yet part of a joint trip take part. With subtour level
    /// choice, one alternative is chosen per subtour and used for all its eligible trips.
    fn choose_for_person(
        &self,
        person: &InternalPerson,
        platform: &mut RidesharingPlatform,
        mode_choices: &mut Vec<ModeChoice>,
        rng: &mut SmallRng,
    ) {
        let Some(plan) = person.selected_plan() else {
            return;
        };
        let trips = get_trips_default(&plan.elements);
        let eligible: Vec<Option<(TripCandidate, String)>> = trips
            .iter()
            .map(|trip| {
                let candidate = TripCandidate::from_trip(person.id(), trip)?;
                let mode = trip.single_leg()?.mode.external().to_string();
                Some((candidate, mode))
            })
            .collect();

        let choice_units: Vec<Vec<usize>> = if self.joint_trips.use_subtour_level_choice {
            get_subtours(&trips)
                .into_iter()
                .map(|s| s.trip_indices)
                .collect()
        } else {
            (0..trips.len()).map(|i| vec![i]).collect()
        };

        for unit in choice_units {
            let members: Vec<&(TripCandidate, String)> =
                unit.iter().filter_map(|i| eligible[*i].as_ref()).collect();
            if members.is_empty() {
                continue;
            }
            let can_drive = members
                .iter()
                .all(|(_, mode)| self.joint_trips.driver_modes.contains(mode));
            let choice_set = self.choice_set(can_drive);
            let alternative = &choice_set[self.choice_model.choose(&choice_set, rng)];

            for (candidate, current_mode) in members {
                match alternative {
                    Alternative::Mode(mode) => mode_choices.push(ModeChoice {
                        person: candidate.person.clone(),
                        leg_index: candidate.leg_index,
                        mode: mode.clone(),
                    }),
                    Alternative::RequestRide(role) => {
                        platform.submit(*role, candidate.clone(), current_mode);
                    }
                }
            }
        }
    }

    /// Configured modes plus ride requests. Only trips done with a driver mode may offer a ride.
    fn choice_set(&self, can_drive: bool) -> Vec<Alternative> {
        let mut choice_set: Vec<Alternative> = self
            .matching
            .modes
            .iter()
            .map(|m| Alternative::Mode(m.clone()))
            .collect();
        if can_drive {
            choice_set.push(Alternative::RequestRide(RideRole::Driver));
        }
        choice_set.push(Alternative::RequestRide(RideRole::Passenger));
        choice_set
    }

    /// Writes the current result into the population: sets the chosen modes, puts the legs of
    /// unmatched requests back to their fallback mode, inserts a joint trip per mating and recomposes
    /// the joint plans. The population must be the one the result was computed for. Returns the joint
    /// plans linked for the population.
    #[instrument(level = "debug", skip_all)]
    pub fn apply(
        &mut self,
        population: &mut Population,
        router: &dyn Router,
        plan_links: &PlanLinks,
    ) -> JointTripResult<Vec<JointPlan>> {
        let result = self.result(population).clone();
        let driver_modes = self.joint_trips.driver_modes.clone();

        for choice in &result.mode_choices {
            apply_mode_choice(population, router, &driver_modes, choice)?;
        }
        for request in &result.unmatched {
            debug!(
                person = %request.trip.person,
                role = ?request.role,
                "Unmatched ride request falls back to {}",
                request.fallback_mode
            );
            let fallback = ModeChoice {
                person: request.trip.person.clone(),
                leg_index: request.trip.leg_index,
                mode: request.fallback_mode.clone(),
            };
            apply_mode_choice(population, router, &driver_modes, &fallback)?;
        }

        let mut splices = Vec::with_capacity(result.matings.len() * 2);
        for mating in &result.matings {
            let driver = person(population, &mating.driver)?;
            let passenger = person(population, &mating.passenger)?;
            splices.extend(plan_joint_trip_insertion(
                router,
                driver,
                mating.driver_leg_index,
                passenger,
                mating.passenger_leg_index,
            )?);
        }
        apply_splices(&mut population.persons, splices)?;

        recompose_joint_plans(plan_links, &population.persons)
    }
}

fn person<'a>(
    population: &'a Population,
    id: &Id<InternalPerson>,
) -> JointTripResult<&'a InternalPerson> {
    population.persons.get(id).ok_or_else(|| {
        JointTripError::ConsistencyViolation(format!("matched person {id} is not part of the population"))
    })
}

/// Changes the mode of a leg in place. Driver modes get a network route, other modes keep the
/// endpoints, travel time and distance of the previous route.
fn apply_mode_choice(
    population: &mut Population,
    router: &dyn Router,
    driver_modes: &[String],
    choice: &ModeChoice,
) -> JointTripResult<()> {
    let person = population.persons.get_mut(&choice.person).ok_or_else(|| {
        JointTripError::ConsistencyViolation(format!(
            "person {} of a mode choice is not part of the population",
            choice.person
        ))
    })?;
    let leg = person
        .selected_plan_mut()
        .leg_at_mut(choice.leg_index)
        .ok_or_else(|| {
            JointTripError::ConsistencyViolation(format!(
                "element {} of person {} is not a leg",
                choice.leg_index, choice.person
            ))
        })?;
    if leg.mode.external() == choice.mode {
        return Ok(());
    }
    let route = leg.route.as_ref().ok_or_else(|| {
        JointTripError::ConsistencyViolation(format!(
            "leg {} of person {} has no route",
            choice.leg_index, choice.person
        ))
    })?;

    let updated = if driver_modes.contains(&choice.mode) {
        routed_leg(
            router,
            &choice.mode,
            route.start_link(),
            route.end_link(),
            leg.dep_time.unwrap_or(0),
            None,
        )?
    } else {
        let generic = route.as_generic();
        let mut updated = leg.clone();
        updated.mode = Id::create(&choice.mode);
        updated.routing_mode = Some(updated.mode.clone());
        updated.route = Some(InternalRoute::Generic(InternalGenericRoute::new(
            generic.start_link().clone(),
            generic.end_link().clone(),
            Some(leg.travel_time()),
            generic.distance(),
            None,
        )));
        updated
    };
    *leg = updated;
    Ok(())
}
