use crate::simulation::config::{write_config, Config};
use crate::simulation::error::JointTripResult;
use crate::simulation::events::{EventsManager, SynchronizationTimeoutEvent};
use crate::simulation::joint::consistency::check_driver_passenger_consistency;
use crate::simulation::joint::plan_links::PlanLinks;
use crate::simulation::matching::MatchingEngine;
use crate::simulation::population::{DRIVER_MODE, PASSENGER_MODE};
use crate::simulation::replanning::algorithm::{
    GroupReplanningAlgorithm, JointTripInsertorAndRemoverAlgorithm,
};
use crate::simulation::replanning::{build_groups, replan_groups_parallel, ReplanningContext};
use crate::simulation::scenario::Scenario;
use crate::simulation::simulation::{Simulation, SimulationSummary};
use crate::simulation::social_network::SocialNetworkStore;
use serde::Serialize;
use std::cell::RefCell;
use std::fs;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use tracing::{info, instrument, warn};

/// A passenger who gave up waiting for its driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissedPickup {
    pub time: u32,
    pub passenger: String,
    pub driver: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationSummary {
    pub iteration: usize,
    pub persons: usize,
    pub matings: usize,
    pub cliques: usize,
    pub replanning_groups: usize,
    pub replanning_moves: usize,
    pub driver_legs: usize,
    pub passenger_legs: usize,
    pub joint_plans: usize,
    pub simulation: SimulationSummary,
    pub missed_pickups: Vec<MissedPickup>,
}

/// Runs iterations of matching, joint trip replanning and movement simulation on one scenario.
pub struct JointTripsController {
    config: Config,
    scenario: Scenario,
    plan_links: Arc<PlanLinks>,
    matching_engine: MatchingEngine,
    context: ReplanningContext,
    algorithm: Box<dyn GroupReplanningAlgorithm>,
    events: Rc<RefCell<EventsManager>>,
    missed_pickups: Rc<RefCell<Vec<MissedPickup>>>,
    workers: usize,
    iteration: usize,
}

/// Collects the synchronization timeouts of a simulation and warns about them once it finished.
fn collect_missed_pickups(events: &mut EventsManager, missed: Rc<RefCell<Vec<MissedPickup>>>) {
    let collect = missed.clone();
    events.on::<SynchronizationTimeoutEvent, _>(move |e| {
        collect.borrow_mut().push(MissedPickup {
            time: e.time,
            passenger: e.person.external().to_string(),
            driver: e.driver.external().to_string(),
        })
    });
    events.on_finish(move || {
        let missed = missed.borrow();
        if !missed.is_empty() {
            warn!(
                missed = missed.len(),
                "Passengers gave up waiting for their driver"
            );
        }
    });
}

impl JointTripsController {
    /// Fails if the social network constraint is enabled but the scenario has no social network.
    pub fn new(config: Config, scenario: Scenario) -> JointTripResult<Self> {
        let joint_trips = config.joint_trips();
        let social_network = scenario
            .social_network
            .clone()
            .map(|s| s as Arc<dyn SocialNetworkStore>);
        let plan_links = Arc::new(PlanLinks::new());

        let matching_engine =
            MatchingEngine::new(config.matching(), joint_trips.clone(), social_network.clone())?;
        let context = ReplanningContext::new(
            plan_links.clone(),
            scenario.router(),
            social_network,
            joint_trips.clone(),
        )?;
        let algorithm = Box::new(JointTripInsertorAndRemoverAlgorithm::from_config(&joint_trips));
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let mut events = EventsManager::new();
        let missed_pickups = Rc::new(RefCell::new(Vec::new()));
        collect_missed_pickups(&mut events, missed_pickups.clone());

        Ok(JointTripsController {
            config,
            scenario,
            plan_links,
            matching_engine,
            context,
            algorithm,
            events: Rc::new(RefCell::new(events)),
            missed_pickups,
            workers,
            iteration: 0,
        })
    }

    pub fn with_algorithm(mut self, algorithm: Box<dyn GroupReplanningAlgorithm>) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Event handlers registered here receive the events of all following simulations.
    pub fn events(&self) -> Rc<RefCell<EventsManager>> {
        self.events.clone()
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn plan_links(&self) -> &PlanLinks {
        &self.plan_links
    }

    #[instrument(level = "info", skip(self))]
    pub fn run_iteration(&mut self) -> JointTripResult<IterationSummary> {
        let router = self.scenario.router();
        let population = &mut self.scenario.population;

        self.matching_engine.mark_changed();
        let matching = self.matching_engine.result(population).clone();
        self.matching_engine
            .apply(population, router.as_ref(), &self.plan_links)?;
        check_driver_passenger_consistency(population.persons.values())?;

        let persons = std::mem::take(&mut population.persons);
        let mut groups = build_groups(
            persons,
            &matching.cliques,
            self.context.config().group_size,
        );
        let replanned = replan_groups_parallel(
            &self.context,
            self.algorithm.as_ref(),
            &mut groups,
            self.workers,
        );
        let replanning_groups = groups.len();
        for group in groups {
            for person in group.into_persons() {
                population.add_person(person);
            }
        }
        let moves = replanned?;
        check_driver_passenger_consistency(population.persons.values())?;

        self.missed_pickups.borrow_mut().clear();
        let simulation_summary = Simulation::new(
            &self.config,
            self.scenario.network.clone(),
            &self.scenario.population,
            self.events.clone(),
        )
        .run();

        let population = &self.scenario.population;
        let summary = IterationSummary {
            iteration: self.iteration,
            persons: population.persons.len(),
            matings: matching.matings.len(),
            cliques: matching.cliques.len(),
            replanning_groups,
            replanning_moves: moves.iter().sum(),
            driver_legs: population.count_legs_with_mode(DRIVER_MODE),
            passenger_legs: population.count_legs_with_mode(PASSENGER_MODE),
            joint_plans: self.plan_links.len(),
            simulation: simulation_summary,
            missed_pickups: self.missed_pickups.borrow().clone(),
        };
        info!(?summary, "Finished iteration");
        self.iteration += 1;
        Ok(summary)
    }

    /// Writes the joint plans, the summary and the config used into the output directory.
    pub fn write_output(&self, summary: &IterationSummary) {
        let output_dir = self.config.output().output_dir;
        fs::create_dir_all(&output_dir).expect("Failed to create output directory");

        let joint_plans = self
            .plan_links
            .records_json()
            .expect("Failed to serialize joint plans");
        File::create(output_dir.join("output_joint_plans.json"))
            .and_then(|mut f| f.write_all(joint_plans.as_bytes()))
            .expect("Failed to write joint plans");

        let summary_file = File::create(output_dir.join("output_summary.json"))
            .expect("Failed to create summary file");
        serde_json::to_writer_pretty(BufWriter::new(summary_file), summary)
            .expect("Failed to write summary");

        write_config(&self.config, PathBuf::from(&output_dir));
        info!("Wrote output to {:?}", output_dir);
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::config::{Config, JointTrips, Output};
    use crate::simulation::controller::JointTripsController;
    use crate::simulation::error::JointTripError;
    use crate::simulation::id::Id;
    use crate::simulation::population::InternalPlanElement;
    use crate::simulation::replanning::algorithm::{
        JointTripInsertorAlgorithm, JointTripRemoverAlgorithm,
    };
    use crate::simulation::scenario::{Scenario, COUPLE_DEPARTURE};

    #[test]
    fn removal_iteration() {
        let scenario = Scenario::corridor_couples("controller-rm", 4, true).unwrap();
        let mut controller = JointTripsController::new(Config::default(), scenario)
            .unwrap()
            .with_algorithm(Box::new(JointTripRemoverAlgorithm { iterative: true }))
            .with_workers(2);

        let summary = controller.run_iteration().unwrap();
        assert_eq!(8, summary.persons);
        assert_eq!(0, summary.driver_legs);
        assert_eq!(0, summary.passenger_legs);
        assert_eq!(0, summary.joint_plans);
        assert_eq!(8, summary.simulation.agents);
        assert_eq!(0, summary.simulation.agents_en_route);
        assert_eq!(1, controller.run_iteration().unwrap().iteration);
    }

    #[test]
    fn missing_social_network() {
        let mut scenario = Scenario::corridor_couples("controller-cfg", 1, false).unwrap();
        scenario.social_network = None;
        let mut config = Config::default();
        config.set_joint_trips(JointTrips {
            use_social_network_constraint: true,
            ..JointTrips::default()
        });
        assert!(matches!(
            JointTripsController::new(config, scenario),
            Err(JointTripError::Configuration(_))
        ));
    }

    #[test]
    fn writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.set_output(Output {
            output_dir: dir.path().to_path_buf(),
            ..Output::default()
        });
        let scenario = Scenario::corridor_couples("controller-out", 2, true).unwrap();
        let mut controller = JointTripsController::new(config, scenario).unwrap();
        let summary = controller.run_iteration().unwrap();
        controller.write_output(&summary);

        assert!(dir.path().join("output_joint_plans.json").exists());
        assert!(dir.path().join("output_summary.json").exists());
        assert!(dir.path().join("output_config.yml").exists());
    }

    #[test]
    fn late_driver_is_reported() {
        let prefix = "controller-late";
        let mut scenario = Scenario::corridor_couples(prefix, 2, true).unwrap();
        let driver = scenario
            .population
            .persons
            .get_mut(&Id::create(&format!("{prefix}-driver-0")))
            .unwrap();
        if let InternalPlanElement::Activity(home) = &mut driver.selected_plan_mut().elements[0] {
            home.end_time = Some(COUPLE_DEPARTURE + 7200);
        }
        let mut controller = JointTripsController::new(Config::default(), scenario)
            .unwrap()
            .with_algorithm(Box::new(JointTripInsertorAlgorithm { iterative: true }));

        let summary = controller.run_iteration().unwrap();
        assert_eq!(1, summary.simulation.synchronization_timeouts);
        assert_eq!(1, summary.missed_pickups.len());
        let missed = &summary.missed_pickups[0];
        assert_eq!(format!("{prefix}-passenger-0"), missed.passenger);
        assert_eq!(format!("{prefix}-driver-0"), missed.driver);

        // the report covers one iteration only
        let driver = controller
            .scenario
            .population
            .persons
            .get_mut(&Id::create(&format!("{prefix}-driver-0")))
            .unwrap();
        if let InternalPlanElement::Activity(home) = &mut driver.selected_plan_mut().elements[0] {
            home.end_time = Some(COUPLE_DEPARTURE);
        }
        let summary = controller.run_iteration().unwrap();
        assert!(summary.missed_pickups.is_empty());
    }
}
