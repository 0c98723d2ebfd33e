use rust_joint_trips::simulation::config::JointTrips;
use rust_joint_trips::simulation::id::Id;
use rust_joint_trips::simulation::joint::consistency::check_driver_passenger_consistency;
use rust_joint_trips::simulation::joint::group_plans::recompose_joint_plans;
use rust_joint_trips::simulation::joint::plan_links::PlanLinks;
use rust_joint_trips::simulation::joint::PlanRef;
use rust_joint_trips::simulation::population::{
    InternalPerson, Population, DRIVER_MODE, PASSENGER_MODE,
};
use rust_joint_trips::simulation::replanning::algorithm::{
    GroupReplanningAlgorithm, JointTripInsertorAlgorithm, JointTripInsertorAndRemoverAlgorithm,
    JointTripRemoverAlgorithm,
};
use rust_joint_trips::simulation::replanning::{
    build_groups, replan_group, replan_groups_parallel, ReplanningContext, ReplanningGroup,
};
use rust_joint_trips::test_utils::{corridor_router, couple_persons, couples_social_network};
use std::collections::BTreeMap;
use std::sync::Arc;

const COUPLES: usize = 100;

fn persons(
    prefix: &str,
    couples: usize,
    shared: impl Fn(usize) -> bool,
) -> BTreeMap<Id<InternalPerson>, InternalPerson> {
    let mut persons = BTreeMap::new();
    for i in 0..couples {
        let (driver, passenger) = couple_persons(prefix, i, shared(i));
        persons.insert(driver.id().clone(), driver);
        persons.insert(passenger.id().clone(), passenger);
    }
    persons
}

fn context(prefix: &str, plan_links: Arc<PlanLinks>, config: JointTrips) -> ReplanningContext {
    ReplanningContext::new(
        plan_links,
        corridor_router(prefix),
        Some(Arc::new(couples_social_network(prefix, COUPLES))),
        config,
    )
    .unwrap()
}

/// Runs the algorithm on all persons as one group. Returns (driver legs, passenger legs).
fn run_single_group(
    context: &ReplanningContext,
    algorithm: &dyn GroupReplanningAlgorithm,
    persons: BTreeMap<Id<InternalPerson>, InternalPerson>,
) -> (usize, usize) {
    recompose_joint_plans(context.plan_links(), &persons).unwrap();
    let mut group = ReplanningGroup::new(0, persons.into_values());
    replan_group(context, algorithm, &mut group).unwrap();
    check_driver_passenger_consistency(group.persons.values()).unwrap();

    let mut population = Population::new();
    for person in group.into_persons() {
        population.add_person(person);
    }
    (
        population.count_legs_with_mode(DRIVER_MODE),
        population.count_legs_with_mode(PASSENGER_MODE),
    )
}

#[test]
fn iterative_removal_removes_all_joint_trips() {
    let prefix = "it-rm-all";
    let plan_links = Arc::new(PlanLinks::new());
    let context = context(prefix, plan_links.clone(), JointTrips::default());

    let legs = run_single_group(
        &context,
        &JointTripRemoverAlgorithm { iterative: true },
        persons(prefix, COUPLES, |_| true),
    );
    assert_eq!((0, 0), legs);
    assert!(plan_links.is_empty());
}

#[test]
fn single_removal_removes_one_joint_trip() {
    let prefix = "it-rm-one";
    let plan_links = Arc::new(PlanLinks::new());
    let context = context(prefix, plan_links.clone(), JointTrips::default());

    let legs = run_single_group(
        &context,
        &JointTripRemoverAlgorithm { iterative: false },
        persons(prefix, COUPLES, |_| true),
    );
    assert_eq!((COUPLES - 1, COUPLES - 1), legs);
    assert_eq!(COUPLES - 1, plan_links.len());
}

#[test]
fn iterative_insertion_pairs_everybody() {
    let prefix = "it-ins-all";
    let plan_links = Arc::new(PlanLinks::new());
    let context = context(prefix, plan_links.clone(), JointTrips::default());

    let legs = run_single_group(
        &context,
        &JointTripInsertorAlgorithm { iterative: true },
        persons(prefix, COUPLES, |_| false),
    );
    assert_eq!((COUPLES, COUPLES), legs);
    assert_eq!(COUPLES, plan_links.len());
}

#[test]
fn insertion_respects_social_ties() {
    let prefix = "it-ins-social";
    let plan_links = Arc::new(PlanLinks::new());
    let config = JointTrips {
        use_social_network_constraint: true,
        ..JointTrips::default()
    };
    let context = context(prefix, plan_links.clone(), config);

    run_single_group(
        &context,
        &JointTripInsertorAlgorithm { iterative: true },
        persons(prefix, 20, |_| false),
    );

    assert_eq!(20, plan_links.len());
    for joint_plan in plan_links.joint_plans() {
        let indices: Vec<&str> = joint_plan
            .persons()
            .map(|p| p.external().rsplit('-').next().unwrap())
            .collect();
        assert_eq!(2, indices.len());
        assert_eq!(indices[0], indices[1]);
    }
}

#[test]
fn detour_bound_prevents_insertion() {
    let prefix = "it-ins-detour";
    let config = JointTrips {
        maximum_detour_fraction: -0.01,
        ..JointTrips::default()
    };
    let context = context(prefix, Arc::new(PlanLinks::new()), config);

    let legs = run_single_group(
        &context,
        &JointTripInsertorAlgorithm { iterative: true },
        persons(prefix, 10, |_| false),
    );
    assert_eq!((0, 0), legs);
}

#[test]
fn every_plan_has_at_most_one_owner() {
    let prefix = "it-owners";
    let plan_links = Arc::new(PlanLinks::new());
    let context = context(prefix, plan_links.clone(), JointTrips::default());
    let mut persons = persons(prefix, 10, |i| i % 2 == 0);
    recompose_joint_plans(&plan_links, &persons).unwrap();
    assert_eq!(5, plan_links.len());

    let mut group = ReplanningGroup::new(0, std::mem::take(&mut persons).into_values());
    replan_group(
        &context,
        &JointTripInsertorAndRemoverAlgorithm { iterative: true },
        &mut group,
    )
    .unwrap();

    let mut owned = 0;
    for person in group.persons.values() {
        let plan = PlanRef::selected(person);
        let owners = plan_links
            .joint_plans()
            .into_iter()
            .filter(|jp| jp.contains(&plan))
            .count();
        assert!(owners <= 1);
        owned += owners;

        let has_joint_leg = person
            .selected_plan()
            .unwrap()
            .legs()
            .iter()
            .any(|l| l.is_joint());
        assert_eq!(has_joint_leg, plan_links.owner_of(&plan).is_some());
    }
    assert_eq!(2 * plan_links.len(), owned);
}

#[test]
fn parallel_replanning_is_reproducible() {
    let prefix = "it-parallel";
    let run = |workers: usize| {
        let plan_links = Arc::new(PlanLinks::new());
        let config = JointTrips {
            group_size: 4,
            iterative: true,
            ..JointTrips::default()
        };
        let context = context(prefix, plan_links.clone(), config);
        let persons = persons(prefix, 30, |i| i % 3 == 0);
        recompose_joint_plans(&plan_links, &persons).unwrap();

        let mut groups = build_groups(persons, &BTreeMap::new(), 4);
        let moves = replan_groups_parallel(
            &context,
            &JointTripInsertorAndRemoverAlgorithm { iterative: true },
            &mut groups,
            workers,
        )
        .unwrap();
        (groups, moves, plan_links.records())
    };

    let (groups_1, moves_1, records_1) = run(1);
    let (groups_4, moves_4, records_4) = run(4);
    assert_eq!(groups_1, groups_4);
    assert_eq!(moves_1, moves_4);
    assert_eq!(records_1, records_4);
    assert!(moves_1.iter().sum::<usize>() > 0);
}
