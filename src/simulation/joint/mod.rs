use crate::simulation::id::Id;
use crate::simulation::population::InternalPerson;
use itertools::Itertools;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

pub mod consistency;
pub mod group_plans;
pub mod joint_trip;
pub mod plan_links;

/// Reference to one plan of one person.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlanRef {
    pub person: Id<InternalPerson>,
    pub plan_index: usize,
}

impl PlanRef {
    pub fn new(person: Id<InternalPerson>, plan_index: usize) -> Self {
        PlanRef { person, plan_index }
    }

    /// Reference to the selected plan of the person.
    pub fn selected(person: &InternalPerson) -> Self {
        let plan_index = person
            .selected_plan_index()
            .unwrap_or_else(|| panic!("Person {} has no selected plan.", person.id()));
        PlanRef::new(person.id().clone(), plan_index)
    }
}

impl Display for PlanRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.person, self.plan_index)
    }
}

/// A set of individual plans that are coupled by shared rides. The id is derived from the sorted
/// members, so the same set of plans always yields the same joint plan id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointPlan {
    id: Id<JointPlan>,
    plans: BTreeSet<PlanRef>,
}

impl JointPlan {
    pub fn new(plans: impl IntoIterator<Item = PlanRef>) -> Self {
        let plans: BTreeSet<PlanRef> = plans.into_iter().collect();
        assert!(!plans.is_empty(), "A joint plan needs at least one member.");
        let external = plans.iter().map(|p| p.to_string()).join("+");
        JointPlan {
            id: Id::create(&external),
            plans,
        }
    }

    pub fn id(&self) -> &Id<JointPlan> {
        &self.id
    }

    pub fn plans(&self) -> &BTreeSet<PlanRef> {
        &self.plans
    }

    pub fn persons(&self) -> impl Iterator<Item = &Id<InternalPerson>> {
        self.plans.iter().map(|p| &p.person)
    }

    pub fn contains(&self, plan: &PlanRef) -> bool {
        self.plans.contains(plan)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
