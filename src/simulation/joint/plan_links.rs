use crate::simulation::error::{JointTripError, JointTripResult};
use crate::simulation::id::Id;
use crate::simulation::joint::{JointPlan, PlanRef};
use ahash::HashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::trace;

/// Bidirectional index between individual plans and the joint plan owning them. Every plan is owned
/// by at most one joint plan. The registry is shared between replanning workers, all operations
/// lock it for their whole duration.
#[derive(Debug, Default)]
pub struct PlanLinks {
    inner: Mutex<Registry>,
}

#[derive(Debug, Default)]
struct Registry {
    owners: HashMap<PlanRef, Id<JointPlan>>,
    joint_plans: BTreeMap<Id<JointPlan>, JointPlan>,
}

/// Export format of a joint plan for external writers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointPlanRecord {
    pub id: String,
    pub members: Vec<PlanRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanRecord {
    pub agent: String,
    pub plan_index: usize,
}

impl PlanLinks {
    pub fn new() -> Self {
        PlanLinks::default()
    }

    /// Registers the joint plan as owner of all its member plans. Fails without modifying the registry
    /// if any member is owned by a different joint plan. Linking an already registered joint plan
    /// again is a no-op.
    pub fn link(&self, joint_plan: JointPlan) -> JointTripResult<()> {
        let mut registry = self.inner.lock();

        for plan in joint_plan.plans() {
            if let Some(owner) = registry.owners.get(plan) {
                if owner != joint_plan.id() {
                    return Err(JointTripError::ConsistencyViolation(format!(
                        "plan {plan} is already owned by joint plan {owner}, cannot link it to joint plan {}",
                        joint_plan.id()
                    )));
                }
            }
        }

        if registry.joint_plans.contains_key(joint_plan.id()) {
            return Ok(());
        }

        trace!(joint_plan = %joint_plan.id(), "link joint plan");
        for plan in joint_plan.plans() {
            registry
                .owners
                .insert(plan.clone(), joint_plan.id().clone());
        }
        registry
            .joint_plans
            .insert(joint_plan.id().clone(), joint_plan);
        Ok(())
    }

    /// Releases ownership of all member plans. Fails without modifying the registry if the joint plan
    /// is not the registered owner of each of them.
    pub fn unlink(&self, joint_plan: &JointPlan) -> JointTripResult<()> {
        let mut registry = self.inner.lock();

        for plan in joint_plan.plans() {
            match registry.owners.get(plan) {
                Some(owner) if owner == joint_plan.id() => {}
                Some(owner) => {
                    return Err(JointTripError::ConsistencyViolation(format!(
                        "cannot unlink joint plan {}: plan {plan} is owned by joint plan {owner}",
                        joint_plan.id()
                    )))
                }
                None => {
                    return Err(JointTripError::ConsistencyViolation(format!(
                        "cannot unlink joint plan {}: plan {plan} is not owned by any joint plan",
                        joint_plan.id()
                    )))
                }
            }
        }

        trace!(joint_plan = %joint_plan.id(), "unlink joint plan");
        for plan in joint_plan.plans() {
            registry.owners.remove(plan);
        }
        registry.joint_plans.remove(joint_plan.id());
        Ok(())
    }

    pub fn owner_of(&self, plan: &PlanRef) -> Option<JointPlan> {
        let registry = self.inner.lock();
        registry
            .owners
            .get(plan)
            .and_then(|id| registry.joint_plans.get(id))
            .cloned()
    }

    /// All registered joint plans, ordered by id.
    pub fn joint_plans(&self) -> Vec<JointPlan> {
        self.inner.lock().joint_plans.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().joint_plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The joint plan grouping as (joint plan id -> [{agent id, plan index}]).
    pub fn records(&self) -> Vec<JointPlanRecord> {
        self.inner
            .lock()
            .joint_plans
            .values()
            .map(|jp| JointPlanRecord {
                id: jp.id().external().to_string(),
                members: jp
                    .plans()
                    .iter()
                    .map(|p| PlanRecord {
                        agent: p.person.external().to_string(),
                        plan_index: p.plan_index,
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn records_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records())
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::error::JointTripError;
    use crate::simulation::id::Id;
    use crate::simulation::joint::plan_links::PlanLinks;
    use crate::simulation::joint::{JointPlan, PlanRef};
    use std::sync::Arc;
    use std::thread;

    fn plan_ref(person: &str) -> PlanRef {
        PlanRef::new(Id::create(person), 0)
    }

    #[test]
    fn link_and_owner_of() {
        let links = PlanLinks::new();
        let jp = JointPlan::new(vec![plan_ref("pl-a"), plan_ref("pl-b")]);
        links.link(jp.clone()).unwrap();

        assert_eq!(Some(jp.clone()), links.owner_of(&plan_ref("pl-a")));
        assert_eq!(Some(jp), links.owner_of(&plan_ref("pl-b")));
        assert!(links.owner_of(&plan_ref("pl-c")).is_none());
        assert_eq!(1, links.len());
    }

    #[test]
    fn second_owner_is_violation() {
        let links = PlanLinks::new();
        links
            .link(JointPlan::new(vec![plan_ref("pl2-a"), plan_ref("pl2-b")]))
            .unwrap();

        let conflicting = JointPlan::new(vec![plan_ref("pl2-b"), plan_ref("pl2-c")]);
        let result = links.link(conflicting);
        assert!(matches!(
            result,
            Err(JointTripError::ConsistencyViolation(_))
        ));
        // nothing of the conflicting joint plan was registered
        assert!(links.owner_of(&plan_ref("pl2-c")).is_none());
        assert_eq!(1, links.len());
    }

    #[test]
    fn relink_same_is_noop() {
        let links = PlanLinks::new();
        let jp = JointPlan::new(vec![plan_ref("pl3-a"), plan_ref("pl3-b")]);
        links.link(jp.clone()).unwrap();
        links.link(jp).unwrap();
        assert_eq!(1, links.len());
    }

    #[test]
    fn stale_unlink_is_violation() {
        let links = PlanLinks::new();
        let registered = JointPlan::new(vec![plan_ref("pl4-a"), plan_ref("pl4-b")]);
        links.link(registered.clone()).unwrap();

        let stale = JointPlan::new(vec![plan_ref("pl4-a"), plan_ref("pl4-c")]);
        assert!(matches!(
            links.unlink(&stale),
            Err(JointTripError::ConsistencyViolation(_))
        ));
        assert_eq!(Some(registered.clone()), links.owner_of(&plan_ref("pl4-a")));

        links.unlink(&registered).unwrap();
        assert!(links.is_empty());
        assert!(matches!(
            links.unlink(&registered),
            Err(JointTripError::ConsistencyViolation(_))
        ));
    }

    #[test]
    fn records_export() {
        let links = PlanLinks::new();
        links
            .link(JointPlan::new(vec![plan_ref("pl5-b"), plan_ref("pl5-a")]))
            .unwrap();

        let records = links.records();
        assert_eq!(1, records.len());
        assert_eq!("pl5-a#0+pl5-b#0", records[0].id);
        assert_eq!("pl5-a", records[0].members[0].agent);
        assert_eq!(0, records[0].members[0].plan_index);

        let json = links.records_json().unwrap();
        assert!(json.contains("\"agent\": \"pl5-b\""));
    }

    #[test]
    fn concurrent_link_of_disjoint_plans() {
        let links = Arc::new(PlanLinks::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let links = links.clone();
                thread::spawn(move || {
                    for j in 0..50 {
                        let jp = JointPlan::new(vec![
                            plan_ref(&format!("pl6-{i}-{j}-d")),
                            plan_ref(&format!("pl6-{i}-{j}-p")),
                        ]);
                        links.link(jp).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(400, links.len());
    }

    #[test]
    fn concurrent_link_of_shared_plan_has_one_winner() {
        let links = Arc::new(PlanLinks::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let links = links.clone();
                thread::spawn(move || {
                    let jp = JointPlan::new(vec![
                        plan_ref("pl7-shared"),
                        plan_ref(&format!("pl7-other-{i}")),
                    ]);
                    links.link(jp).is_ok()
                })
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(1, successes);
        assert_eq!(1, links.len());
    }
}
