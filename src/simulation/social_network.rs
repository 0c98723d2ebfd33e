use crate::simulation::id::Id;
use crate::simulation::population::InternalPerson;
use std::collections::{BTreeMap, BTreeSet};

/// Read access to the social network. Used to restrict which agents may share a ride.
pub trait SocialNetworkStore: Send + Sync {
    fn alters(&self, ego: &Id<InternalPerson>) -> BTreeSet<Id<InternalPerson>>;

    /// Whether `alter` is a contact of `ego`. For directed networks the tie must point from ego to alter.
    fn are_connected(&self, ego: &Id<InternalPerson>, alter: &Id<InternalPerson>) -> bool;
}

/// In-memory social network. In a reflective network every tie is stored in both directions.
#[derive(Debug, Default, Clone)]
pub struct SocialNetwork {
    reflective: bool,
    ties: BTreeMap<Id<InternalPerson>, BTreeSet<Id<InternalPerson>>>,
}

impl SocialNetwork {
    pub fn new(reflective: bool) -> Self {
        SocialNetwork {
            reflective,
            ties: BTreeMap::new(),
        }
    }

    pub fn is_reflective(&self) -> bool {
        self.reflective
    }

    pub fn add_tie(&mut self, ego: &Id<InternalPerson>, alter: &Id<InternalPerson>) {
        self.ties
            .entry(ego.clone())
            .or_default()
            .insert(alter.clone());
        if self.reflective {
            self.ties
                .entry(alter.clone())
                .or_default()
                .insert(ego.clone());
        }
    }

    pub fn egos(&self) -> impl Iterator<Item = &Id<InternalPerson>> {
        self.ties.keys()
    }
}

impl SocialNetworkStore for SocialNetwork {
    fn alters(&self, ego: &Id<InternalPerson>) -> BTreeSet<Id<InternalPerson>> {
        self.ties.get(ego).cloned().unwrap_or_default()
    }

    fn are_connected(&self, ego: &Id<InternalPerson>, alter: &Id<InternalPerson>) -> bool {
        self.ties
            .get(ego)
            .map(|alters| alters.contains(alter))
            .unwrap_or(false)
    }
}
