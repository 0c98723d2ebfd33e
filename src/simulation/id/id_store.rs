use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

use crate::simulation::id::serializable_type::StableTypeId;
use crate::simulation::id::Id;

#[derive(Debug, Serialize)]
pub struct UntypedId {
    pub(crate) internal: u64,
    pub(crate) external: String,
}

impl UntypedId {
    pub(crate) fn new(internal: u64, external: String) -> Self {
        Self { internal, external }
    }
}

/// Cache for ids. Replanning workers run on several threads, so the store is shared
/// between all threads of the process. Lock order is always `mapping` before `ids`.
#[derive(Debug, Default)]
pub struct IdStore {
    ids: DashMap<u64, Vec<Arc<UntypedId>>>,
    mapping: DashMap<u64, DashMap<String, u64>>,
}

impl IdStore {
    pub fn new() -> Self {
        Self {
            ids: DashMap::default(),
            mapping: DashMap::default(),
        }
    }

    fn create_id_with_type_id(&self, id: &str, type_id: u64) -> Arc<UntypedId> {
        let type_mapping = self.mapping.entry(type_id).or_default();

        // the entry keeps the shard locked, so two threads can't create the same external id twice
        let internal = *type_mapping.entry(id.to_string()).or_insert_with(|| {
            let mut type_ids = self.ids.entry(type_id).or_default();
            let next_internal = type_ids.len() as u64;
            type_ids.push(Arc::new(UntypedId::new(next_internal, String::from(id))));
            next_internal
        });

        self.ids
            .get(&type_id)
            .and_then(|ids| ids.get(internal as usize).cloned())
            .unwrap_or_else(|| panic!("Id store is corrupted for external id {id}"))
    }

    pub(crate) fn create_id<T: StableTypeId + 'static>(&self, id: &str) -> Id<T> {
        let type_id = T::stable_type_id();
        Id::new(self.create_id_with_type_id(id, type_id))
    }

    pub(crate) fn get<T: StableTypeId + 'static>(&self, internal: u64) -> Id<T> {
        let type_id = T::stable_type_id();
        let type_ids = self.ids.get(&type_id).unwrap_or_else(|| {
            panic!("No ids for type {type_id:?}. Use Id::create::<T>(...) to create ids")
        });

        let untyped_id = type_ids
            .get(internal as usize)
            .unwrap_or_else(|| panic!("No id found for internal {internal}"))
            .clone();
        Id::new(untyped_id)
    }

    pub(crate) fn try_get_from_ext<T: StableTypeId + 'static>(
        &self,
        external: &str,
    ) -> Option<Id<T>> {
        let type_id = T::stable_type_id();
        let internal = {
            let type_mapping = self.mapping.get(&type_id)?;
            let internal = *type_mapping.get(external)?;
            internal
        };
        Some(self.get(internal))
    }

    pub(crate) fn get_from_ext<T: StableTypeId + 'static>(&self, external: &str) -> Id<T> {
        self.try_get_from_ext(external).unwrap_or_else(|| {
            panic!(
                "Could not find id for external id: {external} and type {}. Use Id::create::<T>(...) to create ids.",
                T::stable_type_id()
            )
        })
    }

    pub(crate) fn len<T: StableTypeId + 'static>(&self) -> usize {
        self.ids
            .get(&T::stable_type_id())
            .map(|ids| ids.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::id::id_store::IdStore;
    use crate::simulation::id::Id;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn create_and_get() {
        let store = IdStore::new();
        let id: Id<String> = store.create_id("car");
        let fetched: Id<String> = store.get_from_ext("car");
        assert_eq!(id, fetched);
        assert_eq!(0, id.internal());
        assert_eq!(1, store.len::<String>());
    }

    #[test]
    fn create_twice_yields_same_internal() {
        let store = IdStore::new();
        let first: Id<String> = store.create_id("walk");
        let second: Id<String> = store.create_id("walk");
        assert_eq!(first.internal(), second.internal());
        assert_eq!(1, store.len::<String>());
    }

    #[test]
    fn unknown_external_is_none() {
        let store = IdStore::new();
        let _: Id<String> = store.create_id("walk");
        assert!(store.try_get_from_ext::<String>("bike").is_none());
        assert!(store.try_get_from_ext::<u32>("walk").is_none());
    }

    #[test]
    fn concurrent_creation_is_unique() {
        let store = Arc::new(IdStore::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    (0..100)
                        .map(|i| store.create_id::<String>(&format!("id-{i}")).internal())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<Vec<u64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results[1..] {
            assert_eq!(&results[0], r);
        }
        assert_eq!(100, store.len::<String>());
    }
}
