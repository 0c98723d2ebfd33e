use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Creates a random number generator for a specific entity, e.g. a replanning worker.
/// The hash parameter should uniquely identify the entity. Generators are never shared
/// between workers; each one owns the stream derived from (base seed, entity).
pub fn get_rnd<H: Hash>(base_seed: u64, hash: H) -> SmallRng {
    let mut hasher = DefaultHasher::new();
    hash.hash(&mut hasher);
    base_seed.hash(&mut hasher);
    let combined_seed = hasher.finish();

    SmallRng::seed_from_u64(combined_seed)
}

/// Generator for the worker processing the group with the given index.
pub fn worker_rnd(master_seed: u64, worker_index: usize) -> SmallRng {
    get_rnd(master_seed, worker_index as u64)
}
