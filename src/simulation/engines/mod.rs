//! Engines of the movement simulation. The activity engine holds agents between their legs, the
//! leg engine moves them over the network, teleports them, or lets passengers ride along with
//! their driver.

pub mod activity_engine;
pub mod leg_engine;
pub mod network_engine;
pub mod passenger_queue;
pub mod teleportation_engine;
