pub mod agents;
pub mod config;
pub mod controller;
pub mod engines;
pub mod error;
pub mod events;
pub mod id;
pub mod joint;
pub mod logging;
pub mod matching;
pub mod network;
pub mod population;
pub mod random;
pub mod replanning;
pub mod routing;
pub mod scenario;
#[allow(clippy::module_inception)]
pub mod simulation;
pub mod social_network;
pub mod time_queue;
pub mod vehicles;
