use ahash::HashMap;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::Debug;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineArgs {
    #[arg(long, short)]
    pub config_path: String,
    /// Number of driver/passenger couples of the synthetic scenario.
    #[arg(long)]
    pub couples: Option<u32>,
    #[arg(long = "set", value_parser = parse_key_val)]
    pub overrides: Vec<(String, String)>,
}

impl CommandLineArgs {
    pub fn new_with_path(path: impl ToString) -> Self {
        CommandLineArgs {
            config_path: path.to_string(),
            couples: None,
            overrides: Vec::new(),
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=');
    match pos {
        Some(pos) => Ok((s[..pos].to_string(), s[pos + 1..].to_string())),
        None => Err(format!("invalid KEY=VALUE: no `=` found in `{}`", s)),
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Config {
    //this is deliberately a Mutex to allow for thread-safe sharing of the config
    modules: Mutex<HashMap<String, Box<dyn ConfigModule>>>,
}

impl From<CommandLineArgs> for Config {
    fn from(args: CommandLineArgs) -> Self {
        let mut config = Config::from(PathBuf::from(&args.config_path));
        config.apply_overrides(&args.overrides);
        config
    }
}

impl From<PathBuf> for Config {
    fn from(config_path: PathBuf) -> Self {
        let file = File::open(&config_path).unwrap_or_else(|e| {
            panic!(
                "Failed to open config file at {:?}. Original error was {}",
                config_path, e
            );
        });
        serde_yaml::from_reader(BufReader::new(file)).unwrap_or_else(|e| {
            panic!(
                "Failed to parse config at {:?}. Original error was: {}",
                config_path, e
            )
        })
    }
}

impl Config {
    /// Apply generic key-value overrides to the config, e.g. joint_trips.iterative=true
    pub fn apply_overrides(&mut self, overrides: &[(String, String)]) {
        info!("Applying overrides: {:?}", overrides);

        for (key, value) in overrides {
            match key.as_str() {
                "joint_trips.iterative" => {
                    let mut jt = self.joint_trips();
                    jt.iterative = parse_override(key, value);
                    self.set_joint_trips(jt);
                }
                "joint_trips.maximum_detour_fraction" => {
                    let mut jt = self.joint_trips();
                    jt.maximum_detour_fraction = parse_override(key, value);
                    self.set_joint_trips(jt);
                }
                "joint_trips.use_social_network_constraint" => {
                    let mut jt = self.joint_trips();
                    jt.use_social_network_constraint = parse_override(key, value);
                    self.set_joint_trips(jt);
                }
                "joint_trips.random_seed" => {
                    let mut jt = self.joint_trips();
                    jt.random_seed = parse_override(key, value);
                    self.set_joint_trips(jt);
                }
                "matching.random_seed" => {
                    let mut matching = self.matching();
                    matching.random_seed = parse_override(key, value);
                    self.set_matching(matching);
                }
                "output.output_dir" => {
                    let mut output = self.output();
                    output.output_dir = PathBuf::from(value);
                    self.set_output(output);
                }
                _ => warn!("No override handler found for key: {}", key),
            }
        }
    }

    pub fn joint_trips(&self) -> JointTrips {
        self.module_or_default("joint_trips")
    }

    pub fn set_joint_trips(&mut self, joint_trips: JointTrips) {
        self.set_module("joint_trips", Box::new(joint_trips));
    }

    pub fn matching(&self) -> Matching {
        self.module_or_default("matching")
    }

    pub fn set_matching(&mut self, matching: Matching) {
        self.set_module("matching", Box::new(matching));
    }

    pub fn simulation(&self) -> Simulation {
        self.module_or_default("simulation")
    }

    pub fn set_simulation(&mut self, simulation: Simulation) {
        self.set_module("simulation", Box::new(simulation));
    }

    pub fn output(&self) -> Output {
        self.module_or_default("output")
    }

    pub fn set_output(&mut self, output: Output) {
        self.set_module("output", Box::new(output));
    }

    fn set_module(&mut self, key: &str, module: Box<dyn ConfigModule>) {
        self.modules
            .lock()
            .unwrap()
            .insert(key.to_string(), module);
    }

    /// Returns the module stored under key. If there is none, the default is inserted, so that
    /// written configs list every module the run used.
    fn module_or_default<T: ConfigModule + Default + Clone + 'static>(&self, key: &str) -> T {
        let mut modules = self.modules.lock().unwrap();
        if let Some(module) = modules.get(key) {
            return module
                .as_any()
                .downcast_ref::<T>()
                .unwrap_or_else(|| panic!("Config module '{key}' has an unexpected type."))
                .clone();
        }
        let default = T::default();
        modules.insert(key.to_string(), Box::new(default.clone()));
        default
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> T {
    value
        .parse()
        .unwrap_or_else(|_| panic!("Could not parse value '{value}' for key '{key}'."))
}

pub fn write_config(config: &Config, output_path: PathBuf) {
    let output_config = output_path.join("output_config.yml");
    let file = File::create(&output_config).expect("Failed to create output config file");
    let writer = BufWriter::new(file);
    serde_yaml::to_writer(writer, config).expect("Failed to write output config file");
}

/// Options of the insertion/removal operator. Also read by the matching platform and the
/// ride engine for the detour bound.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct JointTrips {
    #[serde(default = "default_maximum_detour_fraction")]
    pub maximum_detour_fraction: f64,
    /// Meters between driver origin and passenger origin.
    #[serde(default = "default_local_search_radius")]
    pub local_search_radius: f64,
    #[serde(default)]
    pub use_subtour_level_choice: bool,
    #[serde(default)]
    pub use_social_network_constraint: bool,
    #[serde(default)]
    pub iterative: bool,
    #[serde(default = "default_departure_time_tolerance")]
    pub departure_time_tolerance: u32,
    #[serde(default = "default_driver_modes")]
    pub driver_modes: Vec<String>,
    #[serde(default = "default_chain_based_modes")]
    pub chain_based_modes: Vec<String>,
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    #[serde(default = "default_group_size")]
    pub group_size: usize,
}

impl Default for JointTrips {
    fn default() -> Self {
        Self {
            maximum_detour_fraction: default_maximum_detour_fraction(),
            local_search_radius: default_local_search_radius(),
            use_subtour_level_choice: false,
            use_social_network_constraint: false,
            iterative: false,
            departure_time_tolerance: default_departure_time_tolerance(),
            driver_modes: default_driver_modes(),
            chain_based_modes: default_chain_based_modes(),
            random_seed: default_random_seed(),
            group_size: default_group_size(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Matching {
    /// Ordinary modes of the choice set. Ride requests are always part of it.
    #[serde(default = "default_matching_modes")]
    pub modes: Vec<String>,
    #[serde(default)]
    pub alternative_constants: std::collections::BTreeMap<String, f64>,
    #[serde(default)]
    pub driver_constant: f64,
    #[serde(default)]
    pub passenger_constant: f64,
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
}

impl Default for Matching {
    fn default() -> Self {
        Self {
            modes: default_matching_modes(),
            alternative_constants: Default::default(),
            driver_constant: 0.,
            passenger_constant: 0.,
            random_seed: default_random_seed(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Simulation {
    pub start_time: u32,
    pub end_time: u32,
    pub main_modes: Vec<String>,
    #[serde(default = "default_min_wait_time")]
    pub min_wait_time: u32,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            start_time: 0,
            end_time: 86400,
            main_modes: vec!["car".to_string()],
            min_wait_time: default_min_wait_time(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Output {
    pub output_dir: PathBuf,
    #[serde(default)]
    pub logging: Logging,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./"),
            logging: Logging::Info,
        }
    }
}

/// Have this extra layer of log level enum, as tracing subscriber has no
/// off/none option by default. At least it can't be parsed
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub enum Logging {
    #[default]
    None,
    Info,
}

#[typetag::serde(tag = "type")]
pub trait ConfigModule: Debug + Send {
    fn as_any(&self) -> &dyn Any;
}

#[typetag::serde]
impl ConfigModule for JointTrips {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[typetag::serde]
impl ConfigModule for Matching {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[typetag::serde]
impl ConfigModule for Simulation {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[typetag::serde]
impl ConfigModule for Output {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn default_maximum_detour_fraction() -> f64 {
    0.25
}

fn default_local_search_radius() -> f64 {
    10_000.
}

fn default_departure_time_tolerance() -> u32 {
    3600
}

fn default_driver_modes() -> Vec<String> {
    vec!["car".to_string()]
}

fn default_chain_based_modes() -> Vec<String> {
    vec!["car".to_string(), "bike".to_string()]
}

fn default_matching_modes() -> Vec<String> {
    vec!["car".to_string(), "walk".to_string()]
}

fn default_random_seed() -> u64 {
    4711
}

fn default_group_size() -> usize {
    10
}

fn default_min_wait_time() -> u32 {
    300
}
