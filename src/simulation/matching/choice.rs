use crate::simulation::config::Matching;
use rand::rngs::SmallRng;
use rand::Rng;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RideRole {
    Driver,
    Passenger,
}

/// An element of the choice set of a trip.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Alternative {
    Mode(String),
    RequestRide(RideRole),
}

impl Display for Alternative {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Alternative::Mode(mode) => write!(f, "{mode}"),
            Alternative::RequestRide(RideRole::Driver) => write!(f, "request ride as driver"),
            Alternative::RequestRide(RideRole::Passenger) => write!(f, "request ride as passenger"),
        }
    }
}

/// Picks one alternative out of a non empty choice set.
pub trait ChoiceModel: Send + Sync {
    fn choose(&self, choice_set: &[Alternative], rng: &mut SmallRng) -> usize;
}

/// Multinomial logit: alternative specific constants plus i.i.d. Gumbel noise, the alternative
/// with the highest utility wins. Equal utilities go to the first alternative of the choice set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogitChoiceModel {
    mode_constants: BTreeMap<String, f64>,
    driver_constant: f64,
    passenger_constant: f64,
}

impl LogitChoiceModel {
    pub fn new(
        mode_constants: BTreeMap<String, f64>,
        driver_constant: f64,
        passenger_constant: f64,
    ) -> Self {
        LogitChoiceModel {
            mode_constants,
            driver_constant,
            passenger_constant,
        }
    }

    pub fn from_config(config: &Matching) -> Self {
        LogitChoiceModel::new(
            config.alternative_constants.clone(),
            config.driver_constant,
            config.passenger_constant,
        )
    }

    pub fn systematic_utility(&self, alternative: &Alternative) -> f64 {
        match alternative {
            Alternative::Mode(mode) => self.mode_constants.get(mode).copied().unwrap_or(0.),
            Alternative::RequestRide(RideRole::Driver) => self.driver_constant,
            Alternative::RequestRide(RideRole::Passenger) => self.passenger_constant,
        }
    }
}

fn gumbel(rng: &mut SmallRng) -> f64 {
    let u: f64 = rng.random_range(f64::EPSILON..1.0);
    -(-u.ln()).ln()
}

impl ChoiceModel for LogitChoiceModel {
    fn choose(&self, choice_set: &[Alternative], rng: &mut SmallRng) -> usize {
        assert!(!choice_set.is_empty(), "Cannot choose from an empty choice set.");
        let mut best = 0;
        let mut best_utility = f64::NEG_INFINITY;
        for (i, alternative) in choice_set.iter().enumerate() {
            let utility = self.systematic_utility(alternative) + gumbel(rng);
            if utility > best_utility {
                best = i;
                best_utility = utility;
            }
        }
        best
    }
}
