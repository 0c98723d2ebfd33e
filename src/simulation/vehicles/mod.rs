use crate::simulation::agents::SimulationAgent;
use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::time_queue::Identifiable;

/// A vehicle moving through the network. Passengers ride as part of the vehicle and don't move on
/// their own.
#[derive(Debug)]
pub struct InternalVehicle {
    pub id: Id<InternalVehicle>,
    pub driver: SimulationAgent,
    pub passengers: Vec<SimulationAgent>,
}

impl InternalVehicle {
    pub fn new(id: Id<InternalVehicle>, driver: SimulationAgent) -> Self {
        InternalVehicle {
            id,
            driver,
            passengers: Vec::new(),
        }
    }

    /// Vehicles are created per leg. The id combines person and mode, unless the route names one.
    pub fn id_for(driver: &SimulationAgent) -> Id<InternalVehicle> {
        let leg = driver.curr_leg();
        if let Some(id) = leg.route.as_ref().and_then(|r| r.as_generic().vehicle().clone()) {
            return id;
        }
        Id::create(&format!("{}_{}", driver.id().external(), leg.mode.external()))
    }

    pub fn driver(&self) -> &SimulationAgent {
        &self.driver
    }

    pub fn passengers(&self) -> &Vec<SimulationAgent> {
        &self.passengers
    }

    pub fn curr_link_id(&self) -> Option<&Id<Link>> {
        self.driver.curr_link_id()
    }

    pub fn peek_next_link_id(&self) -> Option<&Id<Link>> {
        self.driver.peek_next_link_id()
    }

    pub fn register_moved_to_next_link(&mut self) {
        self.driver.advance_route();
    }

    /// Splits the vehicle into the agents it carried, driver first.
    pub fn into_agents(self) -> Vec<SimulationAgent> {
        let mut agents = Vec::with_capacity(self.passengers.len() + 1);
        agents.push(self.driver);
        agents.extend(self.passengers);
        agents
    }
}
