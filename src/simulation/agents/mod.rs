use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::population::{
    InternalActivity, InternalLeg, InternalPerson, InternalPlanElement, InternalRoute,
};
use crate::simulation::time_queue::{EndTime, Identifiable};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SimulationAgentState {
    LEG,
    ACTIVITY,
}

/// Synchronization state of an agent with respect to shared rides.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum RideState {
    #[default]
    Independent,
    /// Registered at a pick-up link, waiting for the driver.
    AwaitingPickup,
    /// Inside the driver's vehicle.
    Riding,
    /// Delivered at the drop-off link, the plan resumes with the next activity.
    AwaitingDropoff,
}

/// How the leg engine handles the current leg of an agent. Selected once per departure from the
/// route of the leg.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LegHandler {
    Independent,
    Driver,
    Passenger,
}

impl LegHandler {
    pub fn for_leg(leg: &InternalLeg) -> Self {
        match leg.route {
            Some(InternalRoute::Driver(_)) => LegHandler::Driver,
            Some(InternalRoute::Passenger(_)) => LegHandler::Passenger,
            Some(InternalRoute::Generic(_)) | Some(InternalRoute::Network(_)) | None => {
                LegHandler::Independent
            }
        }
    }
}

/// An agent executing the selected plan of a person.
#[derive(Debug, PartialEq, Clone)]
pub struct SimulationAgent {
    person: InternalPerson,
    curr_plan_element: usize,
    curr_route_element: usize,
    ride_state: RideState,
}

impl SimulationAgent {
    pub fn new(person: InternalPerson) -> Self {
        assert!(
            person.total_elements() > 0,
            "Person {} has no plan elements.",
            person.id()
        );
        SimulationAgent {
            person,
            curr_plan_element: 0,
            curr_route_element: 0,
            ride_state: RideState::Independent,
        }
    }

    pub fn person(&self) -> &InternalPerson {
        &self.person
    }

    pub fn into_person(self) -> InternalPerson {
        self.person
    }

    pub fn curr_plan_element(&self) -> usize {
        self.curr_plan_element
    }

    pub fn ride_state(&self) -> RideState {
        self.ride_state
    }

    pub fn set_ride_state(&mut self, ride_state: RideState) {
        self.ride_state = ride_state;
    }

    pub fn curr_act(&self) -> &InternalActivity {
        self.person
            .plan_element_at(self.curr_plan_element)
            .and_then(|p| p.as_activity())
            .unwrap_or_else(|| {
                panic!(
                    "Agent {} is not performing an activity at plan element {}.",
                    self.id(),
                    self.curr_plan_element
                )
            })
    }

    pub fn curr_leg(&self) -> &InternalLeg {
        self.person
            .plan_element_at(self.curr_plan_element)
            .and_then(|p| p.as_leg())
            .unwrap_or_else(|| {
                panic!(
                    "Agent {} is not on a leg at plan element {}.",
                    self.id(),
                    self.curr_plan_element
                )
            })
    }

    pub fn next_act(&self) -> Option<&InternalActivity> {
        let add = match self.state() {
            SimulationAgentState::ACTIVITY => 2,
            SimulationAgentState::LEG => 1,
        };
        self.person
            .plan_element_at(self.curr_plan_element + add)
            .and_then(|p| p.as_activity())
    }

    pub fn has_next_element(&self) -> bool {
        self.curr_plan_element + 1 < self.person.total_elements()
    }

    /// Moves on to the next plan element. Leaving a leg ends any ride the agent took part in.
    pub fn advance_plan(&mut self) {
        self.curr_plan_element += 1;
        self.curr_route_element = 0;
        self.ride_state = RideState::Independent;
        assert!(
            self.curr_plan_element < self.person.total_elements(),
            "Cannot advance plan of agent {} beyond its last element.",
            self.person.id()
        );
    }

    pub fn advance_route(&mut self) {
        self.curr_route_element += 1;
    }

    pub fn state(&self) -> SimulationAgentState {
        match self.curr_plan_element % 2 {
            0 => SimulationAgentState::ACTIVITY,
            1 => SimulationAgentState::LEG,
            _ => unreachable!(),
        }
    }

    pub fn leg_handler(&self) -> LegHandler {
        LegHandler::for_leg(self.curr_leg())
    }

    pub fn curr_link_id(&self) -> Option<&Id<Link>> {
        if self.state() != SimulationAgentState::LEG {
            return None;
        }

        let route = self.curr_leg().route.as_ref()?;
        match route.as_network() {
            Some(n) => n.route_element_at(self.curr_route_element),
            None => match self.curr_route_element {
                0 => Some(route.start_link()),
                1 => Some(route.end_link()),
                _ => panic!(
                    "A generic route only has two elements. Current plan element {:?}, Current route element {:?}, Current agent {:?}",
                    self.curr_plan_element, self.curr_route_element, self.person.id()
                ),
            },
        }
    }

    pub fn peek_next_link_id(&self) -> Option<&Id<Link>> {
        self.curr_leg()
            .route
            .as_ref()
            .and_then(|r| r.as_network())
            .and_then(|n| n.route_element_at(self.curr_route_element + 1))
    }

    /// For teleported legs the route pointer jumps to the destination directly. This works for
    /// generic as well as network routes.
    pub fn set_curr_route_element_to_last(&mut self) {
        let route = self
            .curr_leg()
            .route
            .as_ref()
            .unwrap_or_else(|| panic!("Missing route for agent {}", self.person.id()));
        self.curr_route_element = match route.as_network() {
            Some(n) => n.route().len().saturating_sub(1),
            None => 1,
        };
    }

    pub fn wakeup_time(&self, now: u32) -> u32 {
        self.curr_act().cmp_end_time(now)
    }
}

impl Identifiable<InternalPerson> for SimulationAgent {
    fn id(&self) -> &Id<InternalPerson> {
        self.person.id()
    }
}

impl EndTime for SimulationAgent {
    fn end_time(&self, now: u32) -> u32 {
        match self
            .person
            .plan_element_at(self.curr_plan_element)
            .unwrap_or_else(|| panic!("Agent {} has no current plan element.", self.id()))
        {
            InternalPlanElement::Activity(a) => a.cmp_end_time(now),
            InternalPlanElement::Leg(l) => l.travel_time() + now,
        }
    }
}
