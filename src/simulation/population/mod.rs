use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::vehicles::InternalVehicle;
use std::collections::{BTreeMap, BTreeSet};

pub mod trip_structure_utils;

/// Stage activity marking where a passenger boards the driver's vehicle.
pub const PICK_UP: &str = "pick_up";
/// Stage activity marking where a passenger leaves the driver's vehicle.
pub const DROP_OFF: &str = "drop_off";
pub const DRIVER_MODE: &str = "driver";
pub const PASSENGER_MODE: &str = "passenger";
/// Mode of the access and egress legs around a joint trip.
pub const ACCESS_WALK_MODE: &str = "non_network_walk";

/// Persons ordered by id. Scans over the population follow this order, which keeps matching and
/// replanning reproducible.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct Population {
    pub persons: BTreeMap<Id<InternalPerson>, InternalPerson>,
}

impl Population {
    pub fn new() -> Self {
        Population {
            persons: BTreeMap::default(),
        }
    }

    pub fn add_person(&mut self, person: InternalPerson) {
        self.persons.insert(person.id().clone(), person);
    }

    /// Number of legs with the given mode over the selected plans of all persons.
    pub fn count_legs_with_mode(&self, mode: &str) -> usize {
        self.persons
            .values()
            .filter_map(|p| p.selected_plan())
            .flat_map(|plan| plan.legs())
            .filter(|leg| leg.mode.external() == mode)
            .count()
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct InternalActivity {
    pub act_type: Id<String>,
    pub link_id: Id<Link>,
    pub x: f64,
    pub y: f64,
    pub start_time: Option<u32>,
    pub end_time: Option<u32>,
    pub max_dur: Option<u32>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct InternalLeg {
    pub mode: Id<String>,
    pub routing_mode: Option<Id<String>>,
    pub dep_time: Option<u32>,
    pub trav_time: Option<u32>,
    pub route: Option<InternalRoute>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum InternalRoute {
    Generic(InternalGenericRoute),
    Network(InternalNetworkRoute),
    Driver(DriverRoute),
    Passenger(PassengerRoute),
}

#[derive(Debug, PartialEq, Clone)]
pub struct InternalGenericRoute {
    start_link: Id<Link>,
    end_link: Id<Link>,
    trav_time: Option<u32>,
    distance: Option<f64>,
    vehicle: Option<Id<InternalVehicle>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct InternalNetworkRoute {
    generic_delegate: InternalGenericRoute,
    route: Vec<Id<Link>>,
}

/// Route of a driver serving passengers on this leg. Passengers are referenced by id only, the
/// partner leg is found through the passenger's plan.
#[derive(Debug, PartialEq, Clone)]
pub struct DriverRoute {
    network_delegate: InternalNetworkRoute,
    passengers: BTreeSet<Id<InternalPerson>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct PassengerRoute {
    generic_delegate: InternalGenericRoute,
    driver: Id<InternalPerson>,
    /// The leg before it became a passenger leg. Restored when the passenger is detached.
    independent_leg: Box<InternalLeg>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum InternalPlanElement {
    Activity(InternalActivity),
    Leg(InternalLeg),
}

#[derive(Debug, PartialEq, Clone)]
pub struct InternalPlan {
    pub selected: bool,
    pub elements: Vec<InternalPlanElement>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct InternalPerson {
    id: Id<InternalPerson>,
    plans: Vec<InternalPlan>,
}

impl InternalPerson {
    pub fn new(id: Id<InternalPerson>, plan: InternalPlan) -> Self {
        InternalPerson {
            id,
            plans: vec![plan],
        }
    }

    pub fn id(&self) -> &Id<InternalPerson> {
        &self.id
    }

    pub fn plans(&self) -> &Vec<InternalPlan> {
        &self.plans
    }

    pub fn add_plan(&mut self, plan: InternalPlan) {
        self.plans.push(plan);
    }

    pub fn plan_element_at(&self, index: usize) -> Option<&InternalPlanElement> {
        self.selected_plan().and_then(|p| p.elements.get(index))
    }

    pub fn total_elements(&self) -> usize {
        self.selected_plan().map(|p| p.elements.len()).unwrap_or(0)
    }

    pub fn selected_plan(&self) -> Option<&InternalPlan> {
        self.plans.iter().find(|&plan| plan.selected)
    }

    pub fn selected_plan_index(&self) -> Option<usize> {
        self.plans.iter().position(|plan| plan.selected)
    }

    pub fn selected_plan_mut(&mut self) -> &mut InternalPlan {
        let id = self.id.clone();
        self.plans
            .iter_mut()
            .find(|plan| plan.selected)
            .unwrap_or_else(|| panic!("No selected plan found for person {id}"))
    }
}

impl Default for InternalPlan {
    fn default() -> Self {
        Self {
            selected: true,
            elements: Vec::new(),
        }
    }
}

impl InternalPlan {
    pub fn add_leg(&mut self, leg: InternalLeg) {
        self.elements.push(InternalPlanElement::Leg(leg));
    }

    pub fn add_act(&mut self, activity: InternalActivity) {
        self.elements.push(InternalPlanElement::Activity(activity));
    }

    pub fn legs(&self) -> Vec<&InternalLeg> {
        self.elements
            .iter()
            .filter_map(|e| match e {
                InternalPlanElement::Leg(leg) => Some(leg),
                _ => None,
            })
            .collect()
    }

    pub fn acts(&self) -> Vec<&InternalActivity> {
        self.elements
            .iter()
            .filter_map(|e| match e {
                InternalPlanElement::Activity(act) => Some(act),
                _ => None,
            })
            .collect()
    }

    pub fn leg_at(&self, index: usize) -> Option<&InternalLeg> {
        self.elements.get(index).and_then(|e| e.as_leg())
    }

    pub fn leg_at_mut(&mut self, index: usize) -> Option<&mut InternalLeg> {
        self.elements.get_mut(index).and_then(|e| e.as_leg_mut())
    }

    pub fn activity_at(&self, index: usize) -> Option<&InternalActivity> {
        self.elements.get(index).and_then(|e| e.as_activity())
    }
}

impl InternalActivity {
    pub fn new(
        x: f64,
        y: f64,
        act_type: &str,
        link_id: Id<Link>,
        start_time: Option<u32>,
        end_time: Option<u32>,
        max_dur: Option<u32>,
    ) -> Self {
        InternalActivity {
            x,
            y,
            act_type: Id::create(act_type),
            link_id,
            start_time,
            end_time,
            max_dur,
        }
    }

    /// Zero duration synchronization activity.
    pub fn new_stage(act_type: &str, link_id: Id<Link>, x: f64, y: f64) -> Self {
        InternalActivity::new(x, y, act_type, link_id, None, None, Some(0))
    }

    pub(crate) fn cmp_end_time(&self, begin: u32) -> u32 {
        if let Some(end_time) = self.end_time {
            end_time
        } else if let Some(max_dur) = self.max_dur {
            begin + max_dur
        } else {
            // undefined end time, the agent stays until the end of the simulation
            u32::MAX
        }
    }

    pub fn is_interaction(&self) -> bool {
        self.act_type.external().contains("interaction")
    }

    pub fn is_joint_trip_stage(&self) -> bool {
        let act_type = self.act_type.external();
        act_type == PICK_UP || act_type == DROP_OFF
    }

    /// Stage activities are part of a trip. Trips run between two non stage activities.
    pub fn is_stage_activity(&self) -> bool {
        self.is_interaction() || self.is_joint_trip_stage()
    }

    pub fn coord(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

impl InternalRoute {
    pub fn as_generic(&self) -> &InternalGenericRoute {
        match self {
            InternalRoute::Generic(g) => g,
            InternalRoute::Network(n) => &n.generic_delegate,
            InternalRoute::Driver(d) => &d.network_delegate.generic_delegate,
            InternalRoute::Passenger(p) => &p.generic_delegate,
        }
    }

    /// Network route of independent and driver legs.
    pub fn as_network(&self) -> Option<&InternalNetworkRoute> {
        match self {
            InternalRoute::Network(n) => Some(n),
            InternalRoute::Driver(d) => Some(&d.network_delegate),
            _ => None,
        }
    }

    pub fn as_driver(&self) -> Option<&DriverRoute> {
        match self {
            InternalRoute::Driver(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_driver_mut(&mut self) -> Option<&mut DriverRoute> {
        match self {
            InternalRoute::Driver(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_passenger(&self) -> Option<&PassengerRoute> {
        match self {
            InternalRoute::Passenger(p) => Some(p),
            _ => None,
        }
    }

    pub fn start_link(&self) -> &Id<Link> {
        &self.as_generic().start_link
    }

    pub fn end_link(&self) -> &Id<Link> {
        &self.as_generic().end_link
    }
}

impl InternalGenericRoute {
    pub fn new(
        start_link: Id<Link>,
        end_link: Id<Link>,
        trav_time: Option<u32>,
        distance: Option<f64>,
        vehicle: Option<Id<InternalVehicle>>,
    ) -> Self {
        Self {
            start_link,
            end_link,
            trav_time,
            distance,
            vehicle,
        }
    }

    pub fn end_link(&self) -> &Id<Link> {
        &self.end_link
    }

    pub fn start_link(&self) -> &Id<Link> {
        &self.start_link
    }

    pub fn vehicle(&self) -> &Option<Id<InternalVehicle>> {
        &self.vehicle
    }

    pub fn trav_time(&self) -> Option<u32> {
        self.trav_time
    }

    pub fn distance(&self) -> Option<f64> {
        self.distance
    }
}

impl InternalNetworkRoute {
    pub fn route_element_at(&self, index: usize) -> Option<&Id<Link>> {
        self.route.get(index)
    }

    pub fn new(generic_delegate: InternalGenericRoute, route: Vec<Id<Link>>) -> Self {
        Self {
            generic_delegate,
            route,
        }
    }

    pub fn generic_delegate(&self) -> &InternalGenericRoute {
        &self.generic_delegate
    }

    pub fn route(&self) -> &Vec<Id<Link>> {
        &self.route
    }
}

impl DriverRoute {
    pub fn new(
        network_delegate: InternalNetworkRoute,
        passengers: BTreeSet<Id<InternalPerson>>,
    ) -> Self {
        Self {
            network_delegate,
            passengers,
        }
    }

    pub fn network_delegate(&self) -> &InternalNetworkRoute {
        &self.network_delegate
    }

    pub fn passengers(&self) -> &BTreeSet<Id<InternalPerson>> {
        &self.passengers
    }

    pub fn remove_passenger(&mut self, passenger: &Id<InternalPerson>) -> bool {
        self.passengers.remove(passenger)
    }
}

impl PassengerRoute {
    pub fn new(
        generic_delegate: InternalGenericRoute,
        driver: Id<InternalPerson>,
        independent_leg: InternalLeg,
    ) -> Self {
        Self {
            generic_delegate,
            driver,
            independent_leg: Box::new(independent_leg),
        }
    }

    pub fn generic_delegate(&self) -> &InternalGenericRoute {
        &self.generic_delegate
    }

    pub fn driver(&self) -> &Id<InternalPerson> {
        &self.driver
    }

    pub fn independent_leg(&self) -> &InternalLeg {
        &self.independent_leg
    }
}

impl InternalLeg {
    pub fn new(route: InternalRoute, mode: &str, trav_time: u32, dep_time: Option<u32>) -> Self {
        Self {
            route: Some(route),
            mode: Id::create(mode),
            routing_mode: Some(Id::create(mode)),
            trav_time: Some(trav_time),
            dep_time,
        }
    }

    /// Planned travel time of the leg, taken from the leg or its route.
    pub fn travel_time(&self) -> u32 {
        self.trav_time
            .or_else(|| self.route.as_ref().and_then(|r| r.as_generic().trav_time()))
            .unwrap_or(0)
    }

    pub fn is_driver_leg(&self) -> bool {
        matches!(self.route, Some(InternalRoute::Driver(_)))
    }

    pub fn is_passenger_leg(&self) -> bool {
        matches!(self.route, Some(InternalRoute::Passenger(_)))
    }

    pub fn is_joint(&self) -> bool {
        self.is_driver_leg() || self.is_passenger_leg()
    }

    pub fn driver_route(&self) -> Option<&DriverRoute> {
        self.route.as_ref().and_then(|r| r.as_driver())
    }

    pub fn driver_route_mut(&mut self) -> Option<&mut DriverRoute> {
        self.route.as_mut().and_then(|r| r.as_driver_mut())
    }

    pub fn passenger_route(&self) -> Option<&PassengerRoute> {
        self.route.as_ref().and_then(|r| r.as_passenger())
    }
}

impl InternalPlanElement {
    pub fn as_activity(&self) -> Option<&InternalActivity> {
        if let InternalPlanElement::Activity(act) = self {
            Some(act)
        } else {
            None
        }
    }

    pub fn as_leg(&self) -> Option<&InternalLeg> {
        if let InternalPlanElement::Leg(leg) = self {
            Some(leg)
        } else {
            None
        }
    }

    pub fn as_leg_mut(&mut self) -> Option<&mut InternalLeg> {
        if let InternalPlanElement::Leg(leg) = self {
            Some(leg)
        } else {
            None
        }
    }
}
