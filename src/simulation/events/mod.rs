use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::population::InternalPerson;
use crate::simulation::vehicles::InternalVehicle;
use derive_builder::Builder;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

pub trait EventTrait: Debug + Any {
    //This can't be a const, because traits with const fields are not dyn compatible.
    fn type_(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn time(&self) -> u32;
    /// The person the event is about, if any. Link events only carry the vehicle.
    fn person(&self) -> Option<&Id<InternalPerson>> {
        None
    }
}

type OnEventFn = dyn Fn(&dyn EventTrait) + 'static;

/// The EventsManager holds call-backs for event processing. Rust has no reflection, so handlers are
/// registered per concrete event type, which gives compile-time checking of the event types.
/// The simulation only writes into the manager, it never reads events back.
#[derive(Default)]
pub struct EventsManager {
    per_type: HashMap<TypeId, Vec<Rc<OnEventFn>>>,
    catch_all: Vec<Box<OnEventFn>>,
    finish: Vec<Box<dyn Fn() + 'static>>,
}

impl Debug for EventsManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EventsManager {{ per_type: {:?}, catch_all: {:?}, finish: {:?} }}",
            self.per_type.len(),
            self.catch_all.len(),
            self.finish.len()
        )
    }
}

impl EventsManager {
    pub fn new() -> Self {
        EventsManager {
            per_type: HashMap::new(),
            catch_all: Vec::new(),
            finish: Vec::new(),
        }
    }

    pub fn publish_event(&mut self, event: &dyn EventTrait) {
        let tid = event.as_any().type_id();
        if let Some(list) = self.per_type.get(&tid).cloned() {
            for h in list {
                h(event);
            }
        }
        for h in &self.catch_all {
            h(event);
        }
    }

    pub fn finish(&mut self) {
        for f in self.finish.iter_mut() {
            f()
        }
    }

    /// This function is used to register callbacks for specific event types.
    pub fn on<E, F>(&mut self, f: F)
    where
        E: EventTrait,
        F: Fn(&E) + 'static,
    {
        let type_id = TypeId::of::<E>();
        let entry = self.per_type.entry(type_id).or_default();
        entry.push(Rc::new(move |ev: &dyn EventTrait| {
            if let Some(e) = ev.as_any().downcast_ref::<E>() {
                f(e);
            }
        }));
    }

    /// This function is used to register callbacks for all event types.
    pub fn on_any<F>(&mut self, f: F)
    where
        F: Fn(&dyn EventTrait) + 'static,
    {
        self.catch_all.push(Box::new(f));
    }

    pub fn on_finish<F>(&mut self, f: F)
    where
        F: Fn() + 'static,
    {
        self.finish.push(Box::new(f));
    }
}

#[derive(Builder, Debug, Clone)]
pub struct ActivityStartEvent {
    pub time: u32,
    pub person: Id<InternalPerson>,
    pub link: Id<Link>,
    pub act_type: Id<String>,
}

impl ActivityStartEvent {
    pub const TYPE: &'static str = "actstart";
}

impl EventTrait for ActivityStartEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
    fn person(&self) -> Option<&Id<InternalPerson>> {
        Some(&self.person)
    }
}

#[derive(Builder, Debug, Clone)]
pub struct ActivityEndEvent {
    pub time: u32,
    pub person: Id<InternalPerson>,
    pub link: Id<Link>,
    pub act_type: Id<String>,
}

impl ActivityEndEvent {
    pub const TYPE: &'static str = "actend";
}

impl EventTrait for ActivityEndEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
    fn person(&self) -> Option<&Id<InternalPerson>> {
        Some(&self.person)
    }
}

#[derive(Builder, Debug, Clone)]
pub struct LinkEnterEvent {
    pub time: u32,
    pub link: Id<Link>,
    pub vehicle: Id<InternalVehicle>,
}

impl LinkEnterEvent {
    pub const TYPE: &'static str = "entered link";
}

impl EventTrait for LinkEnterEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
}

#[derive(Builder, Debug, Clone)]
pub struct LinkLeaveEvent {
    pub time: u32,
    pub link: Id<Link>,
    pub vehicle: Id<InternalVehicle>,
}

impl LinkLeaveEvent {
    pub const TYPE: &'static str = "left link";
}

impl EventTrait for LinkLeaveEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
}

#[derive(Builder, Debug, Clone)]
pub struct PersonEntersVehicleEvent {
    pub time: u32,
    pub person: Id<InternalPerson>,
    pub vehicle: Id<InternalVehicle>,
}

impl PersonEntersVehicleEvent {
    pub const TYPE: &'static str = "PersonEntersVehicle";
}

impl EventTrait for PersonEntersVehicleEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
    fn person(&self) -> Option<&Id<InternalPerson>> {
        Some(&self.person)
    }
}

#[derive(Builder, Debug, Clone)]
pub struct PersonLeavesVehicleEvent {
    pub time: u32,
    pub person: Id<InternalPerson>,
    pub vehicle: Id<InternalVehicle>,
}

impl PersonLeavesVehicleEvent {
    pub const TYPE: &'static str = "PersonLeavesVehicle";
}

impl EventTrait for PersonLeavesVehicleEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
    fn person(&self) -> Option<&Id<InternalPerson>> {
        Some(&self.person)
    }
}

#[derive(Builder, Debug, Clone)]
pub struct PersonDepartureEvent {
    pub time: u32,
    pub person: Id<InternalPerson>,
    pub link: Id<Link>,
    pub leg_mode: Id<String>,
    pub routing_mode: Id<String>,
}

impl PersonDepartureEvent {
    pub const TYPE: &'static str = "departure";
}

impl EventTrait for PersonDepartureEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
    fn person(&self) -> Option<&Id<InternalPerson>> {
        Some(&self.person)
    }
}

#[derive(Builder, Debug, Clone)]
pub struct PersonArrivalEvent {
    pub time: u32,
    pub person: Id<InternalPerson>,
    pub link: Id<Link>,
    pub leg_mode: Id<String>,
}

impl PersonArrivalEvent {
    pub const TYPE: &'static str = "arrival";
}

impl EventTrait for PersonArrivalEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
    fn person(&self) -> Option<&Id<InternalPerson>> {
        Some(&self.person)
    }
}

#[derive(Builder, Debug, Clone)]
pub struct TeleportationArrivalEvent {
    pub time: u32,
    pub person: Id<InternalPerson>,
    pub mode: Id<String>,
    pub distance: f64,
}

impl TeleportationArrivalEvent {
    pub const TYPE: &'static str = "travelled";
}

impl EventTrait for TeleportationArrivalEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
    fn person(&self) -> Option<&Id<InternalPerson>> {
        Some(&self.person)
    }
}

/// A passenger waited at its pick-up link longer than allowed. The passenger falls back to
/// teleportation, the driver is not affected.
#[derive(Builder, Debug, Clone)]
pub struct SynchronizationTimeoutEvent {
    pub time: u32,
    pub person: Id<InternalPerson>,
    pub driver: Id<InternalPerson>,
    pub link: Id<Link>,
}

impl SynchronizationTimeoutEvent {
    pub const TYPE: &'static str = "synchronization timeout";
}

impl EventTrait for SynchronizationTimeoutEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
    fn person(&self) -> Option<&Id<InternalPerson>> {
        Some(&self.person)
    }
}
