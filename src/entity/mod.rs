use crate::engine::Schedule;
use crate::types::{EventListId, PropertyChange, SimEvent};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

pub mod arrival;
pub mod monitor;

pub use arrival::ArrivalProcess;
pub use monitor::{EventMonitor, LogObserver};

/// Shared handle to a simulation entity. The entity name is cached on the
/// handle so lookups never need to take the entity lock.
#[derive(Clone)]
pub struct SimEntityRef {
    name: Arc<str>,
    inner: Arc<Mutex<dyn SimEntity>>,
}

impl SimEntityRef {
    pub fn new(entity: impl SimEntity + 'static) -> Self {
        let name: Arc<str> = Arc::from(entity.core().name());
        Self {
            name,
            inner: Arc::new(Mutex::new(entity)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, dyn SimEntity> {
        self.inner.lock().await
    }
}

impl fmt::Debug for SimEntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimEntityRef")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Shared handle to a property-change observer.
pub type PropertyListenerRef = Arc<dyn PropertyListener>;

/// Receives property-change notifications from entities it is wired to.
#[async_trait]
pub trait PropertyListener: Send + Sync {
    async fn property_changed(&self, change: &PropertyChange);
}

/// Bookkeeping shared by every simulation entity: identity, event-list
/// binding, rerun eligibility, and the listeners wired to it.
pub struct EntityCore {
    name: String,
    event_list: EventListId,
    rerun_eligible: bool,
    property_listeners: Vec<(Option<String>, PropertyListenerRef)>,
    event_listeners: Vec<SimEntityRef>,
}

impl EntityCore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            event_list: EventListId(0),
            rerun_eligible: true,
            property_listeners: Vec::new(),
            event_listeners: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event_list(&self) -> EventListId {
        self.event_list
    }

    pub fn set_event_list(&mut self, id: EventListId) {
        self.event_list = id;
    }

    pub fn is_rerun_eligible(&self) -> bool {
        self.rerun_eligible
    }

    pub fn set_rerun_eligible(&mut self, eligible: bool) {
        self.rerun_eligible = eligible;
    }

    /// Registers a property listener, optionally scoped to one property.
    pub fn add_property_listener(&mut self, property: Option<String>, listener: PropertyListenerRef) {
        self.property_listeners.push((property, listener));
    }

    /// Registers another entity as a listener of this entity's events.
    pub fn add_event_listener(&mut self, listener: SimEntityRef) {
        self.event_listeners.push(listener);
    }

    pub fn event_listeners(&self) -> &[SimEntityRef] {
        &self.event_listeners
    }

    /// Publishes a property change to every listener whose scope matches.
    pub async fn publish(&self, property: &str, value: f64) {
        let change = PropertyChange {
            source: self.name.clone(),
            property: property.to_string(),
            value,
        };
        for (scope, listener) in &self.property_listeners {
            match scope {
                Some(p) if p != property => continue,
                _ => listener.property_changed(&change).await,
            }
        }
    }
}

/// A named unit of simulation behavior. The engine invokes behavior on it
/// during a run; identity is immutable once registered.
#[async_trait]
pub trait SimEntity: Send + Sync {
    fn core(&self) -> &EntityCore;

    fn core_mut(&mut self) -> &mut EntityCore;

    /// Returns the entity to its pristine pre-replication state.
    async fn reset(&mut self);

    /// Called once at the start of each replication to schedule the
    /// entity's initial events.
    async fn start_replication(&mut self, schedule: &mut Schedule) -> Result<(), anyhow::Error>;

    /// Handles one fired event, optionally scheduling follow-up events.
    async fn handle_event(&mut self, event: &SimEvent, schedule: &mut Schedule) -> Result<(), anyhow::Error>;

    /// Called when an entity this one listens to fires an event. Default
    /// implementation ignores heard events.
    async fn hear_event(&mut self, _event: &SimEvent, _schedule: &mut Schedule) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
