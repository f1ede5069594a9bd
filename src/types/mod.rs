use serde::Serialize;
use std::fmt;

/// Simulation (virtual) time in seconds.
pub type SimTime = f64;

/// Identity of an engine event list. Entities are bound to exactly one
/// event list at a time and are rebound when the engine rebuilds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EventListId(pub u64);

impl fmt::Display for EventListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event-list-{}", self.0)
    }
}

/// What a statistics collector reports as its terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatisticKind {
    /// The number of observations seen.
    Count,
    /// The running mean of the observations seen.
    Mean,
}

/// Which family a statistics collector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticTier {
    /// Reset at the start of every replication, read once at its end.
    Replication,
    /// Persists across replications, fed once per replication.
    DesignPoint,
}

/// The four families of declarative connection records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Entity-to-entity event producer/listener link.
    EventListener,
    /// Entity (or entity property) into a per-replication collector.
    ReplicationStat,
    /// Collector or entity into a design-point collector.
    DesignPointStat,
    /// Entity (or entity property) into a named generic observer.
    Observer,
}

/// A declarative wiring record. Connections are data, not live wiring;
/// they only take effect when the wiring engine processes them.
#[derive(Debug, Clone)]
pub struct Connection {
    pub kind: ConnectionKind,
    /// Name of the listening entity, collector, or observer.
    pub listener: String,
    /// Optional property scope; `None` means every property of the source.
    pub property: Option<String>,
    /// Name of the entity or collector whose changes are listened to.
    pub source: String,
}

/// Harness run state as observed by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    StoppedByUser,
    Faulted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::StoppedByUser => "stopped-by-user",
            RunState::Faulted => "faulted",
        };
        write!(f, "{}", s)
    }
}

/// A property-change notification published by an entity.
#[derive(Debug, Clone)]
pub struct PropertyChange {
    /// Name of the publishing entity.
    pub source: String,
    /// Name of the property that changed.
    pub property: String,
    /// New value of the property.
    pub value: f64,
}

/// A scheduled simulation event.
#[derive(Debug, Clone)]
pub struct SimEvent {
    /// Virtual time at which the event fires.
    pub time: SimTime,
    /// Event name, interpreted by the owning entity.
    pub name: String,
    /// Name of the entity the event belongs to.
    pub source: String,
}
