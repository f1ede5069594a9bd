use crate::entity::SimEntityRef;
use crate::types::{EventListId, SimEvent, SimTime};
use async_trait::async_trait;
use thiserror::Error;

pub mod event_list;
pub mod virtual_clock;

pub use event_list::EventList;
pub use virtual_clock::VirtualClockEngine;

#[derive(Debug, Error)]
pub enum EngineFault {
    /// The event list was mutated while a reset was in progress. Recoverable:
    /// the harness rebuilds the event list and continues the replication.
    #[error("event list mutated concurrently during reset")]
    ConcurrentReset,
    #[error("engine is already running")]
    AlreadyRunning,
    #[error("internal engine error: {0}")]
    Internal(String),
}

/// Buffer of follow-up events an entity schedules while handling an event.
/// The engine drains it into the live event list after the entity returns,
/// so entities never touch engine internals directly.
pub struct Schedule {
    now: SimTime,
    pending: Vec<(SimTime, String)>,
}

impl Schedule {
    pub fn new(now: SimTime) -> Self {
        Self { now, pending: Vec::new() }
    }

    /// Current virtual time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedules an event on the calling entity `delay` seconds from now.
    pub fn schedule_in(&mut self, delay: SimTime, name: &str) {
        self.pending.push((self.now + delay.max(0.0), name.to_string()));
    }

    pub fn drain(self) -> Vec<(SimTime, String)> {
        self.pending
    }
}

/// The external discrete-event scheduling engine, treated as a black box.
/// All methods take `&self`: implementations keep interior state so the
/// control surface can stop or pause a run that is in flight on the worker.
#[async_trait]
pub trait DesEngine: Send + Sync {
    /// Returns the engine to time zero and resets every rerun entity.
    /// Fails with a recoverable fault under concurrent mutation.
    async fn reset(&self) -> Result<(), EngineFault>;

    /// Runs one replication to the stop time or event exhaustion. Blocks
    /// the calling task until the replication finishes or `stop` is called.
    async fn start(&self) -> Result<(), EngineFault>;

    /// Halts the current replication. Non-blocking.
    fn stop(&self);

    fn pause(&self);

    fn resume(&self);

    fn is_running(&self) -> bool;

    fn set_stop_time(&self, stop_time: SimTime);

    fn set_verbose(&self, verbose: bool);

    fn set_single_step(&self, single_step: bool);

    /// The set of entities the engine re-initializes and re-invokes at the
    /// start of each replication.
    fn rerun_entities(&self) -> Vec<SimEntityRef>;

    fn add_rerun(&self, entity: SimEntityRef);

    fn clear_rerun(&self);

    /// Allocates a fresh, empty event list and returns its identity.
    /// Entities must be rebound to it by the caller.
    fn new_event_list(&self) -> EventListId;

    /// The event currently being fired, if any.
    fn current_event(&self) -> Option<SimEvent>;

    fn sim_time(&self) -> SimTime;
}
