use super::{DesEngine, EngineFault, EventList, Schedule};
use crate::entity::SimEntityRef;
use crate::types::{EventListId, SimEvent, SimTime};
use crate::utils::logging;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

struct EngineState {
    events: EventList,
    next_list_id: u64,
    rerun: Vec<SimEntityRef>,
    stop_time: SimTime,
    clock: SimTime,
    verbose: bool,
    single_step: bool,
    current: Option<SimEvent>,
    fail_next_reset: bool,
}

/// Reference implementation of the scheduling engine: a virtual clock over a
/// binary-heap event list. It stands in for the production engine so the
/// harness can be driven end to end; it is not a general-purpose kernel.
pub struct VirtualClockEngine {
    state: Mutex<EngineState>,
    running: AtomicBool,
    halt: AtomicBool,
    paused: watch::Sender<bool>,
}

impl VirtualClockEngine {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            state: Mutex::new(EngineState {
                events: EventList::new(EventListId(1)),
                next_list_id: 1,
                rerun: Vec::new(),
                stop_time: 0.0,
                clock: 0.0,
                verbose: false,
                single_step: false,
                current: None,
                fail_next_reset: false,
            }),
            running: AtomicBool::new(false),
            halt: AtomicBool::new(false),
            paused,
        }
    }

    /// Arms a one-shot concurrent-reset fault on the next `reset` call.
    /// Used by tests to exercise the harness recovery path.
    pub fn fail_next_reset(&self) {
        self.state.lock().unwrap().fail_next_reset = true;
    }

    pub fn pending_events(&self) -> usize {
        self.state.lock().unwrap().events.len()
    }

    fn entity_by_name(&self, name: &str) -> Option<SimEntityRef> {
        let state = self.state.lock().unwrap();
        state.rerun.iter().find(|e| e.name() == name).cloned()
    }

    async fn wait_while_paused(&self) {
        let mut paused_rx = self.paused.subscribe();
        while *paused_rx.borrow_and_update() {
            if self.halt.load(Ordering::SeqCst) {
                return;
            }
            if paused_rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Fires one event: dispatches it to its owning entity, relays it to the
    /// entity's event listeners, and folds any follow-up events back into
    /// the event list.
    async fn fire(&self, event: &SimEvent) {
        let Some(owner) = self.entity_by_name(&event.source) else {
            tracing::warn!(entity = %event.source, "dropping event for unknown entity");
            return;
        };

        let mut schedule = Schedule::new(event.time);
        let listeners = {
            let mut guard = owner.lock().await;
            if let Err(e) = guard.handle_event(event, &mut schedule).await {
                tracing::error!(entity = %event.source, event = %event.name, "entity failed handling event: {}", e);
            }
            guard.core().event_listeners().to_vec()
        };
        {
            let mut state = self.state.lock().unwrap();
            for (time, name) in schedule.drain() {
                state.events.schedule(time, &name, &event.source);
            }
        }

        for listener in listeners {
            // An entity listening to itself would deadlock on its own lock.
            if listener.name() == event.source {
                continue;
            }
            let mut schedule = Schedule::new(event.time);
            {
                let mut guard = listener.lock().await;
                if let Err(e) = guard.hear_event(event, &mut schedule).await {
                    tracing::error!(entity = %listener.name(), event = %event.name, "listener failed hearing event: {}", e);
                }
            }
            let mut state = self.state.lock().unwrap();
            for (time, name) in schedule.drain() {
                state.events.schedule(time, &name, listener.name());
            }
        }
    }
}

impl Default for VirtualClockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DesEngine for VirtualClockEngine {
    async fn reset(&self) -> Result<(), EngineFault> {
        let rerun = {
            let mut state = self.state.lock().unwrap();
            if state.fail_next_reset {
                state.fail_next_reset = false;
                return Err(EngineFault::ConcurrentReset);
            }
            state.events.clear();
            state.clock = 0.0;
            state.current = None;
            state.rerun.clone()
        };
        for entity in rerun {
            entity.lock().await.reset().await;
        }
        Ok(())
    }

    async fn start(&self) -> Result<(), EngineFault> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineFault::AlreadyRunning);
        }
        self.halt.store(false, Ordering::SeqCst);

        let (rerun, verbose) = {
            let state = self.state.lock().unwrap();
            (state.rerun.clone(), state.verbose)
        };

        // Let every rerun entity schedule its initial events.
        for entity in &rerun {
            let mut schedule = Schedule::new(0.0);
            {
                let mut guard = entity.lock().await;
                if let Err(e) = guard.start_replication(&mut schedule).await {
                    self.running.store(false, Ordering::SeqCst);
                    return Err(EngineFault::Internal(format!(
                        "entity {} failed to start: {}",
                        entity.name(),
                        e
                    )));
                }
            }
            let mut state = self.state.lock().unwrap();
            for (time, name) in schedule.drain() {
                state.events.schedule(time, &name, entity.name());
            }
        }

        loop {
            if self.halt.load(Ordering::SeqCst) {
                break;
            }
            self.wait_while_paused().await;
            if self.halt.load(Ordering::SeqCst) {
                break;
            }

            let (event, single_step) = {
                let mut state = self.state.lock().unwrap();
                match state.events.peek_time() {
                    Some(t) if t <= state.stop_time => {
                        let event = state.events.pop().unwrap();
                        state.clock = event.time;
                        state.current = Some(event.clone());
                        (event, state.single_step)
                    }
                    // Exhausted, or the next event lies beyond the stop time.
                    _ => break,
                }
            };

            if verbose {
                logging::log(
                    "ENGINE",
                    &format!("t={:.4} firing {}.{}", event.time, event.source, event.name),
                );
            }
            self.fire(&event).await;
            if single_step {
                logging::log(
                    "ENGINE",
                    &format!("single-step: fired {}.{}", event.source, event.name),
                );
                tokio::task::yield_now().await;
            }
        }

        {
            let mut state = self.state.lock().unwrap();
            state.current = None;
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.halt.store(true, Ordering::SeqCst);
        // Wake a paused run so it can observe the halt flag.
        let _ = self.paused.send(false);
    }

    fn pause(&self) {
        let _ = self.paused.send(true);
    }

    fn resume(&self) {
        let _ = self.paused.send(false);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn set_stop_time(&self, stop_time: SimTime) {
        self.state.lock().unwrap().stop_time = stop_time;
    }

    fn set_verbose(&self, verbose: bool) {
        self.state.lock().unwrap().verbose = verbose;
    }

    fn set_single_step(&self, single_step: bool) {
        self.state.lock().unwrap().single_step = single_step;
    }

    fn rerun_entities(&self) -> Vec<SimEntityRef> {
        self.state.lock().unwrap().rerun.clone()
    }

    fn add_rerun(&self, entity: SimEntityRef) {
        let mut state = self.state.lock().unwrap();
        if !state.rerun.iter().any(|e| e.name() == entity.name()) {
            state.rerun.push(entity);
        }
    }

    fn clear_rerun(&self) {
        self.state.lock().unwrap().rerun.clear();
    }

    fn new_event_list(&self) -> EventListId {
        let mut state = self.state.lock().unwrap();
        state.next_list_id += 1;
        state.events = EventList::new(EventListId(state.next_list_id));
        state.events.id()
    }

    fn current_event(&self) -> Option<SimEvent> {
        self.state.lock().unwrap().current.clone()
    }

    fn sim_time(&self) -> SimTime {
        self.state.lock().unwrap().clock
    }
}
