use super::{EntityCore, PropertyListener, SimEntity};
use crate::engine::Schedule;
use crate::types::{PropertyChange, SimEvent};
use crate::utils::logging;
use async_trait::async_trait;

/// An entity wired as an event listener of other entities. It counts every
/// event it hears and republishes the running count, which makes
/// entity-to-entity links observable by statistics collectors.
pub struct EventMonitor {
    core: EntityCore,
    heard: u64,
}

impl EventMonitor {
    pub fn new(name: &str) -> Self {
        Self {
            core: EntityCore::new(name),
            heard: 0,
        }
    }

    pub fn heard(&self) -> u64 {
        self.heard
    }
}

#[async_trait]
impl SimEntity for EventMonitor {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    async fn reset(&mut self) {
        self.heard = 0;
    }

    async fn start_replication(&mut self, _schedule: &mut Schedule) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn handle_event(&mut self, _event: &SimEvent, _schedule: &mut Schedule) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn hear_event(&mut self, event: &SimEvent, _schedule: &mut Schedule) -> Result<(), anyhow::Error> {
        self.heard += 1;
        self.core.publish("heard", self.heard as f64).await;
        logging::log(
            "MONITOR",
            &format!("{} heard {}.{} at t={:.4}", self.core.name(), event.source, event.name, event.time),
        );
        Ok(())
    }
}

/// A generic observer that narrates property changes through the logger.
pub struct LogObserver {
    name: String,
}

impl LogObserver {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

#[async_trait]
impl PropertyListener for LogObserver {
    async fn property_changed(&self, change: &PropertyChange) {
        logging::log(
            "OBSERVER",
            &format!(
                "{}: {}.{} = {:.4}",
                self.name, change.source, change.property, change.value
            ),
        );
    }
}
