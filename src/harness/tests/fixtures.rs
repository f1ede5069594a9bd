use crate::engine::Schedule;
use crate::entity::{EntityCore, SimEntity, SimEntityRef};
use crate::harness::AssemblyHarness;
use crate::registry::AssemblyRegistry;
use crate::types::{ConnectionKind, SimEvent, StatisticKind, StatisticTier};
use async_trait::async_trait;
use std::io::{self, Write};
use std::sync::{Arc, Mutex as StdMutex};

/// Deterministic test entity: on replication `r` it schedules
/// `bursts[r % len]` pulse events at 1-second spacing and publishes a
/// "value" property change for each one fired.
///
/// The replication counter survives `reset` so consecutive replications
/// walk through the burst pattern.
pub struct BurstEntity {
    core: EntityCore,
    bursts: Vec<usize>,
    replications_started: usize,
    fired: u64,
}

impl BurstEntity {
    pub fn new(name: &str, bursts: &[usize]) -> Self {
        Self {
            core: EntityCore::new(name),
            bursts: bursts.to_vec(),
            replications_started: 0,
            fired: 0,
        }
    }
}

#[async_trait]
impl SimEntity for BurstEntity {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    async fn reset(&mut self) {
        self.fired = 0;
    }

    async fn start_replication(&mut self, schedule: &mut Schedule) -> Result<(), anyhow::Error> {
        let count = self.bursts[self.replications_started % self.bursts.len()];
        self.replications_started += 1;
        for i in 0..count {
            schedule.schedule_in((i + 1) as f64, "pulse");
        }
        Ok(())
    }

    async fn handle_event(&mut self, _event: &SimEvent, _schedule: &mut Schedule) -> Result<(), anyhow::Error> {
        self.fired += 1;
        self.core.publish("value", self.fired as f64).await;
        Ok(())
    }
}

/// Report sink whose contents remain inspectable after the harness takes
/// ownership of the boxed writer.
#[derive(Clone)]
pub struct SharedBuf(pub Arc<StdMutex<Vec<u8>>>);

impl SharedBuf {
    pub fn new() -> Self {
        Self(Arc::new(StdMutex::new(Vec::new())))
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A registry with one burst entity wired into a per-replication count
/// collector "X.count" and a design-point count collector "X".
pub fn burst_registry(bursts: &'static [usize]) -> AssemblyRegistry {
    let mut registry = AssemblyRegistry::new();
    registry.add_entity(
        "x",
        Box::new(move || Ok(SimEntityRef::new(BurstEntity::new("x", bursts)))),
    );
    registry.add_statistic(StatisticTier::Replication, "X.count", StatisticKind::Count);
    registry.add_statistic(StatisticTier::DesignPoint, "X", StatisticKind::Count);
    registry.add_connection(ConnectionKind::ReplicationStat, "X.count", Some("value"), "x");
    registry.add_connection(ConnectionKind::DesignPointStat, "X", None, "X.count");
    registry
}

pub async fn capture_output(harness: &AssemblyHarness) -> SharedBuf {
    let buf = SharedBuf::new();
    harness.set_output(Box::new(buf.clone())).await;
    buf
}
