use crate::entity::{EventMonitor, PropertyListener, SimEntityRef};
use crate::registry::AssemblyRegistry;
use crate::stats::StatsAggregator;
use crate::types::{ConnectionKind, PropertyChange, StatisticKind, StatisticTier};
use crate::wiring::{WiringEngine, WiringError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex as StdMutex};

/// Observer fixture that records every property change it receives.
struct Recorder {
    changes: Arc<StdMutex<Vec<PropertyChange>>>,
}

impl Recorder {
    fn new() -> (Arc<Self>, Arc<StdMutex<Vec<PropertyChange>>>) {
        let changes = Arc::new(StdMutex::new(Vec::new()));
        (
            Arc::new(Self {
                changes: changes.clone(),
            }),
            changes,
        )
    }
}

#[async_trait]
impl PropertyListener for Recorder {
    async fn property_changed(&self, change: &PropertyChange) {
        self.changes.lock().unwrap().push(change.clone());
    }
}

fn monitor_registry(names: &[&'static str]) -> AssemblyRegistry {
    let mut registry = AssemblyRegistry::new();
    for &name in names {
        registry.add_entity(name, Box::new(move || Ok(SimEntityRef::new(EventMonitor::new(name)))));
    }
    registry
}

fn collectors_for(registry: &AssemblyRegistry) -> StatsAggregator {
    let mut stats = StatsAggregator::new();
    for def in registry.statistics(StatisticTier::Replication) {
        stats.add_replication_collector(&def.name, def.kind);
    }
    for def in registry.statistics(StatisticTier::DesignPoint) {
        stats.add_design_point(&def.name, def.kind);
    }
    stats
}

/// Test phase 1: an event-listener connection registers the listener
/// entity on the source's core
#[tokio::test]
async fn test_event_listener_link() {
    let mut registry = monitor_registry(&["source", "sink"]);
    registry.add_connection(ConnectionKind::EventListener, "sink", None, "source");

    let entities = registry.build_entities().unwrap();
    let stats = collectors_for(&registry);
    let mut wiring = WiringEngine::new();
    wiring.wire_all(&registry, &entities, &stats).await.unwrap();

    let source = entities.iter().find(|e| e.name() == "source").unwrap();
    let source = source.lock().await;
    let listeners = source.core().event_listeners();
    assert_eq!(listeners.len(), 1);
    assert_eq!(listeners[0].name(), "sink");
}

/// Test phase 2: a property published by the source flows into the
/// per-replication collector, honoring the property scope
#[tokio::test]
async fn test_replication_stat_subscription() {
    let mut registry = monitor_registry(&["arrivals"]);
    registry.add_statistic(StatisticTier::Replication, "arrivals.count", StatisticKind::Count);
    registry.add_connection(
        ConnectionKind::ReplicationStat,
        "arrivals.count",
        Some("count"),
        "arrivals",
    );

    let entities = registry.build_entities().unwrap();
    let stats = collectors_for(&registry);
    let mut wiring = WiringEngine::new();
    wiring.wire_all(&registry, &entities, &stats).await.unwrap();

    let arrivals = &entities[0];
    {
        let guard = arrivals.lock().await;
        guard.core().publish("count", 1.0).await;
        guard.core().publish("count", 2.0).await;
        // A differently named property must not reach the collector.
        guard.core().publish("interarrival", 9.0).await;
    }

    let collector = stats.replication_collector("arrivals.count").unwrap();
    assert_eq!(collector.lock().await.count(), 2);
}

/// Test phase 3: a design point prefers a per-replication collector as
/// its source over a live entity subscription
#[tokio::test]
async fn test_design_point_prefers_collector_source() {
    let mut registry = monitor_registry(&["arrivals"]);
    registry.add_statistic(StatisticTier::Replication, "arrivals.count", StatisticKind::Count);
    registry.add_statistic(StatisticTier::DesignPoint, "arrivals", StatisticKind::Count);
    registry.add_connection(
        ConnectionKind::DesignPointStat,
        "arrivals",
        None,
        "arrivals.count",
    );

    let entities = registry.build_entities().unwrap();
    let stats = collectors_for(&registry);
    let mut wiring = WiringEngine::new();
    wiring.wire_all(&registry, &entities, &stats).await.unwrap();

    let design = stats.design_point("arrivals").unwrap();
    let design = design.lock().await;
    assert!(design.source().is_some());
    let source = design.source().unwrap();
    assert_eq!(source.lock().await.name(), "arrivals.count");
}

/// Test phase 3 fallback: with no matching collector the design point
/// subscribes to the source entity, defaulting the property to its own name
#[tokio::test]
async fn test_design_point_entity_fallback_default_property() {
    let mut registry = monitor_registry(&["server"]);
    registry.add_statistic(StatisticTier::DesignPoint, "utilization", StatisticKind::Mean);
    registry.add_connection(ConnectionKind::DesignPointStat, "utilization", None, "server");

    let entities = registry.build_entities().unwrap();
    let stats = collectors_for(&registry);
    let mut wiring = WiringEngine::new();
    wiring.wire_all(&registry, &entities, &stats).await.unwrap();

    let server = &entities[0];
    {
        let guard = server.lock().await;
        guard.core().publish("utilization", 0.5).await;
        guard.core().publish("queue.length", 4.0).await;
    }

    let design = stats.design_point("utilization").unwrap();
    let design = design.lock().await;
    assert!(design.source().is_none());
    assert_eq!(design.count(), 1);
    assert_eq!(design.mean(), 0.5);
}

/// Test phase 4: observers receive scoped property changes
#[tokio::test]
async fn test_observer_subscription() {
    let mut registry = monitor_registry(&["server"]);
    let (recorder, changes) = Recorder::new();
    registry.add_observer("recorder", recorder);
    registry.add_connection(ConnectionKind::Observer, "recorder", Some("load"), "server");

    let entities = registry.build_entities().unwrap();
    let stats = collectors_for(&registry);
    let mut wiring = WiringEngine::new();
    wiring.wire_all(&registry, &entities, &stats).await.unwrap();

    {
        let guard = entities[0].lock().await;
        guard.core().publish("load", 0.9).await;
        guard.core().publish("other", 1.0).await;
    }

    let changes = changes.lock().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].property, "load");
    assert_eq!(changes[0].value, 0.9);
}

/// Test that a connection naming an unknown source is skipped while the
/// rest of the phase still wires
#[tokio::test]
async fn test_unresolved_connection_is_isolated() {
    let mut registry = monitor_registry(&["source", "sink"]);
    registry.add_connection(ConnectionKind::EventListener, "sink", None, "ghost");
    registry.add_connection(ConnectionKind::EventListener, "sink", None, "source");

    let entities = registry.build_entities().unwrap();
    let stats = collectors_for(&registry);
    let mut wiring = WiringEngine::new();
    wiring.wire_all(&registry, &entities, &stats).await.unwrap();

    let source = entities.iter().find(|e| e.name() == "source").unwrap();
    assert_eq!(source.lock().await.core().event_listeners().len(), 1);
}

/// Test that wiring twice is rejected
#[tokio::test]
async fn test_rewire_rejected() {
    let registry = monitor_registry(&["source"]);
    let entities = registry.build_entities().unwrap();
    let stats = collectors_for(&registry);
    let mut wiring = WiringEngine::new();

    wiring.wire_all(&registry, &entities, &stats).await.unwrap();
    assert!(wiring.is_wired());

    let second = wiring.wire_all(&registry, &entities, &stats).await;
    assert!(matches!(second, Err(WiringError::AlreadyWired)));
}
