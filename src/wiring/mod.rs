use crate::entity::{PropertyListenerRef, SimEntityRef};
use crate::registry::AssemblyRegistry;
use crate::stats::StatsAggregator;
use crate::types::{Connection, ConnectionKind};
use crate::utils::logging;
use thiserror::Error;

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
pub enum WiringError {
    /// `wire_all` already ran; re-wiring would double-subscribe listeners.
    #[error("assembly is already wired")]
    AlreadyWired,
}

/// Converts the registry's declarative connection records into live
/// subscriptions on the freshly built entities and collectors.
///
/// The four phases run strictly in order: event producer/listener links,
/// per-replication statistics, design-point statistics, generic observers.
/// The order is an invariant: design-point aggregation assumes the
/// per-replication collectors are already receiving updates. A resolution
/// failure on one connection is logged and skipped; it never aborts a phase.
pub struct WiringEngine {
    wired: bool,
}

impl WiringEngine {
    pub fn new() -> Self {
        Self { wired: false }
    }

    pub fn is_wired(&self) -> bool {
        self.wired
    }

    pub async fn wire_all(
        &mut self,
        registry: &AssemblyRegistry,
        entities: &[SimEntityRef],
        stats: &StatsAggregator,
    ) -> Result<(), WiringError> {
        if self.wired {
            return Err(WiringError::AlreadyWired);
        }

        self.wire_event_listeners(registry, entities).await;
        self.wire_replication_stats(registry, entities, stats).await;
        self.wire_design_point_stats(registry, entities, stats).await;
        self.wire_observers(registry, entities).await;

        self.wired = true;
        logging::log("WIRING", "assembly wired");
        Ok(())
    }

    /// Phase 1: entity-to-entity event producer/listener links.
    async fn wire_event_listeners(&self, registry: &AssemblyRegistry, entities: &[SimEntityRef]) {
        for conn in registry.connections(ConnectionKind::EventListener) {
            let Some(source) = find_entity(entities, &conn.source) else {
                skip(conn, "source entity not registered");
                continue;
            };
            let Some(listener) = find_entity(entities, &conn.listener) else {
                skip(conn, "listener entity not registered");
                continue;
            };
            source.lock().await.core_mut().add_event_listener(listener.clone());
            logging::log(
                "WIRING",
                &format!("event link: {} -> {}", conn.source, conn.listener),
            );
        }
    }

    /// Phase 2: entity (or entity-property) into per-replication collectors.
    async fn wire_replication_stats(
        &self,
        registry: &AssemblyRegistry,
        entities: &[SimEntityRef],
        stats: &StatsAggregator,
    ) {
        for conn in registry.connections(ConnectionKind::ReplicationStat) {
            let Some(source) = find_entity(entities, &conn.source) else {
                skip(conn, "source entity not registered");
                continue;
            };
            let Some(collector) = stats.replication_collector(&conn.listener) else {
                skip(conn, "per-replication collector not registered");
                continue;
            };
            let listener: PropertyListenerRef = collector;
            source
                .lock()
                .await
                .core_mut()
                .add_property_listener(conn.property.clone(), listener);
            logging::log(
                "WIRING",
                &format!(
                    "replication stat: {}{} -> {}",
                    conn.source,
                    property_suffix(conn),
                    conn.listener
                ),
            );
        }
    }

    /// Phase 3: per-replication collectors (or entities) into design-point
    /// collectors. An unspecified property defaults to the design-point
    /// collector's own name.
    async fn wire_design_point_stats(
        &self,
        registry: &AssemblyRegistry,
        entities: &[SimEntityRef],
        stats: &StatsAggregator,
    ) {
        for conn in registry.connections(ConnectionKind::DesignPointStat) {
            let Some(design) = stats.design_point(&conn.listener) else {
                skip(conn, "design-point collector not registered");
                continue;
            };

            if let Some(source) = stats.replication_collector(&conn.source) {
                design.lock().await.set_source(source, conn.property.clone());
                logging::log(
                    "WIRING",
                    &format!("design point: collector {} -> {}", conn.source, conn.listener),
                );
                continue;
            }

            // No matching collector: fall back to subscribing to the
            // entity's property changes directly.
            let Some(source) = find_entity(entities, &conn.source) else {
                skip(conn, "source resolves to neither collector nor entity");
                continue;
            };
            let property = match &conn.property {
                Some(p) => p.clone(),
                None => design.lock().await.property().to_string(),
            };
            let listener: PropertyListenerRef = design;
            source
                .lock()
                .await
                .core_mut()
                .add_property_listener(Some(property), listener);
            logging::log(
                "WIRING",
                &format!("design point: entity {} -> {}", conn.source, conn.listener),
            );
        }
    }

    /// Phase 4: entity (or entity-property) into named generic observers.
    async fn wire_observers(&self, registry: &AssemblyRegistry, entities: &[SimEntityRef]) {
        for conn in registry.connections(ConnectionKind::Observer) {
            let Some(source) = find_entity(entities, &conn.source) else {
                skip(conn, "source entity not registered");
                continue;
            };
            let Some(observer) = registry.lookup_observer(&conn.listener) else {
                skip(conn, "observer not registered");
                continue;
            };
            source
                .lock()
                .await
                .core_mut()
                .add_property_listener(conn.property.clone(), observer);
            logging::log(
                "WIRING",
                &format!(
                    "observer: {}{} -> {}",
                    conn.source,
                    property_suffix(conn),
                    conn.listener
                ),
            );
        }
    }
}

impl Default for WiringEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn find_entity(entities: &[SimEntityRef], name: &str) -> Option<SimEntityRef> {
    entities.iter().find(|e| e.name() == name).cloned()
}

fn property_suffix(conn: &Connection) -> String {
    match &conn.property {
        Some(p) => format!(".{}", p),
        None => String::new(),
    }
}

fn skip(conn: &Connection, reason: &str) {
    tracing::warn!(
        listener = %conn.listener,
        source = %conn.source,
        "skipping connection: {}",
        reason
    );
    logging::log(
        "WIRING",
        &format!(
            "skipping connection {} -> {}: {}",
            conn.source, conn.listener, reason
        ),
    );
}
