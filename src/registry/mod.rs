use crate::entity::{PropertyListenerRef, SimEntityRef};
use crate::types::{Connection, ConnectionKind, StatisticKind, StatisticTier};
use thiserror::Error;


#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),
    #[error("statistic not found: {0}")]
    StatisticNotFound(String),
    #[error("observer not found: {0}")]
    ObserverNotFound(String),
}

/// Builds one fresh instance of a registered entity. Invoked on every run
/// start so entity construction is repeatable; construction may fail.
pub type EntityFactory = Box<dyn Fn() -> Result<SimEntityRef, anyhow::Error> + Send + Sync>;

/// Definition of a statistics collector to be created at run start.
#[derive(Debug, Clone)]
pub struct StatisticDef {
    pub name: String,
    pub kind: StatisticKind,
}

/// Holds named entity factories, named statistics definitions (two tiers),
/// named generic observers, and declarative connection records. No behavior
/// beyond storage and lookup; the wiring engine consumes it at run start.
///
/// Every map preserves insertion order; re-adding a name overwrites silently
/// (last write wins), mirroring declarative-model reloading.
pub struct AssemblyRegistry {
    entities: Vec<(String, EntityFactory)>,
    replication_stats: Vec<StatisticDef>,
    design_point_stats: Vec<StatisticDef>,
    observers: Vec<(String, PropertyListenerRef)>,
    connections: Vec<Connection>,
}

impl AssemblyRegistry {
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            replication_stats: Vec::new(),
            design_point_stats: Vec::new(),
            observers: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn add_entity(&mut self, name: &str, factory: EntityFactory) {
        match self.entities.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = factory,
            None => self.entities.push((name.to_string(), factory)),
        }
    }

    pub fn add_statistic(&mut self, tier: StatisticTier, name: &str, kind: StatisticKind) {
        let defs = match tier {
            StatisticTier::Replication => &mut self.replication_stats,
            StatisticTier::DesignPoint => &mut self.design_point_stats,
        };
        match defs.iter_mut().find(|d| d.name == name) {
            Some(def) => def.kind = kind,
            None => defs.push(StatisticDef {
                name: name.to_string(),
                kind,
            }),
        }
    }

    pub fn add_observer(&mut self, name: &str, observer: PropertyListenerRef) {
        match self.observers.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = observer,
            None => self.observers.push((name.to_string(), observer)),
        }
    }

    pub fn add_connection(
        &mut self,
        kind: ConnectionKind,
        listener: &str,
        property: Option<&str>,
        source: &str,
    ) {
        self.connections.push(Connection {
            kind,
            listener: listener.to_string(),
            property: property.map(|p| p.to_string()),
            source: source.to_string(),
        });
    }

    /// Builds a fresh instance of the named entity. Not-found is a
    /// non-fatal per-connection failure for wiring callers.
    pub fn lookup_entity(&self, name: &str) -> Result<SimEntityRef, anyhow::Error> {
        let factory = self
            .entities
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
            .ok_or_else(|| RegistryError::EntityNotFound(name.to_string()))?;
        factory()
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|(n, _)| n.as_str())
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Builds fresh instances of every registered entity, in order.
    pub fn build_entities(&self) -> Result<Vec<SimEntityRef>, anyhow::Error> {
        let mut built = Vec::with_capacity(self.entities.len());
        for (name, factory) in &self.entities {
            let entity = factory()
                .map_err(|e| anyhow::anyhow!("failed to construct entity {}: {}", name, e))?;
            built.push(entity);
        }
        Ok(built)
    }

    pub fn statistics(&self, tier: StatisticTier) -> &[StatisticDef] {
        match tier {
            StatisticTier::Replication => &self.replication_stats,
            StatisticTier::DesignPoint => &self.design_point_stats,
        }
    }

    pub fn observers(&self) -> impl Iterator<Item = (&str, &PropertyListenerRef)> {
        self.observers.iter().map(|(n, o)| (n.as_str(), o))
    }

    pub fn lookup_observer(&self, name: &str) -> Option<PropertyListenerRef> {
        self.observers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, o)| o.clone())
    }

    /// Connection records of one kind, in registration order.
    pub fn connections(&self, kind: ConnectionKind) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.kind == kind)
    }

    pub fn all_connections(&self) -> &[Connection] {
        &self.connections
    }
}

impl Default for AssemblyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
