use crate::entity::PropertyListener;
use crate::types::{PropertyChange, StatisticKind};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;


/// Immutable view of a collector, safe to hand to external readers.
#[derive(Debug, Clone, Serialize)]
pub struct StatSnapshot {
    pub name: String,
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub variance: f64,
}

/// A running statistics collector: count, min, max, mean, and variance
/// accumulated one observation at a time (Welford's update).
#[derive(Debug, Clone)]
pub struct StatCollector {
    name: String,
    kind: StatisticKind,
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl StatCollector {
    pub fn new(name: &str, kind: StatisticKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StatisticKind {
        self.kind
    }

    pub fn observe(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Returns the collector to its pristine state. Safe to call twice;
    /// resetting an already-clean collector is a no-op.
    pub fn reset(&mut self) {
        self.count = 0;
        self.mean = 0.0;
        self.m2 = 0.0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn min(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.max
        }
    }

    /// Sample variance; zero until two observations exist.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// The value this collector contributes at the end of a replication,
    /// read per the requesting collector's kind.
    pub fn terminal_value(&self, kind: StatisticKind) -> f64 {
        match kind {
            StatisticKind::Count => self.count as f64,
            StatisticKind::Mean => self.mean(),
        }
    }

    pub fn snapshot(&self) -> StatSnapshot {
        StatSnapshot {
            name: self.name.clone(),
            count: self.count,
            min: self.min(),
            max: self.max(),
            mean: self.mean(),
            std_dev: self.std_dev(),
            variance: self.variance(),
        }
    }
}

#[async_trait]
impl PropertyListener for Mutex<StatCollector> {
    async fn property_changed(&self, change: &PropertyChange) {
        self.lock().await.observe(change.value);
    }
}

/// A design-point collector: persists across replications and is fed once
/// per replication with the terminal value of its paired per-replication
/// collector, read as mean or count per this collector's own kind.
pub struct DesignPointStat {
    collector: StatCollector,
    source: Option<Arc<Mutex<StatCollector>>>,
    property: String,
}

impl DesignPointStat {
    pub fn new(name: &str, kind: StatisticKind) -> Self {
        Self {
            collector: StatCollector::new(name, kind),
            source: None,
            // Defaults to the collector's own name as the property key.
            property: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        self.collector.name()
    }

    pub fn kind(&self) -> StatisticKind {
        self.collector.kind()
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn set_source(&mut self, source: Arc<Mutex<StatCollector>>, property: Option<String>) {
        self.source = source.into();
        if let Some(p) = property {
            self.property = p;
        }
    }

    pub fn source(&self) -> Option<Arc<Mutex<StatCollector>>> {
        self.source.clone()
    }

    pub fn observe(&mut self, value: f64) {
        self.collector.observe(value);
    }

    pub fn reset(&mut self) {
        self.collector.reset();
        self.source = None;
    }

    pub fn snapshot(&self) -> StatSnapshot {
        self.collector.snapshot()
    }

    pub fn count(&self) -> u64 {
        self.collector.count()
    }

    pub fn mean(&self) -> f64 {
        self.collector.mean()
    }
}

#[async_trait]
impl PropertyListener for Mutex<DesignPointStat> {
    async fn property_changed(&self, change: &PropertyChange) {
        self.lock().await.observe(change.value);
    }
}

/// Owns both collector tiers and the retained raw replication rows, and
/// produces the formatted replication and summary reports.
pub struct StatsAggregator {
    replication: Vec<(String, Arc<Mutex<StatCollector>>)>,
    design: Vec<(String, Arc<Mutex<DesignPointStat>>)>,
    /// One row list per per-replication collector, in registration order.
    raw: Option<Vec<Vec<StatSnapshot>>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            replication: Vec::new(),
            design: Vec::new(),
            raw: None,
        }
    }

    /// Registers a per-replication collector. Re-adding a name overwrites
    /// silently, keeping the original registration position.
    pub fn add_replication_collector(&mut self, name: &str, kind: StatisticKind) -> Arc<Mutex<StatCollector>> {
        let collector = Arc::new(Mutex::new(StatCollector::new(name, kind)));
        match self.replication.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = collector.clone(),
            None => self.replication.push((name.to_string(), collector.clone())),
        }
        collector
    }

    pub fn add_design_point(&mut self, name: &str, kind: StatisticKind) -> Arc<Mutex<DesignPointStat>> {
        let stat = Arc::new(Mutex::new(DesignPointStat::new(name, kind)));
        match self.design.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = stat.clone(),
            None => self.design.push((name.to_string(), stat.clone())),
        }
        stat
    }

    pub fn replication_collector(&self, name: &str) -> Option<Arc<Mutex<StatCollector>>> {
        self.replication.iter().find(|(n, _)| n == name).map(|(_, c)| c.clone())
    }

    pub fn design_point(&self, name: &str) -> Option<Arc<Mutex<DesignPointStat>>> {
        self.design.iter().find(|(n, _)| n == name).map(|(_, d)| d.clone())
    }

    pub fn replication_collectors(&self) -> impl Iterator<Item = &Arc<Mutex<StatCollector>>> {
        self.replication.iter().map(|(_, c)| c)
    }

    pub fn design_points(&self) -> impl Iterator<Item = &Arc<Mutex<DesignPointStat>>> {
        self.design.iter().map(|(_, d)| d)
    }

    pub fn replication_collector_count(&self) -> usize {
        self.replication.len()
    }

    /// Clears any prior retained data and pre-allocates one empty record
    /// list per per-replication collector.
    pub fn enable_raw_retention(&mut self) {
        self.raw = Some(vec![Vec::new(); self.replication.len()]);
    }

    /// Drops any retained data and stops retaining.
    pub fn disable_raw_retention(&mut self) {
        self.raw = None;
    }

    pub fn raw_retention_enabled(&self) -> bool {
        self.raw.is_some()
    }

    pub fn raw_data(&self) -> Option<&Vec<Vec<StatSnapshot>>> {
        self.raw.as_ref()
    }

    /// Prepares per-replication collectors for replication `index`. The very
    /// first replication starts clean, so only later indices reset.
    pub async fn on_replication_start(&self, index: usize) {
        if index == 0 {
            return;
        }
        for (_, collector) in &self.replication {
            collector.lock().await.reset();
        }
    }

    /// Feeds each design-point collector the terminal value of its paired
    /// per-replication collector as one new observation. Must run after the
    /// engine finishes a replication and before the next reset.
    pub async fn snapshot_for_design_points(&self) {
        for (_, design) in &self.design {
            let mut design = design.lock().await;
            let Some(source) = design.source() else {
                continue;
            };
            let value = source.lock().await.terminal_value(design.kind());
            design.observe(value);
        }
    }

    /// Formats the per-replication statistics table. Side effect: appends
    /// this replication's raw rows to the retained data when enabled.
    pub async fn format_replication_report(&mut self, index: usize) -> String {
        let mut rows = Vec::with_capacity(self.replication.len());
        for (_, collector) in &self.replication {
            rows.push(collector.lock().await.snapshot());
        }
        if let Some(raw) = self.raw.as_mut() {
            for (i, row) in rows.iter().enumerate() {
                raw[i].push(row.clone());
            }
        }
        let mut out = format!("=== Replication {} Statistics ===\n", index + 1);
        out.push_str(&format_table(&rows));
        out
    }

    /// Formats the design-point statistics table over every replication
    /// observed so far. Valid (empty) when no replication has completed.
    pub async fn format_summary_report(&self) -> String {
        let mut rows = Vec::with_capacity(self.design.len());
        for (_, design) in &self.design {
            rows.push(design.lock().await.snapshot());
        }
        let mut out = String::from("=== Summary Statistics (Design Points) ===\n");
        out.push_str(&format_table(&rows));
        out
    }

    pub async fn summary_snapshots(&self) -> Vec<StatSnapshot> {
        let mut rows = Vec::with_capacity(self.design.len());
        for (_, design) in &self.design {
            rows.push(design.lock().await.snapshot());
        }
        rows
    }

    /// Returns every collector and the retained data to pristine state.
    pub async fn reset_all(&mut self) {
        for (_, collector) in &self.replication {
            collector.lock().await.reset();
        }
        for (_, design) in &self.design {
            design.lock().await.reset();
        }
        self.raw = None;
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-point, four-decimal tabular formatting. Presentation contract:
/// no scientific notation even for very small or large values.
fn format_table(rows: &[StatSnapshot]) -> String {
    let mut out = format!(
        "{:<24} {:>8} {:>14} {:>14} {:>14} {:>14} {:>14}\n",
        "name", "count", "min", "max", "mean", "std dev", "variance"
    );
    for row in rows {
        out.push_str(&format!(
            "{:<24} {:>8} {:>14.4} {:>14.4} {:>14.4} {:>14.4} {:>14.4}\n",
            row.name, row.count, row.min, row.max, row.mean, row.std_dev, row.variance
        ));
    }
    out
}
