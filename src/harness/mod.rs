use crate::config::{ConfigError, RunConfig};
use crate::engine::DesEngine;
use crate::entity::SimEntityRef;
use crate::registry::AssemblyRegistry;
use crate::stats::StatsAggregator;
use crate::types::{RunState, StatisticTier};
use crate::utils::logging;
use crate::wiring::WiringEngine;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

mod runner;

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("run already in progress")]
    AlreadyRunning,
    #[error("no run in progress")]
    NotRunning,
    #[error("cannot reset while a run is in progress")]
    RunInProgress,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("setup failed: {0}")]
    Setup(String),
}

/// Textual report sink. Defaults to stdout; the caller may redirect all
/// report output by supplying its own sink.
pub type OutputSink = Box<dyn Write + Send>;

/// The replication-run harness: drives the external engine through N
/// replications of a dynamically assembled scenario and aggregates
/// per-replication and design-point statistics.
///
/// Single-threaded relative to its own state machine: setup, wiring, and the
/// replication loop execute sequentially on one worker task. `start` hands
/// off to that worker and returns; callers observe progress through
/// [`AssemblyHarness::subscribe_state`] and the replication counter.
pub struct AssemblyHarness {
    registry: AssemblyRegistry,
    engine: Arc<dyn DesEngine>,
    config: StdMutex<RunConfig>,
    aggregator: Arc<Mutex<StatsAggregator>>,
    state: Arc<watch::Sender<RunState>>,
    stop_flag: Arc<AtomicBool>,
    current_replication: Arc<AtomicUsize>,
    output: Arc<Mutex<OutputSink>>,
    analyst_report: Arc<StdMutex<Option<PathBuf>>>,
    last_error: Arc<StdMutex<Option<String>>>,
    worker: StdMutex<Option<JoinHandle<()>>>,
}

impl AssemblyHarness {
    /// The registry is consumed: the harness owns it for the life of the
    /// run and it must not be mutated while a run is in progress.
    pub fn new(registry: AssemblyRegistry, engine: Arc<dyn DesEngine>) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            registry,
            engine,
            config: StdMutex::new(RunConfig::default()),
            aggregator: Arc::new(Mutex::new(StatsAggregator::new())),
            state: Arc::new(state),
            stop_flag: Arc::new(AtomicBool::new(false)),
            current_replication: Arc::new(AtomicUsize::new(0)),
            output: Arc::new(Mutex::new(Box::new(io::stdout()))),
            analyst_report: Arc::new(StdMutex::new(None)),
            last_error: Arc::new(StdMutex::new(None)),
            worker: StdMutex::new(None),
        }
    }

    pub fn with_config(registry: AssemblyRegistry, engine: Arc<dyn DesEngine>, config: RunConfig) -> Self {
        let harness = Self::new(registry, engine);
        *harness.config.lock().unwrap() = config;
        harness
    }

    /// Starts a run. Construction and wiring happen here, synchronously, so
    /// a setup fault is returned to the caller before any replication
    /// executes; the replication loop itself runs on a spawned worker task.
    pub async fn start(&self) -> Result<(), HarnessError> {
        if self.is_running() {
            return Err(HarnessError::AlreadyRunning);
        }
        let config = self.config.lock().unwrap().clone();
        config.validate()?;

        self.stop_flag.store(false, Ordering::SeqCst);
        self.current_replication.store(0, Ordering::SeqCst);
        *self.analyst_report.lock().unwrap() = None;
        *self.last_error.lock().unwrap() = None;
        // send_replace: the transition must land even with no subscribers.
        self.state.send_replace(RunState::Running);

        let entities = match self.set_up_assembly().await {
            Ok(entities) => entities,
            Err(e) => {
                let message = e.to_string();
                tracing::error!("run setup failed: {}", message);
                *self.last_error.lock().unwrap() = Some(message);
                self.state.send_replace(RunState::Faulted);
                return Err(e);
            }
        };

        let ctx = runner::RunContext {
            engine: self.engine.clone(),
            config,
            aggregator: self.aggregator.clone(),
            entities,
            state: self.state.clone(),
            stop_flag: self.stop_flag.clone(),
            current_replication: self.current_replication.clone(),
            output: self.output.clone(),
            analyst_report: self.analyst_report.clone(),
        };
        let handle = tokio::spawn(runner::run_replications(ctx));
        *self.worker.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Recreates entities and collectors from the registry and wires the
    /// observer graph. Idempotent: safe to call on every run start.
    async fn set_up_assembly(&self) -> Result<Vec<SimEntityRef>, HarnessError> {
        let entities = self
            .registry
            .build_entities()
            .map_err(|e| HarnessError::Setup(e.to_string()))?;
        logging::log("HARNESS", &format!("constructed {} entities", entities.len()));

        {
            // Collectors persist across runs; create only the missing ones so
            // design-point accumulators keep their observations until reset.
            let mut aggregator = self.aggregator.lock().await;
            for def in self.registry.statistics(StatisticTier::Replication) {
                let keep = match aggregator.replication_collector(&def.name) {
                    Some(existing) => existing.lock().await.kind() == def.kind,
                    None => false,
                };
                if !keep {
                    aggregator.add_replication_collector(&def.name, def.kind);
                }
            }
            for def in self.registry.statistics(StatisticTier::DesignPoint) {
                let keep = match aggregator.design_point(&def.name) {
                    Some(existing) => existing.lock().await.kind() == def.kind,
                    None => false,
                };
                if !keep {
                    aggregator.add_design_point(&def.name, def.kind);
                }
            }

            // The new run's first replication must start clean; only the
            // design points carry observations across runs.
            for collector in aggregator.replication_collectors() {
                collector.lock().await.reset();
            }

            let mut wiring = WiringEngine::new();
            wiring
                .wire_all(&self.registry, &entities, &aggregator)
                .await
                .map_err(|e| HarnessError::Setup(e.to_string()))?;
        }

        // Rebuild the engine's rerun set from the run-eligible entities.
        self.engine.clear_rerun();
        for entity in &entities {
            if entity.lock().await.core().is_rerun_eligible() {
                self.engine.add_rerun(entity.clone());
            }
        }

        Ok(entities)
    }

    /// Raises the stop flag. Non-blocking; the flag is checked only at
    /// replication boundaries, so a replication in progress runs to
    /// completion.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        logging::log("HARNESS", "stop requested");
    }

    pub fn pause(&self) -> Result<(), HarnessError> {
        if !self.is_running() {
            return Err(HarnessError::NotRunning);
        }
        self.engine.pause();
        Ok(())
    }

    pub fn resume(&self) -> Result<(), HarnessError> {
        if !self.is_running() {
            return Err(HarnessError::NotRunning);
        }
        self.engine.resume();
        Ok(())
    }

    /// Clears accumulated statistics, retained replication data, and the
    /// report artifact path, returning the harness to pristine `Idle`.
    /// Valid from any non-running state.
    pub async fn reset(&self) -> Result<(), HarnessError> {
        if self.is_running() {
            return Err(HarnessError::RunInProgress);
        }
        self.aggregator.lock().await.reset_all().await;
        self.current_replication.store(0, Ordering::SeqCst);
        *self.analyst_report.lock().unwrap() = None;
        *self.last_error.lock().unwrap() = None;
        self.state.send_replace(RunState::Idle);
        logging::log("HARNESS", "reset to pristine state");
        Ok(())
    }

    /// Waits for the worker task of the current run to finish.
    pub async fn wait(&self) {
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        *self.state.borrow() == RunState::Running
    }

    pub fn run_state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Property-change-style state notifications for the caller.
    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Index of the replication currently executing (or, after a run, the
    /// number of completed replications).
    pub fn current_replication(&self) -> usize {
        self.current_replication.load(Ordering::SeqCst)
    }

    /// Path of the generated analyst-report artifact, absent if disabled or
    /// if artifact creation failed.
    pub fn analyst_report_path(&self) -> Option<PathBuf> {
        self.analyst_report.lock().unwrap().clone()
    }

    /// Cause of the last setup fault, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    /// Redirects all textual report output to the supplied sink.
    pub async fn set_output(&self, sink: OutputSink) {
        *self.output.lock().await = sink;
    }

    pub fn registry(&self) -> &AssemblyRegistry {
        &self.registry
    }

    pub fn aggregator(&self) -> Arc<Mutex<StatsAggregator>> {
        self.aggregator.clone()
    }

    pub fn config(&self) -> RunConfig {
        self.config.lock().unwrap().clone()
    }

    fn mutate_config(
        &self,
        mutate: impl FnOnce(&mut RunConfig) -> Result<(), ConfigError>,
    ) -> Result<(), HarnessError> {
        if self.is_running() {
            return Err(HarnessError::RunInProgress);
        }
        let mut config = self.config.lock().unwrap();
        mutate(&mut config)?;
        Ok(())
    }

    pub fn set_number_of_replications(&self, n: usize) -> Result<(), HarnessError> {
        self.mutate_config(|c| c.set_number_of_replications(n))
    }

    pub fn set_stop_time(&self, stop_time: f64) -> Result<(), HarnessError> {
        self.mutate_config(|c| c.set_stop_time(stop_time))
    }

    pub fn set_verbose(&self, verbose: bool) -> Result<(), HarnessError> {
        self.mutate_config(|c| {
            c.set_verbose(verbose);
            Ok(())
        })
    }

    pub fn set_verbose_replication(&self, index: usize) -> Result<(), HarnessError> {
        self.mutate_config(|c| {
            c.set_verbose_replication(index);
            Ok(())
        })
    }

    pub fn set_single_step(&self, single_step: bool) -> Result<(), HarnessError> {
        self.mutate_config(|c| {
            c.set_single_step(single_step);
            Ok(())
        })
    }

    pub fn set_print_replication_reports(&self, print: bool) -> Result<(), HarnessError> {
        self.mutate_config(|c| {
            c.set_print_replication_reports(print);
            Ok(())
        })
    }

    pub fn set_print_summary_report(&self, print: bool) -> Result<(), HarnessError> {
        self.mutate_config(|c| {
            c.set_print_summary_report(print);
            Ok(())
        })
    }

    pub fn set_save_replication_data(&self, save: bool) -> Result<(), HarnessError> {
        self.mutate_config(|c| {
            c.set_save_replication_data(save);
            Ok(())
        })
    }

    pub fn set_analyst_report(&self, enabled: bool) -> Result<(), HarnessError> {
        self.mutate_config(|c| {
            c.set_analyst_report(enabled);
            Ok(())
        })
    }

    pub fn set_report_dir(&self, dir: Option<&Path>) -> Result<(), HarnessError> {
        self.mutate_config(|c| {
            c.set_report_dir(dir.map(PathBuf::from));
            Ok(())
        })
    }
}
