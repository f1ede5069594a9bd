use assembly_harness::entity::{ArrivalProcess, EventMonitor, LogObserver, SimEntityRef};
use assembly_harness::engine::VirtualClockEngine;
use assembly_harness::types::{ConnectionKind, RunState, StatisticKind, StatisticTier};
use assembly_harness::{AssemblyHarness, AssemblyRegistry, RunConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Demo assembly: a Poisson arrival process feeding an event monitor, with
/// per-replication and design-point statistics over the arrival count and
/// a log observer narrating interarrival draws.
fn build_registry() -> AssemblyRegistry {
    let mut registry = AssemblyRegistry::new();

    registry.add_entity(
        "arrivals",
        Box::new(|| Ok(SimEntityRef::new(ArrivalProcess::new("arrivals", 2.0, 42)))),
    );
    registry.add_entity(
        "monitor",
        Box::new(|| Ok(SimEntityRef::new(EventMonitor::new("monitor")))),
    );

    registry.add_statistic(StatisticTier::Replication, "arrivals.count", StatisticKind::Count);
    registry.add_statistic(
        StatisticTier::Replication,
        "arrivals.interarrival",
        StatisticKind::Mean,
    );
    registry.add_statistic(StatisticTier::DesignPoint, "arrivals", StatisticKind::Count);
    registry.add_statistic(StatisticTier::DesignPoint, "interarrival", StatisticKind::Mean);

    registry.add_observer("log", Arc::new(LogObserver::new("log")));

    registry.add_connection(ConnectionKind::EventListener, "monitor", None, "arrivals");
    registry.add_connection(
        ConnectionKind::ReplicationStat,
        "arrivals.count",
        Some("count"),
        "arrivals",
    );
    registry.add_connection(
        ConnectionKind::ReplicationStat,
        "arrivals.interarrival",
        Some("interarrival"),
        "arrivals",
    );
    registry.add_connection(ConnectionKind::DesignPointStat, "arrivals", None, "arrivals.count");
    registry.add_connection(
        ConnectionKind::DesignPointStat,
        "interarrival",
        None,
        "arrivals.interarrival",
    );
    registry.add_connection(
        ConnectionKind::Observer,
        "log",
        Some("interarrival"),
        "arrivals",
    );

    registry
}

fn load_config() -> Result<RunConfig, anyhow::Error> {
    match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!("loading run configuration from {}", path);
            Ok(RunConfig::load(Path::new(&path))?)
        }
        None => {
            let mut config = RunConfig::default();
            config.set_number_of_replications(10)?;
            config.set_stop_time(100.0)?;
            config.set_save_replication_data(true);
            config.set_analyst_report(true);
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    assembly_harness::utils::logging::init_logging();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    let replications = config.number_of_replications();

    let engine = Arc::new(VirtualClockEngine::new());
    let harness = AssemblyHarness::with_config(build_registry(), engine, config);

    let progress = ProgressBar::new(replications as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} replications")?
            .progress_chars("#>-"),
    );

    let mut states = harness.subscribe_state();
    harness.start().await?;

    // Tick the bar off the replication counter until the run leaves Running.
    while *states.borrow_and_update() == RunState::Running {
        progress.set_position(harness.current_replication() as u64);
        tokio::select! {
            _ = states.changed() => {}
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    }
    harness.wait().await;
    progress.set_position(harness.current_replication() as u64);
    progress.finish();

    tracing::info!(
        "run finished: {} replications, final state {}",
        harness.current_replication(),
        harness.run_state()
    );
    if let Some(path) = harness.analyst_report_path() {
        println!("analyst report: {}", path.display());
    }
    Ok(())
}
