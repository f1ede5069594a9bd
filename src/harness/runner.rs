use super::OutputSink;
use crate::config::RunConfig;
use crate::engine::{DesEngine, EngineFault};
use crate::entity::SimEntityRef;
use crate::report;
use crate::stats::StatsAggregator;
use crate::types::RunState;
use crate::utils::logging;
use rand::Rng;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{watch, Mutex};

/// Everything the worker task needs, cloned out of the harness so the loop
/// owns its world and the control surface stays non-blocking.
pub(super) struct RunContext {
    pub engine: Arc<dyn DesEngine>,
    pub config: RunConfig,
    pub aggregator: Arc<Mutex<StatsAggregator>>,
    pub entities: Vec<SimEntityRef>,
    pub state: Arc<watch::Sender<RunState>>,
    pub stop_flag: Arc<AtomicBool>,
    pub current_replication: Arc<AtomicUsize>,
    pub output: Arc<Mutex<OutputSink>>,
    pub analyst_report: Arc<StdMutex<Option<PathBuf>>>,
}

/// The replication run loop. Replications execute strictly in index order;
/// the stop flag is the only cancellation primitive and is checked only at
/// replication boundaries.
pub(super) async fn run_replications(ctx: RunContext) {
    let config = &ctx.config;
    let replications = config.number_of_replications();

    ctx.engine.set_stop_time(config.stop_time());
    ctx.engine.set_single_step(config.single_step());
    ctx.engine.set_verbose(config.verbose());

    {
        // Retained rows never leak from one run into the next.
        let mut aggregator = ctx.aggregator.lock().await;
        if config.save_replication_data() {
            aggregator.enable_raw_retention();
        } else {
            aggregator.disable_raw_retention();
        }
    }

    // Seeds are informational: the engine owns the actual randomness.
    let base_seed: u64 = rand::thread_rng().gen();
    let mut seeds = Vec::with_capacity(replications);

    let mut previous_rerun_count = ctx.engine.rerun_entities().len();
    let mut completed = 0usize;
    let mut stopped = false;

    logging::log(
        "HARNESS",
        &format!(
            "=== Starting run: {} replications, stop time {:.4} ===",
            replications,
            config.stop_time()
        ),
    );

    for rep in 0..replications {
        if ctx.stop_flag.load(Ordering::SeqCst) {
            stopped = true;
            logging::log("HARNESS", &format!("stop observed before replication {}", rep + 1));
            break;
        }
        ctx.current_replication.store(rep, Ordering::SeqCst);

        let seed = base_seed.wrapping_add(rep as u64);
        seeds.push(seed);
        logging::log(
            "HARNESS",
            &format!("replication {}/{} (seed {})", rep + 1, replications, seed),
        );

        // One replication may be marked verbose; otherwise the global flag
        // set above stays in force.
        if config.verbose_replication() > 0 {
            ctx.engine.set_verbose(rep + 1 == config.verbose_replication());
        }

        // The eligible set may grow mid-scenario; informational only.
        let rerun_count = ctx.engine.rerun_entities().len();
        if rerun_count != previous_rerun_count {
            logging::log(
                "HARNESS",
                &format!("rerun set changed: {} -> {}", previous_rerun_count, rerun_count),
            );
            previous_rerun_count = rerun_count;
        }

        ctx.aggregator.lock().await.on_replication_start(rep).await;

        match ctx.engine.reset().await {
            Ok(()) => {}
            Err(EngineFault::ConcurrentReset) => {
                recover_from_reset_fault(&ctx).await;
            }
            Err(e) => {
                // Local to this replication: absorbed, never fatal to the run.
                tracing::error!("engine reset failed on replication {}: {}", rep + 1, e);
            }
        }

        if let Err(e) = ctx.engine.start().await {
            tracing::error!("engine failed during replication {}: {}", rep + 1, e);
        }

        ctx.aggregator.lock().await.snapshot_for_design_points().await;

        if config.print_replication_reports() {
            let text = ctx
                .aggregator
                .lock()
                .await
                .format_replication_report(rep)
                .await;
            emit(&ctx, &text).await;
        } else if config.save_replication_data() {
            // Raw-row retention is a side effect of report formatting; keep
            // retaining even when report printing is off.
            let _ = ctx
                .aggregator
                .lock()
                .await
                .format_replication_report(rep)
                .await;
        }

        completed = rep + 1;
    }

    ctx.current_replication.store(completed, Ordering::SeqCst);

    if config.print_summary_report() {
        let text = ctx.aggregator.lock().await.format_summary_report().await;
        emit(&ctx, &text).await;
    }

    if config.analyst_report() {
        let aggregator = ctx.aggregator.lock().await;
        let summary = aggregator.summary_snapshots().await;
        let raw = aggregator.raw_data().cloned();
        match report::write_analyst_report(
            config.report_dir(),
            completed,
            &seeds,
            &summary,
            raw.as_ref(),
        ) {
            Ok(path) => *ctx.analyst_report.lock().unwrap() = Some(path),
            Err(e) => {
                // Degrades to "no report available"; the run result stands.
                tracing::warn!("analyst report not available: {}", e);
                *ctx.analyst_report.lock().unwrap() = None;
            }
        }
    }

    let final_state = if stopped { RunState::StoppedByUser } else { RunState::Idle };
    ctx.state.send_replace(final_state);
    logging::log(
        "HARNESS",
        &format!("=== Run finished: {} of {} replications, state {} ===", completed, replications, final_state),
    );
}

/// Recovers from a concurrent-reset fault: allocate a fresh event list,
/// rebind every entity to it, halt the engine, and rebuild the rerun set
/// from the run-eligible entities. The current replication then proceeds.
async fn recover_from_reset_fault(ctx: &RunContext) {
    tracing::warn!("concurrent reset fault; rebuilding event list");
    let list_id = ctx.engine.new_event_list();
    for entity in &ctx.entities {
        entity.lock().await.core_mut().set_event_list(list_id);
    }
    ctx.engine.stop();
    ctx.engine.clear_rerun();
    for entity in &ctx.entities {
        if entity.lock().await.core().is_rerun_eligible() {
            ctx.engine.add_rerun(entity.clone());
        }
    }
    logging::log("HARNESS", &format!("recovered onto {}", list_id));
}

async fn emit(ctx: &RunContext, text: &str) {
    let mut out = ctx.output.lock().await;
    if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
        tracing::warn!("failed to write report output: {}", e);
    }
}
