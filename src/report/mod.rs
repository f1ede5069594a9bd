use crate::stats::StatSnapshot;
use crate::utils::logging;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Materializes the analyst-report artifact: a JSON document holding the
/// design-point summary rows and, when retained, the ordered per-replication
/// raw rows keyed by collector name. Returns the artifact path.
///
/// The exact downstream schema is owned by the report-model collaborator;
/// the harness's obligation is only the name-to-snapshot mapping in
/// registration order, which the row arrays preserve.
pub fn write_analyst_report(
    dir: Option<&Path>,
    replications: usize,
    seeds: &[u64],
    summary: &[StatSnapshot],
    raw: Option<&Vec<Vec<StatSnapshot>>>,
) -> Result<PathBuf, ReportError> {
    let stamp = Local::now().format("%Y%m%d-%H%M%S%.3f");
    let dir = dir.map(PathBuf::from).unwrap_or_else(std::env::temp_dir);
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("analyst-report-{}.json", stamp));

    let replication_data: Vec<serde_json::Value> = raw
        .map(|per_collector| {
            per_collector
                .iter()
                .filter(|rows| !rows.is_empty())
                .map(|rows| {
                    serde_json::json!({
                        "name": rows[0].name,
                        "rows": rows,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let document = serde_json::json!({
        "generated": Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        "replications": replications,
        "seeds": seeds,
        "design_point_summary": summary,
        "replication_data": replication_data,
    });

    fs::write(&path, serde_json::to_string_pretty(&document)?)?;
    logging::log("REPORT", &format!("wrote analyst report to {}", path.display()));
    Ok(path)
}
