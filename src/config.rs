use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Run configuration for the replication harness.
///
/// All values are validated synchronously at the setter (or on load), never
/// at run time. Fields are mutable before a run starts and read-only once a
/// run is in progress; the harness enforces the latter.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Number of replications to execute (at least 1).
    #[serde(default = "default_replications")]
    number_of_replications: usize,
    /// Virtual-time stop condition for each replication (non-negative).
    #[serde(default)]
    stop_time: f64,
    /// Global engine verbosity for every replication.
    #[serde(default)]
    verbose: bool,
    /// 1-based index of a single replication to run verbosely; 0 disables.
    #[serde(default)]
    verbose_replication: usize,
    #[serde(default)]
    single_step: bool,
    #[serde(default = "default_true")]
    print_replication_reports: bool,
    #[serde(default = "default_true")]
    print_summary_report: bool,
    /// Retain a raw snapshot of every per-replication collector per
    /// replication.
    #[serde(default)]
    save_replication_data: bool,
    /// Materialize the analyst-report artifact at the end of the run.
    #[serde(default)]
    analyst_report: bool,
    /// Directory for the analyst-report artifact; system temp dir if unset.
    #[serde(default)]
    report_dir: Option<PathBuf>,
}

fn default_replications() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            number_of_replications: 1,
            stop_time: 0.0,
            verbose: false,
            verbose_replication: 0,
            single_step: false,
            print_replication_reports: true,
            print_summary_report: true,
            save_replication_data: false,
            analyst_report: false,
            report_dir: None,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path)?;
        let config: RunConfig = toml::from_str(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.number_of_replications == 0 {
            return Err(ConfigError::ValidationError(
                "Number of replications must be at least 1".into(),
            ));
        }
        if !self.stop_time.is_finite() || self.stop_time < 0.0 {
            return Err(ConfigError::ValidationError(
                "Stop time must be a non-negative finite number".into(),
            ));
        }
        Ok(())
    }

    pub fn number_of_replications(&self) -> usize {
        self.number_of_replications
    }

    pub fn set_number_of_replications(&mut self, n: usize) -> Result<(), ConfigError> {
        if n == 0 {
            return Err(ConfigError::ValidationError(
                "Number of replications must be at least 1".into(),
            ));
        }
        self.number_of_replications = n;
        Ok(())
    }

    pub fn stop_time(&self) -> f64 {
        self.stop_time
    }

    pub fn set_stop_time(&mut self, stop_time: f64) -> Result<(), ConfigError> {
        if !stop_time.is_finite() || stop_time < 0.0 {
            return Err(ConfigError::ValidationError(
                "Stop time must be a non-negative finite number".into(),
            ));
        }
        self.stop_time = stop_time;
        Ok(())
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn verbose_replication(&self) -> usize {
        self.verbose_replication
    }

    /// 1-based replication index to mark verbose; 0 disables the marking.
    pub fn set_verbose_replication(&mut self, index: usize) {
        self.verbose_replication = index;
    }

    pub fn single_step(&self) -> bool {
        self.single_step
    }

    pub fn set_single_step(&mut self, single_step: bool) {
        self.single_step = single_step;
    }

    pub fn print_replication_reports(&self) -> bool {
        self.print_replication_reports
    }

    pub fn set_print_replication_reports(&mut self, print: bool) {
        self.print_replication_reports = print;
    }

    pub fn print_summary_report(&self) -> bool {
        self.print_summary_report
    }

    pub fn set_print_summary_report(&mut self, print: bool) {
        self.print_summary_report = print;
    }

    pub fn save_replication_data(&self) -> bool {
        self.save_replication_data
    }

    pub fn set_save_replication_data(&mut self, save: bool) {
        self.save_replication_data = save;
    }

    pub fn analyst_report(&self) -> bool {
        self.analyst_report
    }

    pub fn set_analyst_report(&mut self, enabled: bool) {
        self.analyst_report = enabled;
    }

    pub fn report_dir(&self) -> Option<&Path> {
        self.report_dir.as_deref()
    }

    pub fn set_report_dir(&mut self, dir: Option<PathBuf>) {
        self.report_dir = dir;
    }
}
