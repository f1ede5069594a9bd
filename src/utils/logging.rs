use once_cell::sync::Lazy;
use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

static ENABLE_LOGGING: AtomicBool = AtomicBool::new(false);
static LOG_TO_FILE: AtomicBool = AtomicBool::new(false);
static LOG_FILE: Lazy<Mutex<Option<std::fs::File>>> = Lazy::new(|| Mutex::new(None));

/// Initializes run narration logging based on environment variables:
/// - ASSEMBLY_LOGGING: enables/disables logging (true/false)
/// - ASSEMBLY_LOG_TO_FILE: routes logs to a file instead of stdout (true/false)
/// - ASSEMBLY_LOG_FILE: path of the log file (default: assembly.log)
///
/// To enable logging in tests, run: ASSEMBLY_LOGGING=true cargo test -- --nocapture
pub fn init_logging() {
    match env::var("ASSEMBLY_LOGGING") {
        Ok(value) => match value.as_str() {
            "true" => {
                ENABLE_LOGGING.store(true, Ordering::SeqCst);
                if env::var("ASSEMBLY_LOG_TO_FILE").unwrap_or_else(|_| "false".to_string()) == "true" {
                    LOG_TO_FILE.store(true, Ordering::SeqCst);
                    let path = env::var("ASSEMBLY_LOG_FILE").unwrap_or_else(|_| "assembly.log".to_string());
                    match OpenOptions::new().create(true).append(true).open(&path) {
                        Ok(file) => *LOG_FILE.lock().unwrap() = Some(file),
                        Err(e) => {
                            eprintln!("Failed to open log file {}: {}", path, e);
                            LOG_TO_FILE.store(false, Ordering::SeqCst);
                        }
                    }
                }
            }
            "false" => ENABLE_LOGGING.store(false, Ordering::SeqCst),
            _ => panic!("\nError: ASSEMBLY_LOGGING environment variable must be 'true' or 'false'\n\nTo run the program, use one of:\n  ASSEMBLY_LOGGING=true cargo run\n  ASSEMBLY_LOGGING=false cargo run\n"),
        },
        Err(_) => ENABLE_LOGGING.store(false, Ordering::SeqCst),
    }
}

pub fn log(prefix: &str, message: &str) {
    if !ENABLE_LOGGING.load(Ordering::SeqCst) {
        return;
    }
    if LOG_TO_FILE.load(Ordering::SeqCst) {
        if let Some(file) = LOG_FILE.lock().unwrap().as_mut() {
            let _ = writeln!(file, "  [{}]   {}", prefix, message);
            return;
        }
    }
    println!("  [{}]   {}", prefix, message);
}
