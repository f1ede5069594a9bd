pub mod types;
pub mod entity;
pub mod engine;
pub mod registry;
pub mod stats;
pub mod wiring;
pub mod config;
pub mod report;
pub mod harness;
pub mod utils;

pub use config::RunConfig;
pub use engine::DesEngine;
pub use entity::SimEntity;
pub use harness::AssemblyHarness;
pub use registry::AssemblyRegistry;
pub use types::RunState;
