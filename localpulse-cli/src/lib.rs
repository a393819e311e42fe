pub mod commands;
pub mod config;
pub mod report;

pub use commands::{run_load, LoadSettings, LoadSummary};
