//! Pipeline Driver
//!
//! Wires the stages together for the command line.
//!
//! ## Pipeline Overview
//!
//! ```text
//! BenchmarkPlan (from versus.toml)
//!       │
//!       ▼
//! ┌─────────────┐
//! │  execution  │  Orchestrator + runner pool, progress bar
//! └──────┬──────┘
//!        │ samples
//!        ▼
//! ┌─────────────┐
//! │  analysis   │  quality → statistics → validation → decision
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ formatting  │  Human-readable output
//! └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`execution`] - Runner pool construction and orchestrated execution
//! - [`analysis`] - Post-execution stages and report assembly
//! - [`formatting`] - Human-readable output formatting
//! - [`metadata`] - System metadata collection

mod analysis;
mod execution;
mod formatting;
mod metadata;

pub use analysis::analyze_samples;
pub use execution::{ProgressObserver, build_pool, execute_plan};
pub use formatting::format_human_output;
pub use metadata::build_report_meta;
