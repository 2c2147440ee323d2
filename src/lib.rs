pub mod config;
pub mod deps;
pub mod imports;
pub mod plan;
pub mod report;
pub mod runner;
pub mod suite;
pub mod utils;
pub mod verify;

pub use config::SuiteConfig;
pub use deps::{Aligner, Tool, Toolchain};
pub use plan::{Step, StepKind};
pub use report::RunReport;
