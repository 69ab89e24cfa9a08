pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{cli::LocalStorage, toml_config::TomlConfig};

pub use adapters::cloudrf::CloudRfClient;
pub use core::analysis::CoverageAnalyzer;
pub use core::coverage::CoveragePolicy;
pub use core::report::{AnalysisReport, AnalysisResponse};
pub use utils::error::{CoverageError, Result};
