pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use args::CliConfig;

pub const ARCHIVE_EXTENSIONS: [&str; 2] = ["kmz", "kml"];

#[cfg(feature = "cli")]
mod args {
    use super::toml_config::TomlConfig;
    use super::ARCHIVE_EXTENSIONS;
    use crate::core::coverage::CoveragePolicy;
    use crate::utils::error::Result;
    use crate::utils::validation::{validate_file_extensions, Validate};
    use clap::Parser;
    use std::path::PathBuf;

    #[derive(Debug, Clone, Parser)]
    #[command(name = "pivot-coverage")]
    #[command(about = "Find irrigation pivots outside the radio coverage of a farm transmitter")]
    pub struct CliConfig {
        /// KMZ or KML file describing the transmitter, devices and property boundary
        pub archive: PathBuf,

        /// Path to TOML configuration file
        #[arg(short, long)]
        pub config: Option<PathBuf>,

        /// Override output.output_path
        #[arg(short, long)]
        pub output: Option<String>,

        /// Override classification.policy (weak_signal | strong_signal)
        #[arg(long)]
        pub policy: Option<CoveragePolicy>,

        /// Override service.endpoint
        #[arg(long)]
        pub endpoint: Option<String>,

        /// Override service.api_key
        #[arg(long)]
        pub api_key: Option<String>,

        /// Also write analysis.zip with every artifact
        #[arg(long)]
        pub bundle: bool,

        #[arg(short, long, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, help = "Log memory and timing per analysis phase")]
        pub monitor: bool,

        #[arg(long, help = "Emit logs as JSON lines")]
        pub log_json: bool,

        /// Parse the archive and print what was found without calling the propagation service
        #[arg(long)]
        pub dry_run: bool,
    }

    impl CliConfig {
        pub fn source_name(&self) -> String {
            self.archive
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.archive.display().to_string())
        }

        /// 載入 TOML（未指定時用預設值），再套用命令列覆蓋
        pub fn load_config(&self) -> Result<TomlConfig> {
            let mut config = match &self.config {
                Some(path) => {
                    tracing::info!("📁 Loading configuration from: {}", path.display());
                    TomlConfig::from_file(path)?
                }
                None => TomlConfig::default(),
            };
            self.apply_overrides(&mut config);
            Ok(config)
        }

        pub fn apply_overrides(&self, config: &mut TomlConfig) {
            if let Some(output) = &self.output {
                config.output.output_path = output.clone();
            }
            if let Some(policy) = self.policy {
                tracing::info!("🔧 Coverage policy overridden to: {}", policy.as_str());
                config.classification.policy = policy;
            }
            if let Some(endpoint) = &self.endpoint {
                config.service.endpoint = endpoint.clone();
            }
            if let Some(api_key) = &self.api_key {
                config.service.api_key = api_key.clone();
            }
            if self.bundle {
                config.output.bundle = true;
            }
        }
    }

    impl Validate for CliConfig {
        fn validate(&self) -> Result<()> {
            validate_file_extensions(
                "archive",
                &[self.archive.display().to_string()],
                &ARCHIVE_EXTENSIONS,
            )
        }
    }

}
