use anyhow::Context;
use clap::Parser;
use pivot_coverage::config::toml_config::TomlConfig;
use pivot_coverage::core::{analysis, ConfigProvider};
use pivot_coverage::utils::error::{CoverageError, ErrorCategory};
use pivot_coverage::utils::{logger, validation::Validate};
use pivot_coverage::{AnalysisResponse, CliConfig, CloudRfClient, CoverageAnalyzer, LocalStorage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliConfig::parse();

    // 初始化日誌
    if args.log_json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting pivot-coverage");
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
    }

    if let Err(e) = args.validate() {
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    // 載入並驗證配置
    let config = match args.load_config().and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(exit_code(&e));
        }
    };

    display_config_summary(&config, &args);

    let archive_bytes = std::fs::read(&args.archive)
        .with_context(|| format!("Failed to read archive '{}'", args.archive.display()))?;

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - propagation service will not be called");
        // 乾跑不需要 API key，這裡直接用解析器
        let parser = analysis::parser_from_config(&config);
        return match analysis::inspect(&parser, config.workspace_root(), &archive_bytes) {
            Ok(parsed) => {
                println!("{}", serde_json::to_string_pretty(&parsed)?);
                Ok(())
            }
            Err(e) => fail(&e),
        };
    }

    if !config.has_api_key() {
        tracing::warn!("⚠️ No API key configured; the propagation service may reject the request");
    }
    if args.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let source = args.source_name();
    let storage = LocalStorage::new(config.output_path());
    let client = match CloudRfClient::new(config.service.clone(), config.radio.clone()) {
        Ok(client) => client,
        Err(e) => fail(&e),
    };
    let analyzer =
        CoverageAnalyzer::from_config(client, storage, config).with_monitoring(args.monitor);

    let response = analyzer.respond(&archive_bytes, &source).await;
    println!("{}", response.to_json()?);

    match response {
        AnalysisResponse::Success(report) => {
            tracing::info!(
                "✅ {} of {} devices outside coverage",
                report.outside_coverage.len(),
                report.devices.len()
            );
            Ok(())
        }
        AnalysisResponse::Failure { status, body } => {
            eprintln!("❌ {} ({}): {}", body.error, status, body.detail);
            std::process::exit(exit_code_for_status(status));
        }
    }
}

fn display_config_summary(config: &TomlConfig, args: &CliConfig) {
    eprintln!("📋 Configuration Summary:");
    eprintln!("  Archive: {}", args.archive.display());
    eprintln!("  Service: {}", config.service.endpoint);
    eprintln!("  Policy: {}", config.classification.policy.as_str());
    eprintln!("  Output: {}", config.output_path());
    eprintln!("  Formats: {}", config.output.formats.join(", "));
    if args.dry_run {
        eprintln!("  🔍 DRY RUN MODE ENABLED");
    }
    eprintln!();
}

fn fail(e: &CoverageError) -> ! {
    if let Ok(json) = AnalysisResponse::failure(e).to_json() {
        println!("{}", json);
    }
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());
    std::process::exit(exit_code(e));
}

// 1 = 輸入錯誤，2 = 上游或對位錯誤，3 = 內部錯誤
fn exit_code(e: &CoverageError) -> i32 {
    match e.category() {
        ErrorCategory::Input => 1,
        ErrorCategory::Upstream | ErrorCategory::Georeference => 2,
        _ => 3,
    }
}

fn exit_code_for_status(status: u16) -> i32 {
    match status {
        400..=499 => 1,
        502 => 2,
        _ => 3,
    }
}
