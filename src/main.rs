use clap::Parser;
use fo_scanner::utils::error::{ErrorSeverity, ScanError};
use fo_scanner::utils::{logger, validation::Validate};
use fo_scanner::{server, CliArgs, TomlConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // 載入 TOML 配置
    let config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(exit_code(&e));
        }
    };

    // 初始化日誌
    logger::init_logger(args.verbose || config.verbose(), config.json_logs());
    tracing::info!("🚀 Starting fo-scanner");
    tracing::info!("📁 Configuration loaded from: {}", args.config);

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e);
        std::process::exit(exit_code(&e));
    }

    tracing::info!(
        "✅ Configuration valid: {} scanners, price range {}-{}, top {}",
        config.queries().len(),
        config.filter.min_price,
        config.filter.max_price,
        config.top_n()
    );

    if args.check {
        println!("✅ Configuration '{}' is valid", args.config);
        return Ok(());
    }

    if let Err(e) = server::serve(&config).await {
        tracing::error!("❌ Server failed: {} (Severity: {:?})", e, e.severity());
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e);
        std::process::exit(exit_code(&e));
    }

    Ok(())
}

/// 根據錯誤嚴重程度決定退出碼
fn exit_code(e: &ScanError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}
