use clap::Parser;
use demo_service::core::launch::wait_for_shutdown_signal;
use demo_service::utils::{logger, validation::Validate};
use demo_service::{default_registry, LaunchConfig, Launcher};

#[tokio::main]
async fn main() {
    let config = LaunchConfig::parse();

    if let Err(e) = logger::init_service_logger(config.verbose, Some(&config.log_file)) {
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }

    tracing::info!("Starting demo-service");
    if config.verbose {
        tracing::debug!("Launch config: {:?}", config);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }

    let launcher = Launcher::new(config, default_registry());

    let server = match launcher.bind().await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(
                "❌ Startup failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = server.serve_until(wait_for_shutdown_signal()).await {
        tracing::error!("❌ Server terminated abnormally: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }

    tracing::info!("✅ Shut down cleanly");
}
