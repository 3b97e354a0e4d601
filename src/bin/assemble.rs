use clap::Parser;
use demo_service::utils::{logger, validation::Validate};
use demo_service::{Assembler, AssemblyConfig, LayerCache};

#[derive(Parser)]
#[command(name = "assemble")]
#[command(about = "Stage a runnable service image from a build context")]
struct Args {
    /// Path to TOML assembly configuration
    #[arg(short, long, default_value = "assembly.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Ignore the layer cache for this build
    #[arg(long)]
    no_cache: bool,

    /// Print the build steps without executing them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    logger::init_cli_logger(args.verbose);

    tracing::info!("📁 Loading configuration from: {}", args.config);

    let config = match AssemblyConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }

    let plan = config.image_plan();

    if args.dry_run {
        println!("Build steps:");
        for (i, instruction) in plan.instructions().iter().enumerate() {
            println!("  {}. {}", i + 1, instruction);
        }
        println!(
            "CMD demo-service {} --host {} --port {}",
            plan.launch.app, plan.launch.host, plan.launch.port
        );
        return;
    }

    let mut assembler = Assembler::new(plan, config.installer(), config.output_dir());
    match config.cache_dir() {
        Some(dir) if !args.no_cache => {
            tracing::info!("🗄️  Layer cache: {}", dir.display());
            assembler = assembler.with_cache(LayerCache::new(dir));
        }
        _ => tracing::info!("Layer cache disabled"),
    }

    match assembler.assemble().await {
        Ok(report) => {
            for layer in &report.image.layers {
                let marker = if layer.cached { " (cached)" } else { "" };
                println!("  {} {}{}", &layer.key[..12], layer.instruction, marker);
            }
            println!("✅ Image assembled at {}", report.output_dir.display());
        }
        Err(e) => {
            tracing::error!(
                "❌ Assembly failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(e.exit_code());
        }
    }
}
