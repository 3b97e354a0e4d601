use clap::Parser;
use demo_service::core::launch::wait_for_shutdown_signal;
use demo_service::utils::logger;
use demo_service::{TrafficConfig, TrafficGenerator};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "traffic-generator")]
#[command(about = "Generate steady and burst traffic against the demo service")]
struct Args {
    #[arg(long, default_value = "http://localhost:8000")]
    base_url: String,

    /// Stop after this many cycles instead of running until interrupted
    #[arg(long)]
    cycles: Option<usize>,

    #[arg(long, default_value_t = 2)]
    requests_per_second: usize,

    /// Length of the steady phase of each cycle, in seconds
    #[arg(long, default_value_t = 30)]
    cycle_seconds: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    println!("Demo Service Traffic Generator");
    println!("{}", "=".repeat(40));

    let config = TrafficConfig {
        base_url: args.base_url,
        requests_per_second: args.requests_per_second,
        cycle_duration: Duration::from_secs(args.cycle_seconds),
        ..TrafficConfig::default()
    };

    let generator = match TrafficGenerator::new(config) {
        Ok(generator) => generator,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = generator.wait_until_ready().await {
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }

    let report = generator
        .run_cycles(args.cycles, wait_for_shutdown_signal())
        .await;

    println!(
        "Sent {} requests: {} succeeded, {} failed to connect",
        report.sent,
        report.succeeded(),
        report.errors
    );
    for (status, count) in &report.statuses {
        println!("  {} x{}", status, count);
    }
}
