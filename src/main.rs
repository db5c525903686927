use clap::Parser;
use crewgrid::cli::commands::{Cli, Commands};
use crewgrid::cli::handlers;
use tracing_subscriber::EnvFilter;

/// Log to stderr; `CREWGRID_LOG` (or `RUST_LOG`) sets the filter
fn init_tracing() {
    let filter = std::env::var("CREWGRID_LOG")
        .ok()
        .and_then(|s| EnvFilter::try_new(s).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init(args) => {
            // Init is handled before project discovery
            handlers::cmd_init(args, cli.project_dir.as_deref())
        }
        _ => handlers::dispatch(cli),
    };
    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
