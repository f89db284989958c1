use clap::Parser;
use tracing_subscriber::EnvFilter;

use viability::api::{Cli, Command, ServerConfig, run_analyze, run_http_server, run_simulate};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve { port } => {
            if let Err(e) = run_http_server(ServerConfig::from_env(port)).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
            return;
        }
        Command::Analyze(args) => run_analyze(args),
        Command::Simulate(args) => tokio::task::block_in_place(|| run_simulate(args)),
    };

    match result {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
