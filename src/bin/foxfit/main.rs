use clap::Parser;
use env_logger::Env;
use log::info;
use std::path::Path;

mod analysis;
mod cli;

fn main() {
    let args = cli::Cli::parse();
    // Set up logging level
    let filter = match args.verbosity {
        cli::LogLevel::Silent => "off",
        cli::LogLevel::Normal => "info",
        cli::LogLevel::Verbose => "debug",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(filter)).init();

    info!("Running foxfit");
    let out_path = Path::new(&args.out);
    if out_path.exists() {
        eprintln!("Error: output directory already exists: {}", args.out);
        std::process::exit(1);
    }
    if let Err(e) = std::fs::create_dir(out_path) {
        eprintln!("Error: could not create output directory {}: {}", args.out, e);
        std::process::exit(1);
    }
    info!("Created output directory");

    analysis::foxfit(&args).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
}
