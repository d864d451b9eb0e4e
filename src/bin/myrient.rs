//! myrient - browse the Redump index on Myrient and download titles.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::env;
use std::process::ExitCode;

use env_logger::Env;
use myrient_dl::AppConfig;

fn print_usage() {
    eprintln!("Usage: myrient [OPTIONS]");
    eprintln!();
    eprintln!("Interactive browser and downloader for the Myrient Redump index.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <FILE>  Read settings from FILE");
    eprintln!("  -h, --help           Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  MYRIENT_DOWNLOADS_PATH  Download directory (default: ./.downloads)");
    eprintln!("  MYRIENT_CONFIG          Config file path");
    eprintln!("  RUST_LOG                Log filter (default: warn)");
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp_secs()
        .init();

    let mut config_path = None;
    let args: Vec<String> = env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            "-c" | "--config" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    eprintln!("Error: --config requires a value");
                    return ExitCode::FAILURE;
                };
                config_path = Some(std::path::PathBuf::from(path));
            }
            other => {
                eprintln!("Error: unknown argument '{other}'");
                print_usage();
                return ExitCode::FAILURE;
            }
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => AppConfig::load_from(&path),
        None => AppConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    log::debug!("Using download directory {}", config.paths.download_dir.display());

    match myrient_dl::cli::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error [{}]: {e}", e.kind());
            ExitCode::FAILURE
        }
    }
}
