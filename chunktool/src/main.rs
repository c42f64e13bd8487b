mod application;
mod presentation {
    pub mod cli;
}

use std::panic::{self, AssertUnwindSafe};
use std::process::ExitCode;

use chunkstore_core::ChunkStoreServices;
use clap::Parser;
use tracing::error;

use presentation::cli::{Cli, normalize_args};

const EXIT_CRASH: u8 = 1;
const EXIT_ARGUMENT: u8 = 2;
const EXIT_TOOL: u8 = 3;

fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    setup_tracing("info");

    let cli = match Cli::try_parse_from(normalize_args(std::env::args())) {
        Ok(c) => c,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_ARGUMENT)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let services = ChunkStoreServices::default();
    match panic::catch_unwind(AssertUnwindSafe(|| application::run(cli, &services))) {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) if e.is_usage_error() => {
            error!(error = %e, "invalid arguments");
            ExitCode::from(EXIT_ARGUMENT)
        }
        Ok(Err(e)) => {
            error!(error = %e, "operation failed");
            ExitCode::from(EXIT_TOOL)
        }
        Err(_) => {
            error!("operation crashed");
            ExitCode::from(EXIT_CRASH)
        }
    }
}
