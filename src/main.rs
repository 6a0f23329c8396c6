use clap::Parser;
use barreplay::cli::{run, Cli};
use barreplay::logging::{init_logging, LogConfig};

fn main() -> std::process::ExitCode {
    if let Err(e) = init_logging(LogConfig::from_env().with_default_level("warn")) {
        eprintln!("warning: logging unavailable: {e}");
    }
    run(Cli::parse())
}
