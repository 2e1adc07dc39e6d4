//! push-receiver CLI - push notification session worker.
//!
//! `serve` is what a desktop host spawns: stdin carries requests, stdout
//! carries signals. Logs never go to stdout.

use anyhow::Result;
use clap::{Parser, Subcommand};
use push_receiver::{commands, Config};

#[derive(Parser)]
#[command(name = "push-receiver")]
#[command(version)]
#[command(about = "Push notification session worker for desktop hosts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the session worker with stdin/stdout as the host channel
    Serve,
    /// Show the stored session (token is redacted)
    Status,
    /// Clear stored credentials, sender id and persistent ids
    Reset {
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

/// Log to `PUSH_RECEIVER_LOG_FILE` or `{config_dir}/push-receiver.log`, else stderr.
fn init_logging() {
    let log_path = if let Ok(path) = std::env::var("PUSH_RECEIVER_LOG_FILE") {
        Some(std::path::PathBuf::from(path))
    } else {
        Config::config_dir()
            .ok()
            .map(|dir| dir.join("push-receiver.log"))
    };

    let environment = push_receiver::env::Environment::current();
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(environment.default_log_filter()),
    );
    builder.format_timestamp_secs();

    match log_path.map(std::fs::File::create) {
        Some(Ok(file)) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        Some(Err(e)) => {
            eprintln!("Warning: could not open log file ({e}), logging to stderr");
            builder.target(env_logger::Target::Stderr);
        }
        None => {
            builder.target(env_logger::Target::Stderr);
        }
    }

    builder.init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;
    log::info!(
        "push-receiver v{} ({})",
        env!("CARGO_PKG_VERSION"),
        push_receiver::env::Environment::current()
    );

    match cli.command {
        Commands::Serve => commands::serve::run(&config).await?,
        Commands::Status => commands::status::run(&config)?,
        Commands::Reset { yes } => commands::reset::run(&config, yes)?,
    }

    Ok(())
}
