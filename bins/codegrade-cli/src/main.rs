mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codegrade-cli")]
#[command(about = "Codegrade CLI - Evaluate submissions against reference programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Inputs shared by `evaluate` and `submit`
#[derive(Args, Debug, Clone)]
pub struct SubmissionArgs {
    /// Language identifier (e.g., java, c, cpp)
    #[arg(short, long)]
    pub language: String,

    /// Instructor reference program
    #[arg(short, long)]
    pub reference: PathBuf,

    /// Student source file
    #[arg(short, long)]
    pub submission: PathBuf,

    /// Per-process timeout in milliseconds
    #[arg(short, long)]
    pub timeout_ms: Option<u64>,

    /// File piped to the reference program's stdin
    #[arg(long)]
    pub stdin: Option<PathBuf>,

    /// Tighter limit for the run stage only
    #[arg(long)]
    pub time_limit_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a submission on this machine
    Evaluate {
        #[command(flatten)]
        input: SubmissionArgs,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// List registered languages
    Languages,

    /// Queue a submission for a worker
    Submit {
        #[command(flatten)]
        input: SubmissionArgs,

        /// Wait for the result (seconds, 0 = do not wait)
        #[arg(short, long, default_value = "0")]
        wait: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let passed = match cli.command {
        Commands::Evaluate { input, json } => commands::evaluate(&input, json).await?,
        Commands::Languages => {
            commands::list_languages();
            true
        }
        Commands::Submit { input, wait } => commands::submit(&input, wait).await?,
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}
