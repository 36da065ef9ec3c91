use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod build;
mod commands;
mod config;
mod tasks;
mod util;

#[derive(Parser)]
#[command(version, about)]
struct Args {
    #[command(flatten)]
    global: GlobalArgs,

    /// The command to execute
    #[command(subcommand)]
    command: PipewrightCommand,
}

#[derive(Parser)]
struct GlobalArgs {
    /// The path to the configuration file
    #[arg(short, long, global = true, default_value = "pipewright.yaml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
struct InitArgs {
    /// The path to initialize the project in
    path: PathBuf,

    /// Whether to create the directory if it doesn't exist
    #[arg(long, default_value = "false")]
    create: bool,
}

#[derive(Parser)]
struct BuildArgs {
    /// Build for production (minified, inlined, no source maps)
    #[arg(short, long, default_value = "false")]
    production: bool,
}

#[derive(Parser)]
struct RunArgs {
    /// The task to run
    task: String,

    /// Build for production (minified, inlined, no source maps)
    #[arg(short, long, default_value = "false")]
    production: bool,
}

#[derive(Parser)]
struct WatchArgs {
    /// Open the development server in the default browser
    #[arg(short, long, default_value = "false")]
    open: bool,
}

#[derive(Parser)]
struct CleanArgs {
    /// Only print what would be deleted
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

#[derive(Subcommand)]
enum PipewrightCommand {
    /// Write a default pipewright.yaml
    Init(InitArgs),

    /// Run the `build` task
    Build(BuildArgs),

    /// Run a single registered task
    Run(RunArgs),

    /// Build for development, serve the public directory and rebuild on change
    Watch(WatchArgs),

    /// Delete the configured output directories
    Clean(CleanArgs),

    /// List the registered tasks
    Tasks,
}

fn init_tracing(global: &GlobalArgs) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match global.verbose {
        0 => "pipewright=info",
        1 => "pipewright=debug",
        _ => "pipewright=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match global.log_format {
        LogFormat::Text => fmt().with_env_filter(env_filter).with_target(false).init(),
        LogFormat::Json => fmt().json().with_env_filter(env_filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_tracing(&args.global);

    match args.command {
        PipewrightCommand::Init(cmd) => {
            commands::init::run(&cmd).await?;
        }
        PipewrightCommand::Build(cmd) => {
            commands::build::run(&args.global, &cmd).await?;
        }
        PipewrightCommand::Run(cmd) => {
            commands::run::run(&args.global, &cmd).await?;
        }
        PipewrightCommand::Watch(cmd) => {
            commands::watch::run(&args.global, &cmd).await?;
        }
        PipewrightCommand::Clean(cmd) => {
            commands::clean::run(&args.global, &cmd).await?;
        }
        PipewrightCommand::Tasks => {
            commands::tasks::run(&args.global).await?;
        }
    }

    Ok(())
}
