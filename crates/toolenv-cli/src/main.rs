use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

mod completion;
mod dispatch;
mod render;

use completion::CliCompletionShell;
use dispatch::run_cli;

const LOG_ENV: &str = "TOOLENV_LOG";

#[derive(Parser, Debug)]
#[command(name = "toolenv")]
#[command(about = "Resolve tool requirements into activatable environments", long_about = None)]
struct Cli {
    /// Application configuration file (defaults to ~/.toolenv/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the shell commands activating the given requirements.
    ShellCommands {
        #[command(flatten)]
        requirements: RequirementArgs,
        #[command(flatten)]
        resolve: ResolveArgs,
    },
    /// Print the dependency each requirement resolves to, as JSON.
    Resolve {
        #[command(flatten)]
        requirements: RequirementArgs,
        #[command(flatten)]
        resolve: ResolveArgs,
    },
    /// Materialize the cached environment for the given requirements.
    BuildCache {
        #[command(flatten)]
        requirements: RequirementArgs,
        #[command(flatten)]
        resolve: ResolveArgs,
        #[arg(long)]
        force_rebuild: bool,
    },
    /// Resolve a single requirement and print its summary as JSON.
    Find {
        name: String,
        #[arg(long)]
        version: Option<String>,
        #[arg(long = "type", default_value = "package")]
        requirement_type: String,
        #[command(flatten)]
        resolve: ResolveArgs,
    },
    /// List the configured resolver chain.
    Resolvers,
    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

#[derive(Args, Debug, Default, Clone)]
struct RequirementArgs {
    /// Requirement as `name[@version][:type]`; repeatable.
    #[arg(short = 'r', long = "requirement", value_name = "REQUIREMENT")]
    requirements: Vec<String>,
    /// TOML file with `[[requirements]]` entries.
    #[arg(long)]
    requirements_file: Option<PathBuf>,
    /// Container the tool declares, as `type:identifier`; repeatable.
    #[arg(long = "container", value_name = "TYPE:IDENTIFIER")]
    containers: Vec<String>,
}

#[derive(Args, Debug, Default, Clone)]
struct ResolveArgs {
    /// Only consult the resolver at this chain position.
    #[arg(long)]
    index: Option<usize>,
    /// Only consult resolvers of this type.
    #[arg(long)]
    resolver_type: Option<String>,
    /// Ignore answers that do not match the requested version exactly.
    #[arg(long)]
    exact: bool,
    /// Allow resolvers that install or build.
    #[arg(long)]
    install: bool,
    /// Allow container resolvers that query remote registries.
    #[arg(long)]
    search: bool,
    /// Report unresolved requirements too.
    #[arg(long)]
    return_null: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let stdout = io::stdout();
    run_cli(cli, &mut stdout.lock())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .try_init();
}

#[cfg(test)]
mod tests;
