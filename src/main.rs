use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::GlobalArgs;

mod commands;
mod output;

use commands::{archive, build, deploy, install, list, rollback};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "cooly")]
#[command(version = VERSION)]
#[command(about = "Archive, build and install Python projects across hosts")]
struct Cli {
    /// YAML configuration file with archive, build, install and defaults sections
    #[arg(short, long, global = true, env = "COOLY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot a repository revision into a package archive
    Archive(archive::ArchiveArgs),
    /// Turn a package archive into a distribution
    Build(build::BuildArgs),
    /// Install a distribution on every host and switch `current`
    Install(install::InstallArgs),
    /// Archive, build and install in one go
    Deploy(deploy::DeployArgs),
    /// Show installed versions and their aliases
    List(list::ListArgs),
    /// Point `current` back at an installed version
    Rollback(rollback::RollbackArgs),
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("COOLY_LOG")
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> std::process::ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let global = GlobalArgs { config: cli.config };

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    if let Err(err) = output::print_json_result(json_result) {
        tracing::error!(code = err.code.as_str(), "{}", err.message);
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
