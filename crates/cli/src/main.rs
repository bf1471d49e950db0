mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::builder::FalseyValueParser;
use clap::{Parser, Subcommand};
use pkg_lib::config::Config;
use pkg_lib::engine::Engine;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::cmd::{cmd_build, cmd_files, cmd_install, cmd_list, cmd_uninstall, cmd_version};
use crate::output::{OutputFormat, print_error};

/// pkg - minimal source-based package manager
#[derive(Parser)]
#[command(name = "pkg")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Target root that receives installed files and holds package state
  #[arg(long, global = true, env = "PKG_ROOT", default_value = "/")]
  root: PathBuf,

  /// Export NOTEST=1 to build callbacks
  #[arg(long, global = true, env = "PKG_NOTEST", value_parser = FalseyValueParser::new())]
  no_tests: bool,

  /// Parallelism hint exported to build callbacks as JOBS and MAKEFLAGS
  #[arg(short, long, global = true, env = "PKG_JOBS")]
  jobs: Option<usize>,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short = 'o', long, global = true, value_enum, default_value = "text")]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build packages from descriptor files
  Build {
    /// Descriptor files (`<name>.pkg`), processed in order
    #[arg(required = true)]
    descriptors: Vec<PathBuf>,
  },

  /// Install built packages into the target root
  Install {
    #[arg(required = true)]
    packages: Vec<String>,
  },

  /// Remove installed packages
  Uninstall {
    #[arg(required = true)]
    packages: Vec<String>,
  },

  /// List installed packages
  List,

  /// Show the files recorded for installed packages
  Files {
    #[arg(required = true)]
    packages: Vec<String>,
  },

  /// Show the current built version of packages
  Version {
    #[arg(required = true)]
    packages: Vec<String>,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<()> {
  let config = Config::new(cli.root)
    .with_disable_tests(cli.no_tests)
    .with_jobs(cli.jobs);
  debug!(root = %config.root.display(), disable_tests = config.disable_tests, jobs = ?config.jobs, "configured");
  let engine = Engine::new(config);
  let output = cli.output;

  match cli.command {
    Commands::Build { descriptors } => cmd_build(&engine, &descriptors, output),
    Commands::Install { packages } => cmd_install(&engine, &packages, output),
    Commands::Uninstall { packages } => cmd_uninstall(&engine, &packages, output),
    Commands::List => cmd_list(&engine, output),
    Commands::Files { packages } => cmd_files(&engine, &packages, output),
    Commands::Version { packages } => cmd_version(&engine, &packages, output),
  }
}
