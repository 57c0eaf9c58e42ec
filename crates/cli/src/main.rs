mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docmatrix_lib::config::{ConfigOverrides, LogLevel};
use docmatrix_lib::consts::DEFAULT_CONFIG_FILE;

use crate::cmd::Toolchain;
use crate::output::{OutputFormat, exit_code, print_error};

/// docmatrix - Build a document set in every language, flavor and format
#[derive(Parser)]
#[command(name = "docmatrix")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path to the build configuration
  #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
  config: PathBuf,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Print machine-readable JSON instead of text
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate the sources, then build every language/flavor/format combination
  Build {
    /// Build only these languages (repeatable)
    #[arg(short, long = "lang", value_name = "LANG")]
    languages: Vec<String>,

    /// Build only these formats (repeatable)
    #[arg(short, long = "format", value_name = "FORMAT")]
    formats: Vec<String>,

    /// Build only these flavors (repeatable)
    #[arg(long = "flavor", value_name = "FLAVOR")]
    flavors: Vec<String>,

    /// Time budget for each build task, e.g. `10m` or `90s`
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
  },

  /// Run the pre-build checks and report every diagnostic
  Validate,

  /// List the registered output formats
  Formats,

  /// Check a finished build tree: Markdown parses, HTML images resolve, DOCX files are intact
  TestArtifacts {
    /// Build tree to check (defaults to the configured output directory)
    #[arg(long)]
    build_dir: Option<PathBuf>,
  },

  /// Archive an existing build tree
  Package {
    /// Build tree to archive (defaults to the configured output directory)
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// Where archives are written (defaults to the configured dist directory)
    #[arg(long)]
    dist_dir: Option<PathBuf>,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  match run(cli) {
    Ok(code) => ExitCode::from(code),
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::from(exit_code(&err))
    }
  }
}

fn run(cli: Cli) -> Result<u8> {
  let output = OutputFormat::from_flag(cli.json);
  let toolchain = Toolchain::system()?;

  match cli.command {
    Commands::Formats => {
      init_tracing(None, cli.verbose);
      cmd::cmd_formats(&toolchain, output)
    }
    Commands::Build {
      languages,
      formats,
      flavors,
      timeout,
    } => {
      let overrides = ConfigOverrides {
        languages,
        formats,
        flavors,
        ..Default::default()
      };
      let config = toolchain.load_config(&cli.config, &overrides)?;
      init_tracing(Some(config.log_level), cli.verbose);
      cmd::cmd_build(&toolchain, config, timeout, output)
    }
    Commands::Validate => {
      let config = toolchain.load_config(&cli.config, &ConfigOverrides::default())?;
      init_tracing(Some(config.log_level), cli.verbose);
      cmd::cmd_validate(&toolchain, &config, output)
    }
    Commands::TestArtifacts { build_dir } => {
      let overrides = ConfigOverrides {
        build_dir,
        ..Default::default()
      };
      let config = toolchain.load_config(&cli.config, &overrides)?;
      init_tracing(Some(config.log_level), cli.verbose);
      cmd::cmd_test_artifacts(&toolchain, &config, output)
    }
    Commands::Package { build_dir, dist_dir } => {
      let overrides = ConfigOverrides {
        build_dir,
        dist_dir,
        ..Default::default()
      };
      let config = toolchain.load_config(&cli.config, &overrides)?;
      init_tracing(Some(config.log_level), cli.verbose);
      cmd::cmd_package(&config, output)
    }
  }
}

/// Logs go to stderr so `--json` output stays parseable.
///
/// `RUST_LOG` wins over everything; otherwise `--verbose` selects `debug` and
/// the configured level applies.
fn init_tracing(level: Option<LogLevel>, verbose: bool) {
  let filter = match EnvFilter::try_from_default_env() {
    Ok(filter) => filter,
    Err(_) => {
      let level = if verbose {
        LogLevel::Debug
      } else {
        level.unwrap_or_default()
      };
      EnvFilter::new(level.as_str())
    }
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}
