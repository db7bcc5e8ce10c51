//! Pipenet CLI - enrich pipe network layers with adjacency, direction and materials.
//!
//! Layers live in a `.pipenet` folder next to your data; every run writes its
//! derived fields to a copy of the input layer and keeps a JSON report.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use pipenet_store::{EnrichRequest, PointsRequest, RollUpRequest};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{config as config_cmd, enrich, layers};
use config::Config;

/// Pipenet CLI - Derive network facts for sewer and water layers.
///
/// Run `pnet import <file>` to add a layer, then `pnet enrich <layer>`.
#[derive(Parser, Debug)]
#[command(
    name = "pnet",
    author,
    version,
    about = "Pipenet: adjacency, flow direction and material inference for pipe networks",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Directory holding the .pipenet store (overrides PIPENET_STORE).
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Engine overrides shared by the commands that run the engine.
#[derive(Args, Debug)]
struct RunArgs {
    /// JSON run configuration (materials, fields, policies) replacing the configured one.
    #[arg(long)]
    run_config: Option<PathBuf>,

    /// Endpoint matching tolerance in working-frame units.
    #[arg(long)]
    tolerance: Option<f64>,

    /// Accept a tolerance of 0 (exact coordinate matching).
    #[arg(long)]
    allow_exact_match: bool,

    /// Upper bound on inference passes.
    #[arg(long)]
    max_passes: Option<usize>,

    /// Print the result as JSON.
    #[arg(long)]
    json: bool,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a layer file to the store.
    Import {
        /// Layer file (JSON).
        file: PathBuf,

        /// Store the layer under this name.
        #[arg(short, long)]
        name: Option<String>,

        /// Replace a layer with the same name.
        #[arg(long)]
        overwrite: bool,
    },

    /// Write a stored layer to a file.
    Export {
        /// Layer name.
        layer: String,

        /// Destination file.
        file: PathBuf,
    },

    /// List stored layers.
    Layers,

    /// Show store status and info.
    Status,

    /// Compute adjacency, direction and materials for a line layer.
    Enrich {
        /// Line layer (defaults to the configured input layer).
        layer: Option<String>,

        /// Output layer name (defaults to `{layer}_{suffix}`).
        #[arg(short, long)]
        output: Option<String>,

        /// Write into the input layer instead of a copy.
        #[arg(long, conflicts_with = "output")]
        in_place: bool,

        /// Replace an existing output layer.
        #[arg(long)]
        overwrite: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Record the nearest point feature at each segment end.
    Points {
        /// Line layer receiving the point fields.
        lines: Option<String>,

        /// Point layer to search.
        #[arg(short, long)]
        points: Option<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Collect a line attribute onto the points at the lines' ends.
    Rollup {
        /// Line attribute to collect.
        line_field: String,

        /// Point attribute to write.
        point_field: String,

        /// Line layer (defaults to the configured input layer).
        #[arg(short, long)]
        lines: Option<String>,

        /// Point layer (defaults to the configured point layer).
        #[arg(short, long)]
        points: Option<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration.
    Show,

    /// Set a configuration value.
    Set {
        /// Configuration key.
        key: String,
        /// Configuration value.
        value: String,
    },

    /// Get a configuration value.
    Get {
        /// Configuration key.
        key: String,
    },

    /// Reset configuration to defaults.
    Reset,

    /// Show path to config file.
    Path,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v/-q
    let default_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load()?;
    if let Some(store) = cli.store {
        config.store = store;
    }

    match cli.command {
        Commands::Import {
            file,
            name,
            overwrite,
        } => layers::import(&config, &file, name.as_deref(), overwrite)?,

        Commands::Export { layer, file } => layers::export(&config, &layer, &file)?,

        Commands::Layers => layers::list(&config)?,

        Commands::Status => layers::status(&config)?,

        Commands::Enrich {
            layer,
            output,
            in_place,
            overwrite,
            run,
        } => {
            apply_run_args(&mut config, &run)?;
            let mut request = EnrichRequest::new(config.input_layer(layer)?);
            request.output_layer = output;
            request.in_place = in_place;
            request.overwrite = overwrite;
            enrich::execute(&config, request, run.json)?;
        }

        Commands::Points { lines, points, run } => {
            apply_run_args(&mut config, &run)?;
            let request = PointsRequest::new(config.input_layer(lines)?, config.point_layer(points)?);
            enrich::points(&config, request, run.json)?;
        }

        Commands::Rollup {
            line_field,
            point_field,
            lines,
            points,
            run,
        } => {
            apply_run_args(&mut config, &run)?;
            let request = RollUpRequest::new(
                config.point_layer(points)?,
                config.input_layer(lines)?,
                line_field,
                point_field,
            );
            enrich::roll_up(&config, request, run.json)?;
        }

        Commands::Config(config_cmd_inner) => match config_cmd_inner {
            ConfigCommands::Show => {
                config_cmd::show(&config)?;
            }
            ConfigCommands::Set { key, value } => {
                config_cmd::set(&key, &value)?;
            }
            ConfigCommands::Get { key } => {
                config_cmd::get(&config, &key)?;
            }
            ConfigCommands::Reset => {
                config_cmd::reset()?;
            }
            ConfigCommands::Path => {
                if let Some(path) = Config::config_file_path() {
                    println!("{}", path.display());
                } else {
                    println!("(no config file path available)");
                }
            }
        },
    }

    Ok(())
}

/// Flags override the run configuration file, which overrides the loaded config.
fn apply_run_args(config: &mut Config, run: &RunArgs) -> Result<()> {
    if let Some(path) = &run.run_config {
        config.load_run_config(path)?;
    }
    if let Some(tolerance) = run.tolerance {
        config.enrich.tolerance = tolerance;
    }
    if run.allow_exact_match {
        config.enrich.allow_exact_match = true;
    }
    if let Some(max_passes) = run.max_passes {
        config.enrich.passes.max_passes = max_passes;
    }
    config.enrich.validate()?;
    Ok(())
}
