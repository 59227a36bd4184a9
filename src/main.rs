use admin_levels::config::AppConfig;
use admin_levels::pipeline;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the admin 0/1/2 shapefiles and package them into one archive
    Build {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Flat schemas, no reprojection, no combined layer; overwrite the input archive
        #[arg(long, conflicts_with = "config")]
        legacy: bool,
        #[arg(short, long, value_name = "ZIP")]
        input: Option<PathBuf>,
        #[arg(short, long, value_name = "ZIP")]
        output: Option<PathBuf>,
    },
    /// Report the feature count, columns and CRS of the input layer
    Info {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        #[arg(short, long, value_name = "ZIP")]
        input: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>, legacy: bool) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from_file(path),
        None if legacy => Ok(AppConfig::legacy()),
        None => Ok(AppConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Build { config, legacy, input, output } => {
            let mut app_config = load_config(config.as_ref(), *legacy)?;
            if let Some(input) = input {
                app_config.input.archive = input.clone();
                if *legacy && output.is_none() {
                    app_config.output.archive = input.clone();
                }
            }
            if let Some(output) = output {
                app_config.output.archive = output.clone();
            }

            let summary = pipeline::run(&app_config)?;
            println!("Wrote {:?}:", app_config.output.archive);
            for (name, count) in &summary.datasets {
                println!("  {:<12} {:>6} features", name, count);
            }
        }
        Commands::Info { config, input } => {
            let mut app_config = load_config(config.as_ref(), false)?;
            if let Some(input) = input {
                app_config.input.archive = input.clone();
            }

            let scratch = TempDir::new()?;
            let source = pipeline::load_source(&app_config, scratch.path())?;
            println!("Features: {}", source.len());
            println!("Columns:  {}", source.columns.join(", "));
            println!("CRS:      {}", source.crs);
        }
    }

    Ok(())
}
