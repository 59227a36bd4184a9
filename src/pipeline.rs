use anyhow::{Context, Result};
use std::path::Path;
use tempfile::TempDir;
use tracing::info;

use crate::archive::{extract_archive, package_archive};
use crate::config::AppConfig;
use crate::data::{load_boundaries, require_columns};
use crate::output::write_dataset;
use crate::processing::{derive_admin0, derive_admin1, derive_admin2, derive_combined, LevelSchema};
use crate::reproject::reproject;
use crate::types::{AdminLevel, AdminLevels, BoundaryDataset};

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// (base name, record count) per written dataset, in archive order
    pub datasets: Vec<(String, usize)>,
    pub entries: Vec<String>,
}

/// Extracts the input archive into `scratch` and loads the district layer.
pub fn load_source(config: &AppConfig, scratch: &Path) -> Result<BoundaryDataset> {
    extract_archive(&config.input.archive, scratch)?;
    load_boundaries(&scratch.join(&config.input.shapefile))
}

/// Derives every configured level from the district layer.
pub fn build_levels(source: &BoundaryDataset, config: &AppConfig) -> Result<AdminLevels> {
    require_columns(source, &config.columns.all())?;

    let reprojected;
    let source = if config.processing.reproject {
        reprojected = reproject(source, config.processing.target_epsg)?;
        &reprojected
    } else {
        source
    };

    let schema = LevelSchema::new(config.columns.clone(), config.processing.hierarchical);
    let adm0 = derive_admin0(source, &schema)?;
    let adm1 = derive_admin1(source, &schema)?;
    let adm2 = derive_admin2(source, &schema)?;
    let combined = config
        .processing
        .combined
        .then(|| derive_combined(&adm0, &adm1, &adm2));

    Ok(AdminLevels { adm0, adm1, adm2, combined })
}

/// Runs the whole conversion. The scratch directory is removed when this
/// returns, whether or not the run succeeded.
pub fn run(config: &AppConfig) -> Result<RunSummary> {
    let scratch = TempDir::new().context("Failed to create scratch directory")?;
    convert(config, scratch.path())
}

/// Like [`run`], with the scratch directory created under `root`.
pub fn run_with_scratch_root(config: &AppConfig, root: &Path) -> Result<RunSummary> {
    let scratch = TempDir::new_in(root)
        .with_context(|| format!("Failed to create scratch directory in {:?}", root))?;
    convert(config, scratch.path())
}

fn convert(config: &AppConfig, work: &Path) -> Result<RunSummary> {
    let source = load_source(config, work)?;
    let levels = build_levels(&source, config)?;

    info!("Saving shapefiles...");
    let mut datasets = Vec::new();
    for level in AdminLevel::all() {
        let base_name = level.base_name(&config.output.prefix);
        let dataset = levels.level(*level);
        write_dataset(dataset, work, &base_name)?;
        datasets.push((base_name, dataset.len()));
    }
    if let Some(combined) = &levels.combined {
        let base_name = config.combined_base_name();
        write_dataset(combined, work, &base_name)?;
        datasets.push((base_name, combined.len()));
    }

    let base_names: Vec<String> = datasets.iter().map(|(name, _)| name.clone()).collect();
    let entries = package_archive(work, &base_names, &config.output.extensions, &config.output.archive)?;

    info!(
        "Successfully created {:?} with {} layer(s)",
        config.output.archive,
        datasets.len()
    );
    for (name, count) in &datasets {
        info!("- {} ({} features)", name, count);
    }

    Ok(RunSummary { datasets, entries })
}
