use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

use crate::crs::WGS84;

pub const DEFAULT_EXTENSIONS: &[&str] = &[".shp", ".shx", ".dbf", ".prj", ".cpg", ".sbn", ".sbx", ".shp.xml"];

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub columns: ColumnConfig,
    pub processing: ProcessingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    pub archive: PathBuf,
    pub shapefile: PathBuf, // Relative to the extracted archive root
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub archive: PathBuf,
    pub prefix: String,
    pub extensions: Vec<String>,
}

/// Attribute names expected in the district shapefile.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ColumnConfig {
    pub adm0_code: String,
    pub adm0_name: String,
    pub adm1_code: String,
    pub adm1_name: String,
    pub adm1_type: String,
    pub adm2_code: String,
    pub adm2_name: String,
    pub adm2_type: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProcessingConfig {
    pub hierarchical: bool,
    pub combined: bool,
    pub reproject: bool,
    pub target_epsg: u32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            archive: PathBuf::from("SHP_ADM2_UPDATE.zip"),
            shapefile: PathBuf::from("SHP_ADM2_UPDATE/mdg_bnd_adm2_dis_pam.shp"),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            archive: PathBuf::from("SHP_ADMIN_LEVELS.zip"),
            prefix: "mdg".to_string(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            adm0_code: "ADM0_PCODE".to_string(),
            adm0_name: "ADM0_EN".to_string(),
            adm1_code: "ADM1_PCODE".to_string(),
            adm1_name: "ADM1_EN".to_string(),
            adm1_type: "ADM1_TYPE".to_string(),
            adm2_code: "ADM2_PCODE".to_string(),
            adm2_name: "ADM2_EN".to_string(),
            adm2_type: "ADM2_TYPE".to_string(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            hierarchical: true,
            combined: true,
            reproject: true,
            target_epsg: WGS84,
        }
    }
}

impl ColumnConfig {
    /// Every column the builder reads from the source.
    pub fn all(&self) -> Vec<&str> {
        vec![
            self.adm0_code.as_str(),
            self.adm0_name.as_str(),
            self.adm1_code.as_str(),
            self.adm1_name.as_str(),
            self.adm1_type.as_str(),
            self.adm2_code.as_str(),
            self.adm2_name.as_str(),
            self.adm2_type.as_str(),
        ]
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// First-generation behaviour: flat schemas, no reprojection, no combined
    /// layer, and the result replaces the input archive.
    pub fn legacy() -> Self {
        let input = InputConfig::default();
        Self {
            output: OutputConfig {
                archive: input.archive.clone(),
                ..OutputConfig::default()
            },
            input,
            columns: ColumnConfig::default(),
            processing: ProcessingConfig {
                hierarchical: false,
                combined: false,
                reproject: false,
                target_epsg: WGS84,
            },
        }
    }

    pub fn combined_base_name(&self) -> String {
        format!("{}_adm_ALL", self.output.prefix)
    }
}
