use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub const WGS84: u32 = 4326;
pub const WORLD_MERCATOR: u32 = 3395;

const WGS84_WKT: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

const WORLD_MERCATOR_WKT: &str = r#"PROJCS["WGS_1984_World_Mercator",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Mercator"],PARAMETER["False_Easting",0.0],PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",0.0],PARAMETER["Standard_Parallel_1",0.0],UNIT["Meter",1.0]]"#;

/// Coordinate reference system of a dataset, as far as we can tell from its
/// `.prj` sidecar.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Crs {
    pub epsg: Option<u32>,
    pub wkt: Option<String>,
}

impl Crs {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn from_epsg(code: u32) -> Self {
        let wkt = match code {
            WGS84 => Some(WGS84_WKT.to_string()),
            WORLD_MERCATOR => Some(WORLD_MERCATOR_WKT.to_string()),
            _ => None,
        };
        Self {
            epsg: Some(code),
            wkt,
        }
    }

    pub fn from_wkt(wkt: &str) -> Self {
        let wkt = wkt.trim();
        Self {
            epsg: detect_epsg(wkt),
            wkt: Some(wkt.to_string()),
        }
    }

    /// Reads a `.prj` file. A missing file yields an unknown CRS.
    pub fn from_prj(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::unknown());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read projection file: {:?}", path))?;
        Ok(Self::from_wkt(&content))
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.epsg, &self.wkt) {
            (Some(code), _) => write!(f, "EPSG:{}", code),
            (None, Some(_)) => write!(f, "unrecognised WKT"),
            (None, None) => write!(f, "unknown"),
        }
    }
}

/// The outermost authority code of a WKT string, falling back to the names
/// of the two systems we can transform between.
fn detect_epsg(wkt: &str) -> Option<u32> {
    for marker in ["AUTHORITY[\"EPSG\",", "ID[\"EPSG\","] {
        if let Some(pos) = wkt.rfind(marker) {
            let digits: String = wkt[pos + marker.len()..]
                .chars()
                .skip_while(|c| *c == '"' || c.is_whitespace())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(code) = digits.parse() {
                return Some(code);
            }
        }
    }

    let name = wkt.split('"').nth(1)?;
    match name {
        "WGS_1984_World_Mercator" | "WGS 84 / World Mercator" => Some(WORLD_MERCATOR),
        "GCS_WGS_1984" | "WGS 84" if wkt.starts_with("GEOGCS") => Some(WGS84),
        _ => None,
    }
}
