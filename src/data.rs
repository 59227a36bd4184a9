use crate::crs::Crs;
use crate::types::{BoundaryDataset, Feature, Value};
use anyhow::{Context, Result, anyhow, bail};
use geo::MultiPolygon;
use shapefile::dbase::FieldValue;
use shapefile::{Reader, Shape};
use std::path::Path;
use tracing::info;

/// Reads a polygon shapefile and its `.prj` into memory.
pub fn load_boundaries(shp_path: &Path) -> Result<BoundaryDataset> {
    if !shp_path.exists() {
        bail!("Shapefile not found: {:?}", shp_path);
    }
    info!("Reading shapefile: {:?}", shp_path);

    let columns = read_columns(shp_path)?;
    let crs = Crs::from_prj(&shp_path.with_extension("prj"))?;
    let mut dataset = BoundaryDataset::new(columns, crs);

    let mut reader = Reader::from_path(shp_path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", shp_path))?;

    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = result
            .with_context(|| format!("Failed to read feature {} of {:?}", index, shp_path))?;

        let geometry = shape_to_multipolygon(shape)
            .with_context(|| format!("Feature {} has unusable geometry", index))?;

        let attributes = dataset
            .columns
            .iter()
            .map(|c| {
                let value = record.get(c).cloned().map(Value::from).unwrap_or(Value::Null);
                (c.clone(), value)
            })
            .collect();

        dataset.features.push(Feature { attributes, geometry });
    }

    info!("Shapefile has {} features", dataset.len());
    info!("Columns: {:?}", dataset.columns);
    info!("CRS: {}", dataset.crs);

    Ok(dataset)
}

/// Fails naming every column in `required` that the dataset lacks.
pub fn require_columns(dataset: &BoundaryDataset, required: &[&str]) -> Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|c| !dataset.has_column(c))
        .collect();

    if !missing.is_empty() {
        bail!(
            "Required column(s) {:?} not found in Shapefile (available: {:?})",
            missing,
            dataset.columns
        );
    }
    Ok(())
}

fn read_columns(shp_path: &Path) -> Result<Vec<String>> {
    let dbf_path = shp_path.with_extension("dbf");
    let table = shapefile::dbase::Reader::from_path(&dbf_path)
        .with_context(|| format!("Failed to open attribute table: {:?}", dbf_path))?;
    Ok(table.fields().iter().map(|f| f.name().to_string()).collect())
}

fn shape_to_multipolygon(shape: Shape) -> Result<MultiPolygon<f64>> {
    let geometry = match shape {
        Shape::Polygon(polygon) => {
            let geo_polygon: MultiPolygon<f64> = polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?;
            geo_polygon
        },
        Shape::PolygonM(polygon) => {
            let geo_polygon: MultiPolygon<f64> = polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?;
            geo_polygon
        },
        Shape::PolygonZ(polygon) => {
            let geo_polygon: MultiPolygon<f64> = polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?;
            geo_polygon
        },
        other => bail!("Expected a polygon shape, found {:?}", other.shapetype()),
    };
    Ok(geometry)
}

impl From<FieldValue> for Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Character(Some(s)) => Value::Text(s.trim_end().to_string()),
            FieldValue::Memo(s) => Value::Text(s),
            FieldValue::Numeric(Some(n)) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    Value::Integer(n as i64)
                } else {
                    Value::Number(n)
                }
            },
            FieldValue::Float(Some(f)) => Value::Number(f as f64),
            FieldValue::Double(d) | FieldValue::Currency(d) => Value::Number(d),
            FieldValue::Integer(i) => Value::Integer(i as i64),
            FieldValue::Logical(Some(b)) => Value::Text((if b { "T" } else { "F" }).to_string()),
            FieldValue::Date(Some(d)) => {
                Value::Text(format!("{:04}{:02}{:02}", d.year(), d.month(), d.day()))
            },
            _ => Value::Null,
        }
    }
}
