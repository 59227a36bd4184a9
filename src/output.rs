use crate::types::{BoundaryDataset, Value};
use anyhow::{Context, Result, anyhow, bail};
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::{Polygon, Writer};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MAX_CHARACTER_LENGTH: usize = 254;
const CODE_PAGE: &str = "UTF-8";

#[derive(Debug, Clone, Copy, PartialEq)]
enum FieldKind {
    Character(u8),
    Integer,
    Float,
}

/// Writes `<base_name>.shp/.shx/.dbf/.cpg` (and `.prj` when the CRS has WKT)
/// into `dir`. Returns the paths written.
pub fn write_dataset(dataset: &BoundaryDataset, dir: &Path, base_name: &str) -> Result<Vec<PathBuf>> {
    let shp_path = dir.join(format!("{}.shp", base_name));

    let mut table = TableWriterBuilder::new();
    let mut kinds = Vec::with_capacity(dataset.columns.len());
    for column in &dataset.columns {
        let name = FieldName::try_from(column.as_str())
            .map_err(|e| anyhow!("Invalid dBase field name {:?}: {:?}", column, e))?;
        let kind = field_kind(dataset, column)?;
        table = match kind {
            FieldKind::Character(len) => table.add_character_field(name, len),
            FieldKind::Integer => table.add_numeric_field(name, 18, 0),
            FieldKind::Float => table.add_numeric_field(name, 24, 15),
        };
        kinds.push(kind);
    }

    {
        let mut writer = Writer::from_path(&shp_path, table)
            .with_context(|| format!("Failed to create Shapefile: {:?}", shp_path))?;

        for feature in &dataset.features {
            let mut record = Record::default();
            for (column, kind) in dataset.columns.iter().zip(&kinds) {
                record.insert(column.clone(), to_field_value(feature.get(column), *kind));
            }
            let shape = Polygon::from(feature.geometry.clone());
            writer
                .write_shape_and_record(&shape, &record)
                .with_context(|| format!("Failed to write feature to {:?}", shp_path))?;
        }
    }

    let mut written = vec![
        shp_path.clone(),
        shp_path.with_extension("shx"),
        shp_path.with_extension("dbf"),
    ];

    if let Some(wkt) = &dataset.crs.wkt {
        let prj_path = shp_path.with_extension("prj");
        fs::write(&prj_path, wkt)
            .with_context(|| format!("Failed to write projection file: {:?}", prj_path))?;
        written.push(prj_path);
    } else {
        debug!("No CRS for {}, skipping .prj", base_name);
    }

    let cpg_path = shp_path.with_extension("cpg");
    fs::write(&cpg_path, CODE_PAGE)
        .with_context(|| format!("Failed to write code page file: {:?}", cpg_path))?;
    written.push(cpg_path);

    info!("Saved {} ({} features): {:?}", base_name, dataset.len(), shp_path);
    Ok(written)
}

fn field_kind(dataset: &BoundaryDataset, column: &str) -> Result<FieldKind> {
    let mut has_text = false;
    let mut has_float = false;
    let mut has_value = false;
    let mut max_len = 1;
    for value in dataset.features.iter().map(|f| f.get(column)) {
        match value {
            Value::Text(_) => has_text = true,
            Value::Number(_) => has_float = true,
            Value::Integer(_) | Value::Null => {},
        }
        has_value |= !value.is_null();
        max_len = max_len.max(value.to_string().len());
    }

    let kind = if has_text || !has_value {
        if max_len > MAX_CHARACTER_LENGTH {
            bail!(
                "Column '{}' has a {}-byte value; dBase character fields hold at most {}",
                column,
                max_len,
                MAX_CHARACTER_LENGTH
            );
        }
        FieldKind::Character(max_len as u8)
    } else if has_float {
        FieldKind::Float
    } else {
        FieldKind::Integer
    };
    Ok(kind)
}

fn to_field_value(value: &Value, kind: FieldKind) -> FieldValue {
    match kind {
        FieldKind::Character(_) => match value {
            Value::Null => FieldValue::Character(None),
            other => FieldValue::Character(Some(other.to_string())),
        },
        FieldKind::Integer | FieldKind::Float => match value {
            Value::Integer(i) => FieldValue::Numeric(Some(*i as f64)),
            Value::Number(n) => FieldValue::Numeric(Some(*n)),
            _ => FieldValue::Numeric(None),
        },
    }
}
