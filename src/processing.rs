use crate::config::ColumnConfig;
use crate::types::{AdminLevel, BoundaryDataset, Feature, GroupKey, Value};
use anyhow::{Result, bail};
use geo::{BooleanOps, MultiPolygon};
use std::collections::BTreeMap;
use tracing::{info, warn};

pub const LEVEL_COLUMN: &str = "admLevel";

/// Which attributes each derived level carries.
#[derive(Debug, Clone)]
pub struct LevelSchema {
    pub columns: ColumnConfig,
    pub hierarchical: bool,
}

impl LevelSchema {
    pub fn new(columns: ColumnConfig, hierarchical: bool) -> Self {
        Self { columns, hierarchical }
    }

    /// Column the level is dissolved on; `None` for districts, which pass through.
    pub fn dissolve_key(&self, level: AdminLevel) -> Option<&str> {
        match level {
            AdminLevel::National => Some(self.columns.adm0_code.as_str()),
            AdminLevel::Regional => Some(self.columns.adm1_code.as_str()),
            AdminLevel::District => None,
        }
    }

    pub fn output_columns(&self, level: AdminLevel) -> Vec<String> {
        let c = &self.columns;
        let national = [&c.adm0_code, &c.adm0_name];
        let regional = [&c.adm1_code, &c.adm1_name];

        let mut out: Vec<&String> = Vec::new();
        match level {
            AdminLevel::National => out.extend(national),
            AdminLevel::Regional => {
                if self.hierarchical {
                    out.extend(national);
                }
                out.extend(regional);
                out.push(&c.adm1_type);
            },
            AdminLevel::District => {
                if self.hierarchical {
                    out.extend(national);
                    out.extend(regional);
                    out.push(&c.adm1_type);
                }
                out.extend([&c.adm2_code, &c.adm2_name, &c.adm2_type]);
            },
        }
        out.into_iter().cloned().collect()
    }
}

pub fn derive_admin0(source: &BoundaryDataset, schema: &LevelSchema) -> Result<BoundaryDataset> {
    derive_level(source, schema, AdminLevel::National)
}

pub fn derive_admin1(source: &BoundaryDataset, schema: &LevelSchema) -> Result<BoundaryDataset> {
    derive_level(source, schema, AdminLevel::Regional)
}

pub fn derive_admin2(source: &BoundaryDataset, schema: &LevelSchema) -> Result<BoundaryDataset> {
    derive_level(source, schema, AdminLevel::District)
}

fn derive_level(source: &BoundaryDataset, schema: &LevelSchema, level: AdminLevel) -> Result<BoundaryDataset> {
    info!("Creating Admin {} ({}) dataset...", level.tag(), level.label());
    let columns = schema.output_columns(level);

    let out = match schema.dissolve_key(level) {
        Some(key) => dissolve(source, key, columns)?,
        None => select(source, columns)?,
    };

    info!("Admin {} has {} feature(s)", level.tag(), out.len());
    Ok(out)
}

/// Keeps every record in order, projected onto `columns`.
pub fn select(source: &BoundaryDataset, columns: Vec<String>) -> Result<BoundaryDataset> {
    check_columns(source, &columns)?;
    let mut out = BoundaryDataset::new(columns, source.crs.clone());
    for feature in &source.features {
        out.push_projected(feature, feature.geometry.clone());
    }
    Ok(out)
}

/// Groups records by `key` and unions each group's geometry.
///
/// Groups come out in ascending key order. Every non-geometry attribute is
/// taken from the group's first record in input order; later members'
/// values are discarded. Records with a null key are dropped.
pub fn dissolve(source: &BoundaryDataset, key: &str, columns: Vec<String>) -> Result<BoundaryDataset> {
    check_columns(source, &columns)?;
    if !source.has_column(key) {
        bail!("Dissolve column '{}' not found (available: {:?})", key, source.columns);
    }

    let mut groups: BTreeMap<GroupKey, Vec<&Feature>> = BTreeMap::new();
    let mut dropped = 0;
    for feature in &source.features {
        match feature.get(key).group_key() {
            Some(k) => groups.entry(k).or_default().push(feature),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        warn!("Dropped {} feature(s) with no value for '{}'", dropped, key);
    }

    let mut out = BoundaryDataset::new(columns, source.crs.clone());
    for members in groups.values() {
        let first = members[0];
        let geometry = union_all(members.iter().map(|f| f.geometry.clone()).collect());
        out.push_projected(first, geometry);
    }
    Ok(out)
}

/// Concatenates the three levels in order, tagging each record with its
/// level under `admLevel`.
pub fn derive_combined(
    adm0: &BoundaryDataset,
    adm1: &BoundaryDataset,
    adm2: &BoundaryDataset,
) -> BoundaryDataset {
    info!("Creating combined dataset...");
    let parts = [
        (AdminLevel::National, adm0),
        (AdminLevel::Regional, adm1),
        (AdminLevel::District, adm2),
    ];

    let mut columns = vec![LEVEL_COLUMN.to_string()];
    for (_, part) in &parts {
        for column in &part.columns {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
    }

    let mut out = BoundaryDataset::new(columns, adm0.crs.clone());
    for (level, part) in parts {
        for feature in &part.features {
            let mut tagged = feature.clone();
            tagged.attributes.insert(LEVEL_COLUMN.to_string(), Value::Integer(level.tag()));
            out.push_projected(&tagged, tagged.geometry.clone());
        }
    }

    info!("Combined dataset has {} feature(s)", out.len());
    out
}

/// Pairwise union so each step merges geometries of similar size.
fn union_all(mut geometries: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    if geometries.is_empty() {
        return MultiPolygon::new(vec![]);
    }
    while geometries.len() > 1 {
        let mut next = Vec::with_capacity(geometries.len() / 2 + 1);
        let mut iter = geometries.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }
        geometries = next;
    }
    geometries.remove(0)
}

fn check_columns(source: &BoundaryDataset, columns: &[String]) -> Result<()> {
    let missing: Vec<&String> = columns.iter().filter(|c| !source.has_column(c)).collect();
    if !missing.is_empty() {
        bail!("Column(s) {:?} not found (available: {:?})", missing, source.columns);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use geo::{polygon, Area};
    use std::collections::HashMap;

    fn square(x: f64, y: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + 1.0, y: y),
            (x: x + 1.0, y: y + 1.0),
            (x: x, y: y + 1.0),
            (x: x, y: y),
        ]])
    }

    fn district(region: &str, region_name: &str, code: &str, x: f64) -> Feature {
        let attrs = [
            ("ADM0_PCODE", "MG"),
            ("ADM0_EN", "Madagascar"),
            ("ADM1_PCODE", region),
            ("ADM1_EN", region_name),
            ("ADM1_TYPE", "Region"),
            ("ADM2_PCODE", code),
            ("ADM2_EN", code),
            ("ADM2_TYPE", "District"),
        ];
        Feature {
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), Value::from(*v)))
                .collect::<HashMap<_, _>>(),
            geometry: square(x, 0.0),
        }
    }

    fn source() -> BoundaryDataset {
        let columns = ColumnConfig::default().all().iter().map(|s| s.to_string()).collect();
        let mut ds = BoundaryDataset::new(columns, Crs::from_epsg(4326));
        ds.features = vec![
            district("MG12", "Vakinankaratra", "MG12101", 0.0),
            district("MG11", "Analamanga", "MG11101", 1.0),
            district("MG11", "Analamanga Renamed", "MG11102", 2.0),
            district("MG12", "Vakinankaratra", "MG12102", 5.0),
        ];
        ds
    }

    fn flat() -> LevelSchema {
        LevelSchema::new(ColumnConfig::default(), false)
    }

    fn hierarchical() -> LevelSchema {
        LevelSchema::new(ColumnConfig::default(), true)
    }

    #[test]
    fn admin0_is_the_union_of_everything() {
        let src = source();
        let adm0 = derive_admin0(&src, &flat()).unwrap();
        assert_eq!(adm0.len(), 1);
        assert_eq!(adm0.columns, vec!["ADM0_PCODE", "ADM0_EN"]);
        assert_eq!(adm0.features[0].get("ADM0_EN"), &Value::from("Madagascar"));
        assert!((adm0.features[0].geometry.unsigned_area() - 4.0).abs() < 1e-6);
        // Adjacent squares merge, the detached one stays separate
        assert_eq!(adm0.features[0].geometry.0.len(), 2);
    }

    #[test]
    fn admin0_emits_one_record_per_country_code() {
        let mut src = source();
        src.features[3]
            .attributes
            .insert("ADM0_PCODE".into(), Value::from("KM"));
        let adm0 = derive_admin0(&src, &flat()).unwrap();
        assert_eq!(adm0.len(), 2);
    }

    #[test]
    fn admin1_one_record_per_region_preserving_area() {
        let src = source();
        let adm1 = derive_admin1(&src, &flat()).unwrap();
        assert_eq!(adm1.len(), 2);
        assert_eq!(adm1.columns, vec!["ADM1_PCODE", "ADM1_EN", "ADM1_TYPE"]);

        let total: f64 = adm1.features.iter().map(|f| f.geometry.unsigned_area()).sum();
        assert!((total - 4.0).abs() < 1e-6);

        // Sorted by region code
        assert_eq!(adm1.features[0].get("ADM1_PCODE"), &Value::from("MG11"));
        assert_eq!(adm1.features[1].get("ADM1_PCODE"), &Value::from("MG12"));
    }

    #[test]
    fn dissolve_keeps_first_seen_attributes() {
        let adm1 = derive_admin1(&source(), &flat()).unwrap();
        assert_eq!(adm1.features[0].get("ADM1_EN"), &Value::from("Analamanga"));

        let mut reversed = source();
        reversed.features.swap(1, 2);
        let adm1 = derive_admin1(&reversed, &flat()).unwrap();
        assert_eq!(adm1.features[0].get("ADM1_EN"), &Value::from("Analamanga Renamed"));
    }

    #[test]
    fn hierarchical_admin1_carries_national_fields() {
        let adm1 = derive_admin1(&source(), &hierarchical()).unwrap();
        assert_eq!(
            adm1.columns,
            vec!["ADM0_PCODE", "ADM0_EN", "ADM1_PCODE", "ADM1_EN", "ADM1_TYPE"]
        );
        assert_eq!(adm1.features[1].get("ADM0_PCODE"), &Value::from("MG"));
    }

    #[test]
    fn admin2_passes_records_through_in_order() {
        let src = source();
        let adm2 = derive_admin2(&src, &flat()).unwrap();
        assert_eq!(adm2.len(), src.len());
        assert_eq!(adm2.columns, vec!["ADM2_PCODE", "ADM2_EN", "ADM2_TYPE"]);
        for (out, input) in adm2.features.iter().zip(&src.features) {
            assert_eq!(out.get("ADM2_PCODE"), input.get("ADM2_PCODE"));
            assert_eq!(out.geometry, input.geometry);
        }

        let adm2 = derive_admin2(&src, &hierarchical()).unwrap();
        assert_eq!(
            adm2.columns,
            vec![
                "ADM0_PCODE", "ADM0_EN", "ADM1_PCODE", "ADM1_EN", "ADM1_TYPE",
                "ADM2_PCODE", "ADM2_EN", "ADM2_TYPE",
            ]
        );
        assert_eq!(adm2.features[0].get("ADM1_PCODE"), &Value::from("MG12"));
        assert_eq!(adm2.features[0].get("ADM1_TYPE"), &Value::from("Region"));
    }

    #[test]
    fn numeric_keys_sort_numerically() {
        let mut src = source();
        src.features.truncate(3);
        for (feature, code) in src.features.iter_mut().zip([10, 9, 2]) {
            feature.attributes.insert("ADM1_PCODE".into(), Value::Integer(code));
        }
        let adm1 = derive_admin1(&src, &flat()).unwrap();
        let codes: Vec<&Value> = adm1.features.iter().map(|f| f.get("ADM1_PCODE")).collect();
        assert_eq!(codes, vec![&Value::Integer(2), &Value::Integer(9), &Value::Integer(10)]);
    }

    #[test]
    fn integer_and_text_keys_stay_apart() {
        let mut src = source();
        src.features.truncate(2);
        src.features[0].attributes.insert("ADM1_PCODE".into(), Value::Integer(7));
        src.features[1].attributes.insert("ADM1_PCODE".into(), Value::from("7"));
        let adm1 = derive_admin1(&src, &flat()).unwrap();
        assert_eq!(adm1.len(), 2);
    }

    #[test]
    fn null_keys_are_dropped() {
        let mut src = source();
        src.features[0].attributes.insert("ADM1_PCODE".into(), Value::Null);
        let adm1 = derive_admin1(&src, &flat()).unwrap();
        assert_eq!(adm1.len(), 2);
        let total: f64 = adm1.features.iter().map(|f| f.geometry.unsigned_area()).sum();
        assert!((total - 3.0).abs() < 1e-6);
    }

    #[test]
    fn missing_column_is_an_error() {
        let mut src = source();
        src.columns.retain(|c| c != "ADM1_TYPE");
        assert!(derive_admin1(&src, &flat()).is_err());
        assert!(derive_admin0(&src, &flat()).is_ok());
    }

    #[test]
    fn combined_tags_and_orders_levels() {
        let src = source();
        let schema = flat();
        let adm0 = derive_admin0(&src, &schema).unwrap();
        let adm1 = derive_admin1(&src, &schema).unwrap();
        let adm2 = derive_admin2(&src, &schema).unwrap();

        let all = derive_combined(&adm0, &adm1, &adm2);
        assert_eq!(all.len(), adm0.len() + adm1.len() + adm2.len());
        assert_eq!(all.columns[0], LEVEL_COLUMN);
        assert_eq!(all.columns.len(), 1 + 2 + 3 + 3);

        let tags: Vec<&Value> = all.features.iter().map(|f| f.get(LEVEL_COLUMN)).collect();
        assert_eq!(tags[0], &Value::Integer(0));
        assert_eq!(tags[1], &Value::Integer(1));
        assert_eq!(tags[2], &Value::Integer(1));
        assert!(tags[3..].iter().all(|t| **t == Value::Integer(2)));

        // Columns from other levels are null
        assert!(all.features[0].get("ADM2_PCODE").is_null());
        assert_eq!(all.features[3].get("ADM2_PCODE"), &Value::from("MG12101"));
        assert!(all.features[3].get("ADM0_PCODE").is_null());
    }

    #[test]
    fn union_of_nothing_is_empty() {
        assert!(union_all(vec![]).0.is_empty());
    }
}
