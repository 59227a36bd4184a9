use geo::MultiPolygon;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use crate::crs::Crs;

/// One attribute cell of a boundary record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Number(f64),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Key used when grouping records for a dissolve. Null never groups.
    pub fn group_key(&self) -> Option<GroupKey> {
        match self {
            Value::Text(s) => Some(GroupKey::Text(s.clone())),
            Value::Integer(i) => Some(GroupKey::Integer(*i)),
            Value::Number(n) => Some(GroupKey::Number(*n)),
            Value::Null => None,
        }
    }
}

/// A non-null attribute value with a total order, so dissolve groups sort
/// numerically for numeric columns. Values of different kinds never compare
/// equal; integers sort before floats, and both before text.
#[derive(Debug, Clone)]
pub enum GroupKey {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl GroupKey {
    fn rank(&self) -> u8 {
        match self {
            GroupKey::Integer(_) => 0,
            GroupKey::Number(_) => 1,
            GroupKey::Text(_) => 2,
        }
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (GroupKey::Integer(a), GroupKey::Integer(b)) => a.cmp(b),
            (GroupKey::Number(a), GroupKey::Number(b)) => a.total_cmp(b),
            (GroupKey::Text(a), GroupKey::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{}", n),
            Value::Null => Ok(()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Feature {
    pub attributes: HashMap<String, Value>,
    pub geometry: MultiPolygon<f64>,
}

impl Feature {
    pub fn get(&self, column: &str) -> &Value {
        self.attributes.get(column).unwrap_or(&Value::Null)
    }
}

/// An ordered set of boundary records sharing one schema and one CRS.
#[derive(Debug, Clone)]
pub struct BoundaryDataset {
    pub columns: Vec<String>,
    pub features: Vec<Feature>,
    pub crs: Crs,
}

impl BoundaryDataset {
    pub fn new(columns: Vec<String>, crs: Crs) -> Self {
        Self {
            columns,
            features: Vec::new(),
            crs,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Appends a record, keeping only the dataset's columns and filling the
    /// ones the source lacks with `Value::Null`.
    pub fn push_projected(&mut self, source: &Feature, geometry: MultiPolygon<f64>) {
        let attributes = self
            .columns
            .iter()
            .map(|c| (c.clone(), source.get(c).clone()))
            .collect();
        self.features.push(Feature {
            attributes,
            geometry,
        });
    }
}

/// Administrative tier. The discriminant is the `admLevel` tag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AdminLevel {
    National = 0,
    Regional = 1,
    District = 2,
}

impl AdminLevel {
    pub fn all() -> &'static [AdminLevel] {
        &[AdminLevel::National, AdminLevel::Regional, AdminLevel::District]
    }

    pub fn tag(&self) -> i64 {
        *self as i64
    }

    /// Output base name, e.g. `mdg_adm1`.
    pub fn base_name(&self, prefix: &str) -> String {
        format!("{}_adm{}", prefix, self.tag())
    }

    pub fn label(&self) -> &'static str {
        match self {
            AdminLevel::National => "National",
            AdminLevel::Regional => "Regional",
            AdminLevel::District => "District",
        }
    }
}

/// The derived datasets of one run.
#[derive(Debug, Clone)]
pub struct AdminLevels {
    pub adm0: BoundaryDataset,
    pub adm1: BoundaryDataset,
    pub adm2: BoundaryDataset,
    pub combined: Option<BoundaryDataset>,
}

impl AdminLevels {
    pub fn level(&self, level: AdminLevel) -> &BoundaryDataset {
        match level {
            AdminLevel::National => &self.adm0,
            AdminLevel::Regional => &self.adm1,
            AdminLevel::District => &self.adm2,
        }
    }
}
