use anyhow::{anyhow, bail, Result};
use geo::{Coord, MapCoords};
use std::f64::consts::FRAC_PI_2;
use tracing::info;

use crate::crs::{Crs, WGS84, WORLD_MERCATOR};
use crate::types::BoundaryDataset;

// WGS84 ellipsoid
const SEMI_MAJOR: f64 = 6_378_137.0;
const INV_FLATTENING: f64 = 298.257_223_563;

const MAX_ITERATIONS: usize = 15;
const TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Transform {
    Identity,
    MercatorToGeographic,
    GeographicToMercator,
}

fn eccentricity() -> f64 {
    let f = 1.0 / INV_FLATTENING;
    (f * (2.0 - f)).sqrt()
}

fn select_transform(source: &Crs, target_epsg: u32) -> Result<Transform> {
    let source_epsg = source
        .epsg
        .ok_or_else(|| anyhow!("Cannot reproject: source CRS is {}", source))?;

    match (source_epsg, target_epsg) {
        (s, t) if s == t => Ok(Transform::Identity),
        (WORLD_MERCATOR, WGS84) => Ok(Transform::MercatorToGeographic),
        (WGS84, WORLD_MERCATOR) => Ok(Transform::GeographicToMercator),
        (s, t) => bail!("Unsupported reprojection EPSG:{} -> EPSG:{}", s, t),
    }
}

/// Transforms every geometry of `dataset` into `target_epsg`, replacing the
/// dataset's CRS.
pub fn reproject(dataset: &BoundaryDataset, target_epsg: u32) -> Result<BoundaryDataset> {
    let transform = select_transform(&dataset.crs, target_epsg)?;
    info!(
        "Reprojecting {} features from {} to EPSG:{}",
        dataset.len(),
        dataset.crs,
        target_epsg
    );

    let mut out = dataset.clone();
    out.crs = Crs::from_epsg(target_epsg);
    if transform == Transform::Identity {
        return Ok(out);
    }

    for feature in &mut out.features {
        feature.geometry = feature
            .geometry
            .try_map_coords(|c| transform_coord(transform, c))?;
    }
    Ok(out)
}

fn transform_coord(transform: Transform, c: Coord<f64>) -> Result<Coord<f64>> {
    match transform {
        Transform::Identity => Ok(c),
        Transform::MercatorToGeographic => Ok(mercator_to_geographic(c)),
        Transform::GeographicToMercator => geographic_to_mercator(c),
    }
}

/// Inverse ellipsoidal Mercator: metres to degrees.
fn mercator_to_geographic(c: Coord<f64>) -> Coord<f64> {
    let e = eccentricity();
    let t = (-c.y / SEMI_MAJOR).exp();

    let mut phi = FRAC_PI_2 - 2.0 * t.atan();
    for _ in 0..MAX_ITERATIONS {
        let es = e * phi.sin();
        let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).atan();
        let delta = (next - phi).abs();
        phi = next;
        if delta < TOLERANCE {
            break;
        }
    }

    Coord {
        x: (c.x / SEMI_MAJOR).to_degrees(),
        y: phi.to_degrees(),
    }
}

/// Forward ellipsoidal Mercator: degrees to metres.
fn geographic_to_mercator(c: Coord<f64>) -> Result<Coord<f64>> {
    if c.y.abs() >= 90.0 {
        bail!("Latitude {} cannot be projected to Mercator", c.y);
    }
    let e = eccentricity();
    let phi = c.y.to_radians();
    let es = e * phi.sin();
    let y = SEMI_MAJOR
        * ((std::f64::consts::FRAC_PI_4 + phi / 2.0).tan() * ((1.0 - es) / (1.0 + es)).powf(e / 2.0))
            .ln();

    Ok(Coord {
        x: SEMI_MAJOR * c.x.to_radians(),
        y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Feature;
    use geo::{polygon, MultiPolygon};
    use std::collections::HashMap;

    fn mercator_dataset() -> BoundaryDataset {
        // Roughly the extent of Madagascar in World Mercator metres
        let poly = polygon![
            (x: 4_800_000.0, y: -2_900_000.0),
            (x: 5_600_000.0, y: -2_900_000.0),
            (x: 5_600_000.0, y: -1_300_000.0),
            (x: 4_800_000.0, y: -1_300_000.0),
            (x: 4_800_000.0, y: -2_900_000.0),
        ];
        let mut ds = BoundaryDataset::new(vec![], Crs::from_epsg(WORLD_MERCATOR));
        ds.features.push(Feature {
            attributes: HashMap::new(),
            geometry: MultiPolygon::new(vec![poly]),
        });
        ds
    }

    #[test]
    fn known_point_matches_reference() {
        // 45E 20S in EPSG:3395
        let c = geographic_to_mercator(Coord { x: 45.0, y: -20.0 }).unwrap();
        assert!((c.x - 5_009_377.085).abs() < 1e-2);
        assert!((c.y - -2_258_423.649).abs() < 1.0);
    }

    #[test]
    fn round_trip_is_stable() {
        let source = mercator_dataset();
        let geographic = reproject(&source, WGS84).unwrap();
        assert_eq!(geographic.crs.epsg, Some(WGS84));

        let first = geographic.features[0].geometry.0[0].exterior().0[0];
        assert!(first.x > 40.0 && first.x < 55.0);
        assert!(first.y < -10.0 && first.y > -30.0);

        let back = reproject(&geographic, WORLD_MERCATOR).unwrap();
        let before = source.features[0].geometry.0[0].exterior();
        let after = back.features[0].geometry.0[0].exterior();
        for (a, b) in before.coords().zip(after.coords()) {
            assert!((a.x - b.x).abs() < 1e-6, "{} vs {}", a.x, b.x);
            assert!((a.y - b.y).abs() < 1e-6, "{} vs {}", a.y, b.y);
        }
    }

    #[test]
    fn same_crs_is_identity() {
        let source = mercator_dataset();
        let out = reproject(&source, WORLD_MERCATOR).unwrap();
        assert_eq!(out.features[0].geometry, source.features[0].geometry);
    }

    #[test]
    fn unknown_source_fails() {
        let mut source = mercator_dataset();
        source.crs = Crs::unknown();
        assert!(reproject(&source, WGS84).is_err());
    }

    #[test]
    fn unsupported_pair_fails() {
        let source = mercator_dataset();
        assert!(reproject(&source, 32738).is_err());
    }
}
