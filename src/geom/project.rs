//! The reprojection contract (spec §3 "Projection", §4.4 "Reprojection").
//!
//! The actual trigonometry is out of scope (spec §1); this module defines
//! only the pure-function contract `(lon, lat) -> (x, y)` in a target SRID
//! and the default identity/spherical-mercator projections needed by the
//! end-to-end scenarios in spec §8, grounded on the standard Web Mercator
//! formulas (no external crate pulls in a full geodesy stack for two
//! closed-form equations).

use geo::Coord;

/// A pure, immutable-after-construction `(lon, lat) -> (x, y)` mapping into
/// a target SRID (spec §3).
pub trait Projection {
    fn srid(&self) -> i32;
    fn project(&self, coord: Coord<f64>) -> Coord<f64>;
}

/// SRID 4326: geographic WGS84, i.e. no transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct Wgs84;

impl Projection for Wgs84 {
    fn srid(&self) -> i32 {
        4326
    }

    fn project(&self, coord: Coord<f64>) -> Coord<f64> {
        coord
    }
}

/// SRID 3857: spherical (Web) Mercator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SphericalMercator;

const EARTH_RADIUS_M: f64 = 6_378_137.0;

impl Projection for SphericalMercator {
    fn srid(&self) -> i32 {
        3857
    }

    fn project(&self, coord: Coord<f64>) -> Coord<f64> {
        let x = coord.x.to_radians() * EARTH_RADIUS_M;
        let lat_rad = coord.y.to_radians();
        let y = EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + lat_rad / 2.0).tan().ln();
        Coord { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wgs84_is_identity() {
        let p = Wgs84.project(Coord { x: 10.0, y: 20.0 });
        assert_eq!(p, Coord { x: 10.0, y: 20.0 });
    }

    #[test]
    fn mercator_origin_maps_to_origin() {
        let p = SphericalMercator.project(Coord { x: 0.0, y: 0.0 });
        assert!(p.x.abs() < 1e-6);
        assert!(p.y.abs() < 1e-6);
    }

    #[test]
    fn mercator_srid_is_3857() {
        assert_eq!(SphericalMercator.srid(), 3857);
    }
}
