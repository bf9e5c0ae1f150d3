//! Geometry Kernel
//!
//! Great-circle distance, point-in-polygon and point-to-polygon distance on
//! WGS84 coordinates. Polygons are treated as planar rings in
//! (longitude, latitude) space for containment; distances are always reported
//! in meters.

use serde::{Deserialize, Serialize};

use crate::error::GeofenceError;
use crate::zone::Zone;

/// Mean Earth radius used by every distance calculation in this crate
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters spanned by one degree of latitude on the [`EARTH_RADIUS_M`] sphere
pub const METERS_PER_DEGREE_LATITUDE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Calculate meters per degree longitude at a given latitude
#[inline]
pub fn meters_per_degree_longitude(lat_deg: f64) -> f64 {
    METERS_PER_DEGREE_LATITUDE * lat_deg.to_radians().cos()
}

/// A WGS84 position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    /// Latitude in degrees, -90 to 90
    pub latitude: f64,
    /// Longitude in degrees, -180 to 180
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinate {
            latitude,
            longitude,
        }
    }

    /// Check that both components are finite and inside the WGS84 range
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Return the coordinate unchanged, or [`GeofenceError::InvalidCoordinate`]
    pub fn validate(self) -> Result<Self, GeofenceError> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(GeofenceError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// How the distance from an outside point to a polygon is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMode {
    /// Great-circle distance to the nearest vertex.
    ///
    /// Overestimates when the closest approach lies mid-edge.
    #[default]
    Vertex,
    /// Distance to the nearest point on any edge, measured on a local
    /// equirectangular projection around the query point
    Edge,
}

/// Great-circle (haversine) distance in meters.
///
/// Symmetric in its arguments and exactly zero for identical inputs.
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Even-odd ray casting over a ring of vertices, using (longitude, latitude)
/// as (x, y). The closing edge from the last to the first vertex is implicit.
///
/// Boundary tie-break: the crossing test is half-open in y and strict in x,
/// so for axis-aligned edges a point exactly on the west or south side is
/// inside while a point on the east or north side is outside. The result is
/// deterministic for identical input.
pub fn ring_contains(point: &Coordinate, ring: &[Coordinate]) -> bool {
    let x = point.longitude;
    let y = point.latitude;
    let mut inside = false;

    let mut j = ring.len().wrapping_sub(1);
    for (i, vi) in ring.iter().enumerate() {
        let vj = &ring[j];
        let (xi, yi) = (vi.longitude, vi.latitude);
        let (xj, yj) = (vj.longitude, vj.latitude);

        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Point-in-polygon test against a zone boundary.
///
/// Fails with [`GeofenceError::InvalidZone`] for a boundary of fewer than
/// three vertices and [`GeofenceError::InvalidCoordinate`] for a bad point.
pub fn is_inside(point: &Coordinate, zone: &Zone) -> Result<bool, GeofenceError> {
    let point = point.validate()?;
    zone.validate()?;
    Ok(ring_contains(&point, &zone.boundary))
}

/// Minimum distance in meters from a point to a zone; zero when inside.
///
/// Never negative and never NaN for a valid point and zone.
pub fn distance_to_polygon_meters(
    point: &Coordinate,
    zone: &Zone,
    mode: DistanceMode,
) -> Result<f64, GeofenceError> {
    if is_inside(point, zone)? {
        return Ok(0.0);
    }

    let distance = match mode {
        DistanceMode::Vertex => zone
            .boundary
            .iter()
            .map(|vertex| distance_meters(point, vertex))
            .fold(f64::INFINITY, f64::min),
        DistanceMode::Edge => {
            let n = zone.boundary.len();
            (0..n)
                .map(|i| {
                    distance_to_segment_meters(
                        point,
                        &zone.boundary[i],
                        &zone.boundary[(i + 1) % n],
                    )
                })
                .fold(f64::INFINITY, f64::min)
        }
    };

    Ok(distance)
}

/// Distance from a point to the segment `a`-`b`.
///
/// Both endpoints are projected to meters east/north of `point`; the closest
/// point on the projected segment gives the distance. Adequate at the
/// kilometer scale of warning radii, not across hemispheres.
fn distance_to_segment_meters(point: &Coordinate, a: &Coordinate, b: &Coordinate) -> f64 {
    let m_per_lon = meters_per_degree_longitude(point.latitude);
    let project = |c: &Coordinate| {
        (
            (c.longitude - point.longitude) * m_per_lon,
            (c.latitude - point.latitude) * METERS_PER_DEGREE_LATITUDE,
        )
    };
    let (ax, ay) = project(a);
    let (bx, by) = project(b);

    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;
    if len_sq < 1e-12 {
        return distance_meters(point, a);
    }

    // Parameter of the foot of the perpendicular from the origin
    let t = (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0);
    let cx = ax + t * dx;
    let cy = ay + t * dy;

    (cx * cx + cy * cy).sqrt()
}
