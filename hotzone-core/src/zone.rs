//! Danger Zone Definitions
//!
//! Polygon zones derived from crime clusters and discrete incident points.

use serde::{Deserialize, Serialize};

use crate::error::GeofenceError;
use crate::geo::Coordinate;

/// Identity prefix reserved for synthetic (test-injected) zones
pub const SYNTHETIC_ID_PREFIX: &str = "test:";

/// Identity of the zone produced by [`Zone::test_hotzone`]
pub const TEST_HOTZONE_ID: &str = "test:hotzone";

/// Half-height of the test hotzone in degrees latitude (~500 m)
const TEST_HOTZONE_LAT_RADIUS: f64 = 0.0045;
/// Half-width of the test hotzone in degrees longitude (~500 m at 33°N)
const TEST_HOTZONE_LON_RADIUS: f64 = 0.0054;

/// Polygon-bounded danger area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    /// Stable zone identifier
    pub id: String,
    /// Optional display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Boundary vertices; the ring is closed implicitly
    pub boundary: Vec<Coordinate>,
}

impl Zone {
    /// Create a zone, rejecting boundaries with fewer than three vertices
    pub fn new(id: impl Into<String>, boundary: Vec<Coordinate>) -> Result<Self, GeofenceError> {
        let zone = Zone {
            id: id.into(),
            name: None,
            boundary,
        };
        zone.validate()?;
        Ok(zone)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Check the boundary vertex count.
    ///
    /// Self-intersection is not detected; ray casting still answers for such
    /// rings but the answer has no geometric meaning.
    pub fn validate(&self) -> Result<(), GeofenceError> {
        if self.boundary.len() < 3 {
            return Err(GeofenceError::InvalidZone {
                id: self.id.clone(),
                vertices: self.boundary.len(),
            });
        }
        Ok(())
    }

    /// True for zones in the reserved synthetic namespace
    pub fn is_synthetic(&self) -> bool {
        self.id.starts_with(SYNTHETIC_ID_PREFIX)
    }

    /// Generate a square test hotzone around `center`.
    ///
    /// The square spans about 1 km on each side at mid latitudes and lives in
    /// the synthetic namespace, so it flows through the registry like any
    /// other zone.
    pub fn test_hotzone(center: &Coordinate) -> Self {
        let lat = center.latitude;
        let lon = center.longitude;
        Zone {
            id: TEST_HOTZONE_ID.to_string(),
            name: Some("TEST HOTZONE".to_string()),
            boundary: vec![
                Coordinate::new(lat + TEST_HOTZONE_LAT_RADIUS, lon - TEST_HOTZONE_LON_RADIUS), // NW
                Coordinate::new(lat + TEST_HOTZONE_LAT_RADIUS, lon + TEST_HOTZONE_LON_RADIUS), // NE
                Coordinate::new(lat - TEST_HOTZONE_LAT_RADIUS, lon + TEST_HOTZONE_LON_RADIUS), // SE
                Coordinate::new(lat - TEST_HOTZONE_LAT_RADIUS, lon - TEST_HOTZONE_LON_RADIUS), // SW
            ],
        }
    }
}

/// Single-coordinate danger marker not aggregated into a zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentPoint {
    /// Stable incident identifier
    pub id: String,
    /// Optional display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Incident location
    pub location: Coordinate,
}

impl IncidentPoint {
    pub fn new(id: impl Into<String>, location: Coordinate) -> Self {
        IncidentPoint {
            id: id.into(),
            name: None,
            location,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
