//! Error types for geofence evaluation

use thiserror::Error;

/// Errors raised by the geometry kernel and the proximity evaluator.
///
/// Every variant is local and recoverable: an invalid zone is dropped from a
/// single evaluation, an invalid coordinate skips a single position update.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeofenceError {
    /// Zone boundary has fewer than three vertices
    #[error("Invalid zone '{id}': expected at least 3 vertices, got {vertices}")]
    InvalidZone { id: String, vertices: usize },

    /// Coordinate is NaN, infinite or outside the WGS84 range
    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
}
