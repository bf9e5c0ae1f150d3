//! Cluster snapshot loading.
//!
//! Normalises the cluster service response into [`Zone`]s and
//! [`IncidentPoint`]s before they reach the registry:
//!
//! ```json
//! {
//!   "clusters": [
//!     { "cluster_id": 4, "boundary": [{ "point_id": "a", "longitude": 73.0, "latitude": 33.6 }] }
//!   ],
//!   "outliers": [{ "id": "o1", "latitude": 33.7, "longitude": 73.1, "title": "Theft" }]
//! }
//! ```

use std::fs;
use std::path::Path;

use hotzone_core::{Coordinate, IncidentPoint, Zone};
use log::{info, warn};
use serde::Deserialize;

use crate::error::MonitorError;

#[derive(Debug, Deserialize)]
struct ClusterResponse {
    #[serde(default)]
    clusters: Vec<ApiCluster>,
    #[serde(default)]
    outliers: Vec<ApiOutlier>,
}

#[derive(Debug, Deserialize)]
struct ApiCluster {
    cluster_id: serde_json::Value,
    #[serde(default)]
    boundary: Vec<ApiBoundaryPoint>,
}

#[derive(Debug, Deserialize)]
struct ApiBoundaryPoint {
    longitude: f64,
    latitude: f64,
}

#[derive(Debug, Deserialize)]
struct ApiOutlier {
    #[serde(default)]
    id: Option<serde_json::Value>,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    title: Option<String>,
}

/// Zones and incident points ready for [`hotzone_core::ZoneRegistry::replace`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneData {
    pub zones: Vec<Zone>,
    pub points: Vec<IncidentPoint>,
}

/// Render a JSON id (number or string) without quotes
fn id_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a cluster response. Clusters with fewer than three boundary points
/// are skipped with a warning.
pub fn parse_clusters(json: &str) -> Result<ZoneData, MonitorError> {
    let response: ClusterResponse =
        serde_json::from_str(json).map_err(|e| MonitorError::InvalidSnapshot(e.to_string()))?;

    let mut zones = Vec::with_capacity(response.clusters.len());
    for cluster in response.clusters {
        let cluster_id = id_text(&cluster.cluster_id);
        let boundary = cluster
            .boundary
            .iter()
            .map(|p| Coordinate::new(p.latitude, p.longitude))
            .collect();
        match Zone::new(format!("cluster:{}", cluster_id), boundary) {
            Ok(zone) => zones.push(zone.with_name(format!("Cluster {}", cluster_id))),
            Err(e) => warn!("Skipping cluster {}: {}", cluster_id, e),
        }
    }

    let points = response
        .outliers
        .into_iter()
        .enumerate()
        .map(|(n, outlier)| {
            let id = match &outlier.id {
                Some(id) => format!("outlier:{}", id_text(id)),
                None => format!("outlier:{}", n),
            };
            let point = IncidentPoint::new(id, Coordinate::new(outlier.latitude, outlier.longitude));
            match outlier.title {
                Some(title) => point.with_name(title),
                None => point,
            }
        })
        .collect();

    Ok(ZoneData { zones, points })
}

/// Load a cluster response from a file
pub fn load_snapshot(path: &Path) -> Result<ZoneData, MonitorError> {
    let text = fs::read_to_string(path).map_err(|e| MonitorError::io(path, e))?;
    let data = parse_clusters(&text)?;
    info!(
        "Loaded {} clusters and {} incident points from {}",
        data.zones.len(),
        data.points.len(),
        path.display()
    );
    Ok(data)
}
