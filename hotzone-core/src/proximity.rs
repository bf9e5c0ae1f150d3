//! Proximity Evaluator
//!
//! Ranks a position against every zone and incident point and returns the
//! single most severe alert with supporting detail.
//!
//! Evaluation order:
//!
//! 1. Containment. Zones are scanned in input order and the first zone that
//!    contains the position wins with level `Critical`, distance 0.
//! 2. Nearest candidate. Zones are scanned before incident points; a
//!    candidate replaces the current best only when strictly closer, so the
//!    first one seen wins an exact tie. Incident points farther than their own
//!    cutoff are not candidates at all.
//! 3. Classification by the cutoff of the winning candidate's kind.

use serde::{Deserialize, Serialize};

use crate::alert::AlertLevel;
use crate::error::GeofenceError;
use crate::geo::{distance_meters, distance_to_polygon_meters, ring_contains, Coordinate, DistanceMode};
use crate::registry::{filter_by_proximity, ZoneRegistry, ZoneSnapshot};
use crate::zone::{IncidentPoint, Zone};

pub const MESSAGE_INSIDE_ZONE: &str = "You are inside a crime hotspot zone!";
pub const MESSAGE_NEAR_ZONE: &str = "You are near a crime zone";
pub const MESSAGE_NEAR_INCIDENT: &str = "You are near a crime incident location";
pub const MESSAGE_SAFE: &str = "You are in a safe area";

const DEFAULT_CRITICAL_ZONE_NAME: &str = "Crime Hotspot";
const DEFAULT_WARNING_ZONE_NAME: &str = "Crime Zone";
const DEFAULT_INCIDENT_NAME: &str = "Crime Incident";

/// Distance thresholds for classifying a position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximitySettings {
    /// Extra distance outside a zone that still counts as critical.
    /// Zero means only a position strictly inside a zone is critical.
    pub critical_radius_m: f64,
    /// Warning cutoff for zones
    pub warning_radius_m: f64,
    /// Warning cutoff for incident points
    pub point_warning_radius_m: f64,
    /// How zone distance is measured
    pub distance_mode: DistanceMode,
}

impl Default for ProximitySettings {
    fn default() -> Self {
        ProximitySettings {
            critical_radius_m: 0.0,
            warning_radius_m: 500.0,
            point_warning_radius_m: 1000.0,
            distance_mode: DistanceMode::Vertex,
        }
    }
}

impl ProximitySettings {
    /// Settings with the given zone warning radius and defaults elsewhere
    pub fn with_warning_radius(warning_radius_m: f64) -> Self {
        ProximitySettings {
            warning_radius_m,
            ..Default::default()
        }
    }
}

/// Whether an alert target is a zone or an incident point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetKind {
    Zone,
    IncidentPoint,
}

/// The zone or incident point an assessment refers to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityTarget {
    /// Identity of the zone or incident point
    pub id: String,
    /// Display name, with a default filled in for unnamed targets
    pub name: String,
    /// Zone or incident point
    pub kind: TargetKind,
    /// Index in the evaluated input sequence
    pub index: usize,
    /// Distance in meters, rounded to the nearest meter; 0 when inside
    pub distance_m: f64,
}

/// Result of evaluating one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityAssessment {
    pub level: AlertLevel,
    /// Present unless the level is `Safe`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<ProximityTarget>,
    pub message: String,
}

impl ProximityAssessment {
    pub fn safe() -> Self {
        ProximityAssessment {
            level: AlertLevel::Safe,
            target: None,
            message: MESSAGE_SAFE.to_string(),
        }
    }

    pub fn distance_m(&self) -> Option<f64> {
        self.target.as_ref().map(|t| t.distance_m)
    }

    pub fn is_incident_point(&self) -> bool {
        matches!(
            self.target,
            Some(ProximityTarget {
                kind: TargetKind::IncidentPoint,
                ..
            })
        )
    }
}

/// Nearest candidate found while scanning
struct Candidate {
    kind: TargetKind,
    index: usize,
    distance_m: f64,
}

/// Evaluate a position against zones and incident points.
///
/// Pure and deterministic: identical input yields an identical result.
/// Zones that fail validation are skipped for this evaluation only, as are
/// incident points with invalid coordinates. An invalid position fails with
/// [`GeofenceError::InvalidCoordinate`]. Empty input yields `Safe`.
pub fn evaluate(
    position: &Coordinate,
    zones: &[Zone],
    points: &[IncidentPoint],
    settings: &ProximitySettings,
) -> Result<ProximityAssessment, GeofenceError> {
    let position = position.validate()?;

    let mut valid = Vec::with_capacity(zones.len());
    for (index, zone) in zones.iter().enumerate() {
        match zone.validate() {
            Ok(()) => valid.push((index, zone)),
            Err(e) => log::warn!("Skipping zone during evaluation: {}", e),
        }
    }

    for &(index, zone) in &valid {
        if ring_contains(&position, &zone.boundary) {
            log::trace!("{} inside zone '{}'", position, zone.id);
            return Ok(critical(zone, index, 0.0));
        }
    }

    let mut best: Option<Candidate> = None;

    for &(index, zone) in &valid {
        let distance_m = distance_to_polygon_meters(&position, zone, settings.distance_mode)?;
        if best.as_ref().map_or(true, |b| distance_m < b.distance_m) {
            best = Some(Candidate {
                kind: TargetKind::Zone,
                index,
                distance_m,
            });
        }
    }

    for (index, point) in points.iter().enumerate() {
        if !point.location.is_valid() {
            log::warn!(
                "Skipping incident point '{}' with invalid location {}",
                point.id,
                point.location
            );
            continue;
        }
        let distance_m = distance_meters(&position, &point.location);
        if distance_m > settings.point_warning_radius_m {
            continue;
        }
        if best.as_ref().map_or(true, |b| distance_m < b.distance_m) {
            best = Some(Candidate {
                kind: TargetKind::IncidentPoint,
                index,
                distance_m,
            });
        }
    }

    let Some(best) = best else {
        return Ok(ProximityAssessment::safe());
    };

    let assessment = match best.kind {
        TargetKind::Zone => {
            let zone = &zones[best.index];
            // Boundary points that ray casting puts outside stay warnings at
            // radius zero
            let within_critical_radius =
                settings.critical_radius_m > 0.0 && best.distance_m <= settings.critical_radius_m;
            if within_critical_radius {
                critical(zone, best.index, best.distance_m.round())
            } else if best.distance_m <= settings.warning_radius_m {
                ProximityAssessment {
                    level: AlertLevel::Warning,
                    target: Some(ProximityTarget {
                        id: zone.id.clone(),
                        name: zone
                            .name
                            .clone()
                            .unwrap_or_else(|| DEFAULT_WARNING_ZONE_NAME.to_string()),
                        kind: TargetKind::Zone,
                        index: best.index,
                        distance_m: best.distance_m.round(),
                    }),
                    message: MESSAGE_NEAR_ZONE.to_string(),
                }
            } else {
                ProximityAssessment::safe()
            }
        }
        TargetKind::IncidentPoint => {
            // Already within the point cutoff, or it would not be a candidate
            let point = &points[best.index];
            ProximityAssessment {
                level: AlertLevel::Warning,
                target: Some(ProximityTarget {
                    id: point.id.clone(),
                    name: point
                        .name
                        .clone()
                        .unwrap_or_else(|| DEFAULT_INCIDENT_NAME.to_string()),
                    kind: TargetKind::IncidentPoint,
                    index: best.index,
                    distance_m: best.distance_m.round(),
                }),
                message: MESSAGE_NEAR_INCIDENT.to_string(),
            }
        }
    };

    log::trace!("{} assessed {:?}", position, assessment.level);
    Ok(assessment)
}

/// Evaluate a position against a registry snapshot
pub fn evaluate_snapshot(
    position: &Coordinate,
    snapshot: &ZoneSnapshot,
    settings: &ProximitySettings,
) -> Result<ProximityAssessment, GeofenceError> {
    evaluate(position, &snapshot.zones, &snapshot.points, settings)
}

/// Evaluates positions against the live registry snapshot.
///
/// Each call takes the current snapshot once, so a concurrent
/// [`ZoneRegistry::replace`] is seen either fully or not at all.
#[derive(Debug, Clone)]
pub struct ProximityEvaluator {
    registry: ZoneRegistry,
    settings: ProximitySettings,
    proximity_filter_km: Option<f64>,
}

impl ProximityEvaluator {
    pub fn new(registry: ZoneRegistry, settings: ProximitySettings) -> Self {
        ProximityEvaluator {
            registry,
            settings,
            proximity_filter_km: None,
        }
    }

    /// Only evaluate zones with a vertex within `radius_km` of the position
    pub fn with_proximity_filter(mut self, radius_km: Option<f64>) -> Self {
        self.proximity_filter_km = radius_km;
        self
    }

    pub fn settings(&self) -> &ProximitySettings {
        &self.settings
    }

    pub fn registry(&self) -> &ZoneRegistry {
        &self.registry
    }

    pub fn assess(&self, position: &Coordinate) -> Result<ProximityAssessment, GeofenceError> {
        let position = position.validate()?;
        let snapshot = self.registry.snapshot();
        match self.proximity_filter_km {
            Some(radius_km) => {
                let zones: Vec<Zone> = filter_by_proximity(&snapshot.zones, &position, radius_km)
                    .into_iter()
                    .cloned()
                    .collect();
                evaluate(&position, &zones, &snapshot.points, &self.settings)
            }
            None => evaluate_snapshot(&position, &snapshot, &self.settings),
        }
    }
}

fn critical(zone: &Zone, index: usize, distance_m: f64) -> ProximityAssessment {
    ProximityAssessment {
        level: AlertLevel::Critical,
        target: Some(ProximityTarget {
            id: zone.id.clone(),
            name: zone
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_CRITICAL_ZONE_NAME.to_string()),
            kind: TargetKind::Zone,
            index,
            distance_m,
        }),
        message: MESSAGE_INSIDE_ZONE.to_string(),
    }
}

/// First zone containing the position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneEntry {
    pub index: usize,
    pub id: String,
}

/// Simple entered/not-entered check: the first valid zone containing the
/// position, or `None`.
pub fn check_zone_entry(
    position: &Coordinate,
    zones: &[Zone],
) -> Result<Option<ZoneEntry>, GeofenceError> {
    let position = position.validate()?;
    Ok(zones
        .iter()
        .enumerate()
        .filter(|(_, zone)| zone.validate().is_ok())
        .find(|(_, zone)| ring_contains(&position, &zone.boundary))
        .map(|(index, zone)| ZoneEntry {
            index,
            id: zone.id.clone(),
        }))
}
