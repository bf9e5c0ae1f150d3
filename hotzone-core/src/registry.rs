//! Zone Registry
//!
//! Holds the current snapshot of zones and incident points. Readers take a
//! cheap `Arc` clone of the snapshot and never observe a half-updated set;
//! writers build a new snapshot and swap it in whole.
//!
//! ```text
//!   data refresh ──replace()──►  Arc<RwLock<Arc<ZoneSnapshot>>>
//!                                   │              │
//!                        snapshot() │              │ snapshot()
//!                                   ▼              ▼
//!                           foreground loop   background loop
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use crate::geo::{distance_meters, Coordinate};
use crate::zone::{IncidentPoint, Zone};

/// Immutable view of the zones and incident points at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneSnapshot {
    /// Danger zones in evaluation order
    pub zones: Vec<Zone>,
    /// Discrete incident points in evaluation order
    pub points: Vec<IncidentPoint>,
    /// Incremented on every swap; zero for the initial empty snapshot
    pub generation: u64,
}

impl ZoneSnapshot {
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty() && self.points.is_empty()
    }

    /// Zones with at least one vertex within `radius_km` of `reference`
    pub fn zones_near(&self, reference: &Coordinate, radius_km: f64) -> Vec<Zone> {
        filter_by_proximity(&self.zones, reference, radius_km)
            .into_iter()
            .cloned()
            .collect()
    }
}

/// Keep zones that have any boundary vertex within `radius_km` of `reference`.
///
/// A zone whose centroid is far away is still kept when one of its vertices
/// is close. Input order is preserved.
pub fn filter_by_proximity<'a>(
    zones: &'a [Zone],
    reference: &Coordinate,
    radius_km: f64,
) -> Vec<&'a Zone> {
    let radius_m = radius_km * 1000.0;
    zones
        .iter()
        .filter(|zone| {
            zone.boundary
                .iter()
                .any(|vertex| distance_meters(reference, vertex) <= radius_m)
        })
        .collect()
}

/// Thread-safe owner of the authoritative zone snapshot.
///
/// Cloning the registry shares the same snapshot slot.
#[derive(Debug, Clone, Default)]
pub struct ZoneRegistry {
    current: Arc<RwLock<Arc<ZoneSnapshot>>>,
}

impl ZoneRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<ZoneSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the whole snapshot.
    ///
    /// Synthetic zones already registered are carried over unless the new
    /// zone set supplies its own synthetic zones.
    pub fn replace(&self, zones: Vec<Zone>, points: Vec<IncidentPoint>) -> u64 {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);

        let mut zones = zones;
        if !zones.iter().any(Zone::is_synthetic) {
            zones.extend(current.zones.iter().filter(|z| z.is_synthetic()).cloned());
        }

        let generation = current.generation + 1;
        log::debug!(
            "Zone registry generation {}: {} zones, {} incident points",
            generation,
            zones.len(),
            points.len()
        );
        *current = Arc::new(ZoneSnapshot {
            zones,
            points,
            generation,
        });
        generation
    }

    /// Add a synthetic zone, replacing any synthetic zone with the same id.
    ///
    /// Zones outside the synthetic namespace are refused and `None` returned.
    pub fn merge_synthetic(&self, zone: Zone) -> Option<u64> {
        if !zone.is_synthetic() {
            log::warn!("Refusing to merge non-synthetic zone '{}'", zone.id);
            return None;
        }

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut zones: Vec<Zone> = current
            .zones
            .iter()
            .filter(|z| z.id != zone.id)
            .cloned()
            .collect();
        log::debug!("Merging synthetic zone '{}'", zone.id);
        zones.push(zone);

        let generation = current.generation + 1;
        *current = Arc::new(ZoneSnapshot {
            zones,
            points: current.points.clone(),
            generation,
        });
        Some(generation)
    }

    /// Remove every synthetic zone, returning how many were removed
    pub fn clear_synthetic(&self) -> usize {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let before = current.zones.len();
        let zones: Vec<Zone> = current
            .zones
            .iter()
            .filter(|z| !z.is_synthetic())
            .cloned()
            .collect();
        let removed = before - zones.len();
        if removed > 0 {
            let generation = current.generation + 1;
            *current = Arc::new(ZoneSnapshot {
                zones,
                points: current.points.clone(),
                generation,
            });
        }
        removed
    }

    /// Zones with at least one vertex within `radius_km` of `reference`.
    ///
    /// Works on a copy; the authoritative snapshot is untouched.
    pub fn filter_by_proximity(&self, reference: &Coordinate, radius_km: f64) -> Vec<Zone> {
        self.snapshot().zones_near(reference, radius_km)
    }
}
