//! # Hotzone Core
//!
//! Platform-independent geofence proximity and alerting logic.
//!
//! This crate contains pure geometry and state-machine code with **no I/O and
//! no async runtime**. Every clock is passed in as milliseconds, so the same
//! logic runs unchanged in a foreground loop, a background task or a test.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  hotzone-core (pure, no tokio)                               │
//! │  ├── geo/        (haversine, ray casting, polygon distance)  │
//! │  ├── zone/       (zones, incident points, test hotzone)      │
//! │  ├── registry/   (atomic snapshot swap, proximity filter)    │
//! │  ├── proximity/  (most severe alert for a position)          │
//! │  ├── alert/      (state machine with hysteresis, re-alert)   │
//! │  └── background/ (cooldown-gated notify rule)                │
//! └──────────────────────────────────────────────────────────────┘
//!                               ▲
//!                  ┌────────────┴────────────┐
//!                  │  hotzone-monitor        │
//!                  │  (tokio loops, alarm)   │
//!                  └─────────────────────────┘
//! ```
//!
//! Data flows leaf-first: the [`ZoneRegistry`] supplies a snapshot, the
//! evaluator turns a position into a [`ProximityAssessment`], and the
//! [`AlertStateMachine`] decides whether a [`TransitionEvent`] fires.
//!
//! ## Example
//!
//! ```rust
//! use hotzone_core::{
//!     evaluate, AlertLevel, AlertStateMachine, Coordinate, ProximitySettings, TransitionKind,
//!     Zone,
//! };
//!
//! let square = Zone::new(
//!     "cluster:1",
//!     vec![
//!         Coordinate::new(0.0, 0.0),
//!         Coordinate::new(0.0, 1.0),
//!         Coordinate::new(1.0, 1.0),
//!         Coordinate::new(1.0, 0.0),
//!     ],
//! )
//! .unwrap();
//!
//! let assessment = evaluate(
//!     &Coordinate::new(0.5, 0.5),
//!     &[square],
//!     &[],
//!     &ProximitySettings::default(),
//! )
//! .unwrap();
//! assert_eq!(assessment.level, AlertLevel::Critical);
//!
//! let mut machine = AlertStateMachine::new(10_000);
//! let event = machine.apply(&assessment, 0).unwrap();
//! assert_eq!(event.kind, TransitionKind::CriticalEntered);
//! ```

pub mod alert;
pub mod background;
pub mod error;
pub mod geo;
pub mod proximity;
pub mod registry;
pub mod zone;

pub use alert::{AlertLevel, AlertSession, AlertStateMachine, TransitionEvent, TransitionKind};
pub use background::{BackgroundAlerter, BackgroundNotice, Notification, NotificationPriority};
pub use error::GeofenceError;
pub use geo::{distance_meters, distance_to_polygon_meters, is_inside, Coordinate, DistanceMode};
pub use proximity::{
    check_zone_entry, evaluate, evaluate_snapshot, ProximityAssessment, ProximityEvaluator,
    ProximitySettings, ProximityTarget, TargetKind, ZoneEntry,
};
pub use registry::{filter_by_proximity, ZoneRegistry, ZoneSnapshot};
pub use zone::{IncidentPoint, Zone};
