//! Alert state machine with hysteresis.
//!
//! Turns a stream of [`ProximityAssessment`]s into transition events. Only a
//! change of level fires an event; an unchanged level stays quiet except for
//! the periodic re-alert while critical.
//!
//! # States
//!
//! ```text
//!   from \ to   Safe               Warning               Critical
//!   Safe        -                  WarningEntered        CriticalEntered
//!   Warning     Cleared            -                     CriticalEntered
//!   Critical    Cleared            DowngradedToWarning   CriticalSustained (tick)
//!
//!   dismiss():  Warning | Critical -> Safe, Cleared
//! ```
//!
//! The machine is pure: time is passed in as milliseconds and the host decides
//! when to call [`AlertStateMachine::tick`]. The re-alert deadline only exists
//! while critical, so a tick after a downgrade, clear, dismissal or reset never
//! fires.

use serde::{Deserialize, Serialize};

use crate::proximity::{ProximityAssessment, ProximityTarget, TargetKind, MESSAGE_SAFE};

/// Default interval between Critical-Sustained re-alerts
pub const DEFAULT_REALERT_INTERVAL_MS: u64 = 10_000;

// =============================================================================
// Alert Level
// =============================================================================

/// Severity of a position. Ordered `Safe < Warning < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    #[default]
    Safe,
    Warning,
    Critical,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Safe => write!(f, "safe"),
            AlertLevel::Warning => write!(f, "warning"),
            AlertLevel::Critical => write!(f, "critical"),
        }
    }
}

// =============================================================================
// Transition Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransitionKind {
    /// Any other level to critical
    CriticalEntered,
    /// Still critical after another re-alert interval
    CriticalSustained,
    /// Critical to warning
    DowngradedToWarning,
    /// Safe to warning
    WarningEntered,
    /// Back to safe, by movement or dismissal
    Cleared,
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionKind::CriticalEntered => write!(f, "Critical-Entered"),
            TransitionKind::CriticalSustained => write!(f, "Critical-Sustained"),
            TransitionKind::DowngradedToWarning => write!(f, "Downgraded-To-Warning"),
            TransitionKind::WarningEntered => write!(f, "Warning-Entered"),
            TransitionKind::Cleared => write!(f, "Cleared"),
        }
    }
}

/// Event emitted by the state machine for notification, audio and UI
/// collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEvent {
    pub kind: TransitionKind,
    /// Level after the transition
    pub level: AlertLevel,
    /// Zone or incident point the event concerns. For `Cleared` this is the
    /// target that was left, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_kind: Option<TargetKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
    pub timestamp_ms: u64,
    pub message: String,
}

impl TransitionEvent {
    fn new(
        kind: TransitionKind,
        level: AlertLevel,
        target: Option<&ProximityTarget>,
        message: &str,
        timestamp_ms: u64,
    ) -> Self {
        TransitionEvent {
            kind,
            level,
            target_id: target.map(|t| t.id.clone()),
            target_name: target.map(|t| t.name.clone()),
            target_kind: target.map(|t| t.kind),
            distance_m: target.map(|t| t.distance_m),
            timestamp_ms,
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(name) = &self.target_name {
            write!(f, " [{}]", name)?;
        }
        if let Some(d) = self.distance_m {
            write!(f, " {:.0} m", d)?;
        }
        Ok(())
    }
}

// =============================================================================
// Alert Session
// =============================================================================

/// Per-loop alert history. Each evaluation loop owns its own session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSession {
    pub level: AlertLevel,
    pub last_transition_ms: Option<u64>,
    pub last_notification_ms: Option<u64>,
}

// =============================================================================
// State Machine
// =============================================================================

#[derive(Debug, Clone)]
pub struct AlertStateMachine {
    session: AlertSession,
    realert_interval_ms: u64,
    /// Deadline of the next Critical-Sustained; `Some` only while critical
    next_realert_ms: Option<u64>,
    /// Target and message of the latest assessment at the current level
    target: Option<ProximityTarget>,
    message: String,
}

impl Default for AlertStateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_REALERT_INTERVAL_MS)
    }
}

impl AlertStateMachine {
    /// Create a machine in the `Safe` state. An interval of zero is treated
    /// as one millisecond.
    pub fn new(realert_interval_ms: u64) -> Self {
        AlertStateMachine {
            session: AlertSession::default(),
            realert_interval_ms: realert_interval_ms.max(1),
            next_realert_ms: None,
            target: None,
            message: MESSAGE_SAFE.to_string(),
        }
    }

    pub fn session(&self) -> &AlertSession {
        &self.session
    }

    pub fn level(&self) -> AlertLevel {
        self.session.level
    }

    pub fn realert_interval_ms(&self) -> u64 {
        self.realert_interval_ms
    }

    /// Deadline of the next re-alert, if armed
    pub fn next_realert_ms(&self) -> Option<u64> {
        self.next_realert_ms
    }

    pub fn is_realert_armed(&self) -> bool {
        self.next_realert_ms.is_some()
    }

    /// Feed a fresh assessment. Returns the transition event if the level
    /// changed.
    pub fn apply(
        &mut self,
        assessment: &ProximityAssessment,
        now_ms: u64,
    ) -> Option<TransitionEvent> {
        let previous = self.session.level;
        let next = assessment.level;

        if previous == next {
            // Keep distance and identity fresh for re-alerts
            self.target = assessment.target.clone();
            self.message = assessment.message.clone();
            return None;
        }

        let kind = match (previous, next) {
            (_, AlertLevel::Critical) => TransitionKind::CriticalEntered,
            (AlertLevel::Critical, AlertLevel::Warning) => TransitionKind::DowngradedToWarning,
            (_, AlertLevel::Warning) => TransitionKind::WarningEntered,
            (_, AlertLevel::Safe) => TransitionKind::Cleared,
        };

        // Cleared names the target that was left
        let event_target = match next {
            AlertLevel::Safe => self.target.as_ref(),
            _ => assessment.target.as_ref(),
        };
        let event = TransitionEvent::new(kind, next, event_target, &assessment.message, now_ms);

        self.next_realert_ms = match next {
            AlertLevel::Critical => Some(now_ms.saturating_add(self.realert_interval_ms)),
            _ => None,
        };
        self.session.level = next;
        self.session.last_transition_ms = Some(now_ms);
        self.target = assessment.target.clone();
        self.message = assessment.message.clone();

        log::debug!("Alert {} -> {}: {}", previous, next, event);
        Some(event)
    }

    /// Advance the re-alert clock.
    ///
    /// Returns a Critical-Sustained event when critical and the deadline has
    /// passed. Missed intervals collapse into a single event.
    pub fn tick(&mut self, now_ms: u64) -> Option<TransitionEvent> {
        let deadline = self.next_realert_ms?;
        if self.session.level != AlertLevel::Critical || now_ms < deadline {
            return None;
        }

        let mut next = deadline.saturating_add(self.realert_interval_ms);
        if next <= now_ms {
            next = now_ms.saturating_add(self.realert_interval_ms);
        }
        self.next_realert_ms = Some(next);

        Some(self.sustained_event(now_ms))
    }

    /// Critical-Sustained event for the current target, without touching the
    /// re-alert clock. `None` unless critical.
    pub fn sustained(&self, now_ms: u64) -> Option<TransitionEvent> {
        (self.session.level == AlertLevel::Critical).then(|| self.sustained_event(now_ms))
    }

    fn sustained_event(&self, now_ms: u64) -> TransitionEvent {
        TransitionEvent::new(
            TransitionKind::CriticalSustained,
            AlertLevel::Critical,
            self.target.as_ref(),
            &self.message,
            now_ms,
        )
    }

    /// Force the session back to `Safe` and cancel the re-alert.
    ///
    /// Returns `Cleared` the first time; calling it again while already safe
    /// returns `None`. A later assessment that is still critical re-enters
    /// critical normally.
    pub fn dismiss(&mut self, now_ms: u64) -> Option<TransitionEvent> {
        if self.session.level == AlertLevel::Safe {
            self.next_realert_ms = None;
            return None;
        }

        let event = TransitionEvent::new(
            TransitionKind::Cleared,
            AlertLevel::Safe,
            self.target.as_ref(),
            MESSAGE_SAFE,
            now_ms,
        );
        log::debug!("Alert dismissed at {}", self.session.level);

        self.session.level = AlertLevel::Safe;
        self.session.last_transition_ms = Some(now_ms);
        self.next_realert_ms = None;
        self.target = None;
        self.message = MESSAGE_SAFE.to_string();
        Some(event)
    }

    /// Record that a notification went out for this session
    pub fn mark_notified(&mut self, now_ms: u64) {
        self.session.last_notification_ms = Some(now_ms);
    }

    /// Tear down the session: back to the initial state with no timer armed
    pub fn reset(&mut self) {
        *self = Self::new(self.realert_interval_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proximity::{MESSAGE_INSIDE_ZONE, MESSAGE_NEAR_ZONE};

    fn assess(level: AlertLevel) -> ProximityAssessment {
        match level {
            AlertLevel::Safe => ProximityAssessment::safe(),
            AlertLevel::Warning => ProximityAssessment {
                level,
                target: Some(ProximityTarget {
                    id: "z1".into(),
                    name: "Zone One".into(),
                    kind: TargetKind::Zone,
                    index: 0,
                    distance_m: 240.0,
                }),
                message: MESSAGE_NEAR_ZONE.into(),
            },
            AlertLevel::Critical => ProximityAssessment {
                level,
                target: Some(ProximityTarget {
                    id: "z1".into(),
                    name: "Zone One".into(),
                    kind: TargetKind::Zone,
                    index: 0,
                    distance_m: 0.0,
                }),
                message: MESSAGE_INSIDE_ZONE.into(),
            },
        }
    }

    /// Feed levels one second apart, ticking every 500 ms in between
    fn run(machine: &mut AlertStateMachine, levels: &[AlertLevel]) -> Vec<TransitionKind> {
        let mut kinds = Vec::new();
        let mut now = 0;
        for level in levels {
            if let Some(e) = machine.apply(&assess(*level), now) {
                kinds.push(e.kind);
            }
            for _ in 0..2 {
                now += 500;
                if let Some(e) = machine.tick(now) {
                    kinds.push(e.kind);
                }
            }
        }
        kinds
    }

    #[test]
    fn test_level_ordering() {
        assert!(AlertLevel::Critical > AlertLevel::Warning);
        assert!(AlertLevel::Warning > AlertLevel::Safe);
        assert_eq!(AlertLevel::default(), AlertLevel::Safe);
    }

    #[test]
    fn test_hysteresis_sequence() {
        use AlertLevel::*;
        let mut machine = AlertStateMachine::new(1000);
        let kinds = run(&mut machine, &[Safe, Critical, Critical, Warning, Safe]);
        assert_eq!(
            kinds,
            vec![
                TransitionKind::CriticalEntered,
                TransitionKind::CriticalSustained,
                TransitionKind::CriticalSustained,
                TransitionKind::DowngradedToWarning,
                TransitionKind::Cleared,
            ]
        );
    }

    #[test]
    fn test_no_consecutive_critical_entered() {
        use AlertLevel::*;
        let mut machine = AlertStateMachine::new(10_000);
        let kinds = run(
            &mut machine,
            &[Critical, Critical, Warning, Critical, Critical, Safe, Critical],
        );
        let mut last_entered = false;
        for kind in &kinds {
            match kind {
                TransitionKind::CriticalEntered => {
                    assert!(!last_entered, "double Critical-Entered in {:?}", kinds);
                    last_entered = true;
                }
                TransitionKind::DowngradedToWarning | TransitionKind::Cleared => {
                    last_entered = false
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_unchanged_level_is_quiet() {
        let mut machine = AlertStateMachine::new(10_000);
        assert!(machine.apply(&assess(AlertLevel::Warning), 0).is_some());
        assert!(machine.apply(&assess(AlertLevel::Warning), 100).is_none());
        assert!(machine.apply(&assess(AlertLevel::Safe), 200).is_some());
        assert!(machine.apply(&assess(AlertLevel::Safe), 300).is_none());
        assert_eq!(machine.session().last_transition_ms, Some(200));
    }

    #[test]
    fn test_safe_to_warning_has_no_timer() {
        let mut machine = AlertStateMachine::new(1000);
        let event = machine.apply(&assess(AlertLevel::Warning), 0).unwrap();
        assert_eq!(event.kind, TransitionKind::WarningEntered);
        assert_eq!(event.distance_m, Some(240.0));
        assert!(!machine.is_realert_armed());
        assert!(machine.tick(60_000).is_none());
    }

    #[test]
    fn test_warning_to_critical_enters_critical() {
        let mut machine = AlertStateMachine::new(1000);
        machine.apply(&assess(AlertLevel::Warning), 0);
        let event = machine.apply(&assess(AlertLevel::Critical), 10).unwrap();
        assert_eq!(event.kind, TransitionKind::CriticalEntered);
        assert_eq!(event.target_id.as_deref(), Some("z1"));
        assert_eq!(machine.next_realert_ms(), Some(1010));
    }

    #[test]
    fn test_realert_timing() {
        let mut machine = AlertStateMachine::new(10_000);
        machine.apply(&assess(AlertLevel::Critical), 1_000);

        assert!(machine.tick(10_999).is_none());
        let event = machine.tick(11_000).unwrap();
        assert_eq!(event.kind, TransitionKind::CriticalSustained);
        assert_eq!(event.level, AlertLevel::Critical);
        assert_eq!(event.timestamp_ms, 11_000);
        assert_eq!(machine.next_realert_ms(), Some(21_000));

        // A long stall collapses into one event and reschedules from now
        assert!(machine.tick(75_000).is_some());
        assert!(machine.tick(75_001).is_none());
        assert_eq!(machine.next_realert_ms(), Some(85_000));
    }

    #[test]
    fn test_timer_cancelled_on_downgrade() {
        let mut machine = AlertStateMachine::new(1000);
        machine.apply(&assess(AlertLevel::Critical), 0);
        assert!(machine.is_realert_armed());

        let event = machine.apply(&assess(AlertLevel::Warning), 500).unwrap();
        assert_eq!(event.kind, TransitionKind::DowngradedToWarning);
        assert!(!machine.is_realert_armed());
        assert!(machine.tick(5_000).is_none());
    }

    #[test]
    fn test_cleared_names_target_left() {
        let mut machine = AlertStateMachine::new(1000);
        machine.apply(&assess(AlertLevel::Critical), 0);
        let event = machine.apply(&assess(AlertLevel::Safe), 100).unwrap();
        assert_eq!(event.kind, TransitionKind::Cleared);
        assert_eq!(event.level, AlertLevel::Safe);
        assert_eq!(event.target_id.as_deref(), Some("z1"));
        assert_eq!(event.message, MESSAGE_SAFE);
    }

    #[test]
    fn test_dismiss_idempotent() {
        let mut machine = AlertStateMachine::new(1000);
        machine.apply(&assess(AlertLevel::Critical), 0);

        let first = machine.dismiss(100).unwrap();
        assert_eq!(first.kind, TransitionKind::Cleared);
        let after_once = machine.session().clone();

        assert!(machine.dismiss(200).is_none());
        assert_eq!(machine.session(), &after_once);
        assert_eq!(machine.level(), AlertLevel::Safe);
        assert!(machine.tick(10_000).is_none());
    }

    #[test]
    fn test_critical_after_dismiss_reenters() {
        let mut machine = AlertStateMachine::new(1000);
        machine.apply(&assess(AlertLevel::Critical), 0);
        machine.dismiss(100);
        let event = machine.apply(&assess(AlertLevel::Critical), 200).unwrap();
        assert_eq!(event.kind, TransitionKind::CriticalEntered);
    }

    #[test]
    fn test_reset_cancels_timer() {
        let mut machine = AlertStateMachine::new(1000);
        machine.apply(&assess(AlertLevel::Critical), 0);
        machine.mark_notified(0);
        machine.reset();

        assert_eq!(machine.session(), &AlertSession::default());
        assert!(!machine.is_realert_armed());
        assert!(machine.tick(1_000_000).is_none());
        assert_eq!(machine.realert_interval_ms(), 1000);
    }

    #[test]
    fn test_event_json_shape() {
        let mut machine = AlertStateMachine::new(1000);
        let event = machine.apply(&assess(AlertLevel::Critical), 42).unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "criticalEntered");
        assert_eq!(json["level"], "critical");
        assert_eq!(json["targetId"], "z1");
        assert_eq!(json["timestampMs"], 42);
    }
}
