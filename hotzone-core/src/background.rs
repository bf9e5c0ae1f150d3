//! Background evaluation rule.
//!
//! The background loop runs on a periodic trigger, independent of any
//! foreground session. It owns its own [`AlertStateMachine`] and its own
//! notification cooldown, and maps each notify decision to a
//! [`Notification`] the OS-notification collaborator can render.
//!
//! Notify when:
//! - the level changed since the previous background evaluation, or
//! - the level is still critical and the cooldown has elapsed since the last
//!   notification.
//!
//! A session that has only ever been safe never notifies.

use serde::{Deserialize, Serialize};

use crate::alert::{AlertLevel, AlertStateMachine, TransitionEvent, TransitionKind};
use crate::proximity::ProximityAssessment;

/// Default minimum time between repeated critical notifications
pub const DEFAULT_NOTIFICATION_COOLDOWN_MS: u64 = 30_000;

const CRITICAL_VIBRATION_MS: [u64; 4] = [0, 500, 200, 500];
const WARNING_VIBRATION_MS: [u64; 3] = [0, 250, 250];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Default,
    High,
    Max,
}

/// Platform-neutral description of an OS notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub priority: NotificationPriority,
    pub sound: bool,
    /// Alternating off/on durations in milliseconds; empty for none
    pub vibration: Vec<u64>,
}

impl Notification {
    /// Build the notification for a transition event
    pub fn for_event(event: &TransitionEvent) -> Self {
        let name = event.target_name.as_deref().unwrap_or("a crime area");
        match event.level {
            AlertLevel::Critical => Notification {
                title: "DANGER! CRIME HOTSPOT ALERT!".to_string(),
                body: format!("You are inside {}! Leave immediately for your safety!", name),
                priority: NotificationPriority::Max,
                sound: true,
                vibration: CRITICAL_VIBRATION_MS.to_vec(),
            },
            AlertLevel::Warning => {
                let body = match event.distance_m {
                    Some(d) => format!(
                        "You are {:.0}m from {}. Stay alert and avoid the area.",
                        d, name
                    ),
                    None => format!("You are near {}. Stay alert and avoid the area.", name),
                };
                Notification {
                    title: "Warning: Approaching Crime Zone".to_string(),
                    body,
                    priority: NotificationPriority::High,
                    sound: true,
                    vibration: WARNING_VIBRATION_MS.to_vec(),
                }
            }
            AlertLevel::Safe => Notification {
                title: "Safe Zone".to_string(),
                body: "You are now in a safe area.".to_string(),
                priority: NotificationPriority::Default,
                sound: false,
                vibration: Vec::new(),
            },
        }
    }
}

/// A notify decision from the background rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundNotice {
    pub event: TransitionEvent,
    pub notification: Notification,
}

/// Background alert session with its own cooldown clock
#[derive(Debug, Clone)]
pub struct BackgroundAlerter {
    machine: AlertStateMachine,
    cooldown_ms: u64,
}

impl Default for BackgroundAlerter {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_COOLDOWN_MS)
    }
}

impl BackgroundAlerter {
    pub fn new(cooldown_ms: u64) -> Self {
        BackgroundAlerter {
            // The background path never ticks; its repeats come from the cooldown
            machine: AlertStateMachine::new(cooldown_ms),
            cooldown_ms,
        }
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    pub fn level(&self) -> AlertLevel {
        self.machine.level()
    }

    pub fn last_notification_ms(&self) -> Option<u64> {
        self.machine.session().last_notification_ms
    }

    fn cooldown_elapsed(&self, now_ms: u64) -> bool {
        match self.last_notification_ms() {
            Some(last) => now_ms.saturating_sub(last) > self.cooldown_ms,
            None => true,
        }
    }

    /// Apply one background evaluation and decide whether to notify
    pub fn evaluate(
        &mut self,
        assessment: &ProximityAssessment,
        now_ms: u64,
    ) -> Option<BackgroundNotice> {
        let event = match self.machine.apply(assessment, now_ms) {
            Some(event) => event,
            None if self.cooldown_elapsed(now_ms) => self.machine.sustained(now_ms)?,
            None => return None,
        };

        self.machine.mark_notified(now_ms);
        let notification = Notification::for_event(&event);
        log::debug!(
            "Background notify {} ({:?} priority)",
            event,
            notification.priority
        );
        Some(BackgroundNotice {
            event,
            notification,
        })
    }

    /// Tear down the background session
    pub fn reset(&mut self) {
        self.machine.reset();
    }
}

impl BackgroundNotice {
    pub fn is_repeat(&self) -> bool {
        self.event.kind == TransitionKind::CriticalSustained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proximity::{ProximityTarget, TargetKind, MESSAGE_INSIDE_ZONE, MESSAGE_NEAR_ZONE};

    fn assess(level: AlertLevel) -> ProximityAssessment {
        let target = |distance_m| ProximityTarget {
            id: "cluster:3".into(),
            name: "Cluster 3".into(),
            kind: TargetKind::Zone,
            index: 0,
            distance_m,
        };
        match level {
            AlertLevel::Safe => ProximityAssessment::safe(),
            AlertLevel::Warning => ProximityAssessment {
                level,
                target: Some(target(320.0)),
                message: MESSAGE_NEAR_ZONE.into(),
            },
            AlertLevel::Critical => ProximityAssessment {
                level,
                target: Some(target(0.0)),
                message: MESSAGE_INSIDE_ZONE.into(),
            },
        }
    }

    #[test]
    fn test_safe_only_never_notifies() {
        let mut alerter = BackgroundAlerter::default();
        for t in (0..200_000).step_by(5_000) {
            assert!(alerter.evaluate(&assess(AlertLevel::Safe), t).is_none());
        }
        assert_eq!(alerter.last_notification_ms(), None);
    }

    #[test]
    fn test_critical_cooldown() {
        let mut alerter = BackgroundAlerter::new(30_000);

        let first = alerter.evaluate(&assess(AlertLevel::Critical), 0).unwrap();
        assert_eq!(first.event.kind, TransitionKind::CriticalEntered);
        assert!(!first.is_repeat());
        assert_eq!(first.notification.priority, NotificationPriority::Max);
        assert!(first.notification.body.contains("Cluster 3"));

        // Inside the cooldown: quiet
        for t in [5_000, 15_000, 30_000] {
            assert!(alerter.evaluate(&assess(AlertLevel::Critical), t).is_none());
        }

        let repeat = alerter.evaluate(&assess(AlertLevel::Critical), 30_001).unwrap();
        assert!(repeat.is_repeat());
        assert_eq!(alerter.last_notification_ms(), Some(30_001));
    }

    #[test]
    fn test_level_change_bypasses_cooldown() {
        let mut alerter = BackgroundAlerter::new(30_000);
        alerter.evaluate(&assess(AlertLevel::Critical), 0);

        let down = alerter.evaluate(&assess(AlertLevel::Warning), 1_000).unwrap();
        assert_eq!(down.event.kind, TransitionKind::DowngradedToWarning);
        assert_eq!(down.notification.priority, NotificationPriority::High);
        assert!(down.notification.body.contains("320m"));

        // Warning does not repeat
        assert!(alerter.evaluate(&assess(AlertLevel::Warning), 100_000).is_none());

        let safe = alerter.evaluate(&assess(AlertLevel::Safe), 100_500).unwrap();
        assert_eq!(safe.event.kind, TransitionKind::Cleared);
        assert_eq!(safe.notification.priority, NotificationPriority::Default);
        assert!(!safe.notification.sound);
        assert!(safe.notification.vibration.is_empty());
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut alerter = BackgroundAlerter::new(30_000);
        alerter.evaluate(&assess(AlertLevel::Critical), 0);
        alerter.reset();
        assert_eq!(alerter.level(), AlertLevel::Safe);
        assert_eq!(alerter.last_notification_ms(), None);
        assert!(alerter.evaluate(&assess(AlertLevel::Critical), 1).is_some());
    }
}
