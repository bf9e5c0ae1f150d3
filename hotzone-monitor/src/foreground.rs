//! Foreground evaluation loop.
//!
//! Consumes every position update, applies it to its own
//! [`AlertStateMachine`] and publishes transition events. While the session
//! is critical the loop also owns a repeating re-alert timer; the timer is
//! dropped on downgrade, clear, dismissal and shutdown, so no tick fires after
//! any of those.

use std::future::Future;
use std::time::Duration;

use hotzone_core::{AlertStateMachine, Coordinate, ProximityEvaluator, TransitionEvent, TransitionKind};
use log::{debug, info, warn};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_graceful_shutdown::SubsystemHandle;

use crate::error::MonitorError;
use crate::{MonitorCommand, MonitorSignal, SessionClock};

/// A tick this many intervals late is reported as degraded
const LATE_TICK_FACTOR: u32 = 2;

enum Wakeup {
    Shutdown,
    Position(Option<Coordinate>),
    Command(Option<MonitorCommand>),
    Realert(Instant),
}

pub struct ForegroundMonitor {
    evaluator: ProximityEvaluator,
    machine: AlertStateMachine,
    realert_period: Duration,
    clock: SessionClock,
    rx_position: mpsc::Receiver<Coordinate>,
    rx_command: mpsc::Receiver<MonitorCommand>,
    tx_signal: broadcast::Sender<MonitorSignal>,
}

impl ForegroundMonitor {
    pub(crate) fn new(
        evaluator: ProximityEvaluator,
        realert_period: Duration,
        clock: SessionClock,
        rx_position: mpsc::Receiver<Coordinate>,
        rx_command: mpsc::Receiver<MonitorCommand>,
        tx_signal: broadcast::Sender<MonitorSignal>,
    ) -> Self {
        let realert_ms = u64::try_from(realert_period.as_millis()).unwrap_or(u64::MAX);
        ForegroundMonitor {
            evaluator,
            machine: AlertStateMachine::new(realert_ms),
            realert_period,
            clock,
            rx_position,
            rx_command,
            tx_signal,
        }
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), MonitorError> {
        self.run_until(subsys.on_shutdown_requested()).await
    }

    /// Run until `shutdown` completes. The alert session is torn down on exit.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), MonitorError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut realert: Option<Interval> = None;
        let mut positions_open = true;
        let mut commands_open = true;

        info!("Foreground monitor started");

        loop {
            let wakeup = tokio::select! {
                _ = &mut shutdown => Wakeup::Shutdown,
                position = self.rx_position.recv(), if positions_open => Wakeup::Position(position),
                command = self.rx_command.recv(), if commands_open => Wakeup::Command(command),
                scheduled = next_tick(&mut realert), if realert.is_some() => Wakeup::Realert(scheduled),
            };

            match wakeup {
                Wakeup::Shutdown => {
                    info!("Foreground monitor: shutdown requested");
                    break;
                }
                Wakeup::Position(Some(position)) => self.on_position(position, &mut realert),
                Wakeup::Position(None) => {
                    debug!("Foreground position feed closed");
                    positions_open = false;
                }
                Wakeup::Command(Some(MonitorCommand::Dismiss)) => self.on_dismiss(&mut realert),
                Wakeup::Command(None) => commands_open = false,
                Wakeup::Realert(scheduled) => self.on_realert(scheduled),
            }
        }

        drop(realert);
        self.machine.reset();
        info!("Foreground monitor finished");
        Ok(())
    }

    fn on_position(&mut self, position: Coordinate, realert: &mut Option<Interval>) {
        let assessment = match self.evaluator.assess(&position) {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!("Skipping position update: {}", e);
                return;
            }
        };

        let now_ms = self.clock.now_ms();
        if let Some(event) = self.machine.apply(&assessment, now_ms) {
            *realert = match event.kind {
                TransitionKind::CriticalEntered => self.realert_timer(),
                _ => None,
            };
            self.publish(event, now_ms);
        }
    }

    fn on_dismiss(&mut self, realert: &mut Option<Interval>) {
        *realert = None;
        let now_ms = self.clock.now_ms();
        match self.machine.dismiss(now_ms) {
            Some(event) => self.publish(event, now_ms),
            None => debug!("Dismiss ignored, already safe"),
        }
    }

    fn on_realert(&mut self, scheduled: Instant) {
        let late = Instant::now().saturating_duration_since(scheduled);
        if late > self.realert_period.saturating_mul(LATE_TICK_FACTOR) {
            self.degraded(format!(
                "re-alert tick {} ms late (interval {} ms)",
                late.as_millis(),
                self.realert_period.as_millis()
            ));
        }

        let now_ms = self.clock.now_ms();
        if let Some(event) = self.machine.tick(now_ms) {
            self.publish(event, now_ms);
        }
    }

    /// `None` when the first deadline is past the clock's range
    fn realert_timer(&self) -> Option<Interval> {
        let Some(start) = Instant::now().checked_add(self.realert_period) else {
            self.degraded(format!(
                "re-alert interval {} ms cannot be scheduled",
                self.realert_period.as_millis()
            ));
            return None;
        };
        let mut timer = interval_at(start, self.realert_period);
        // After a stall the next tick is a full period later, matching the
        // state machine's own rescheduling
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(timer)
    }

    fn publish(&mut self, event: TransitionEvent, now_ms: u64) {
        info!("{}: {}", event, event.message);
        match self.tx_signal.send(MonitorSignal::Transition(event)) {
            Ok(_) => self.machine.mark_notified(now_ms),
            Err(_) => debug!("No subscribers for transition event"),
        }
    }

    fn degraded(&self, reason: String) {
        warn!("Capability degraded: {}", reason);
        let _ = self
            .tx_signal
            .send(MonitorSignal::CapabilityDegraded { reason });
    }
}

async fn next_tick(timer: &mut Option<Interval>) -> Instant {
    match timer {
        Some(timer) => timer.tick().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::LogAlarmPlayer;
    use crate::config::MonitorConfig;
    use crate::Session;
    use hotzone_core::{ZoneRegistry, Zone};
    use std::sync::Arc;

    fn session() -> (Session, ForegroundMonitor) {
        session_with(MonitorConfig::default())
    }

    fn session_with(config: MonitorConfig) -> (Session, ForegroundMonitor) {
        let registry = ZoneRegistry::new();
        registry.replace(
            vec![Zone::new(
                "cluster:1",
                vec![
                    Coordinate::new(0.0, 0.0),
                    Coordinate::new(0.0, 0.01),
                    Coordinate::new(0.01, 0.01),
                    Coordinate::new(0.01, 0.0),
                ],
            )
            .unwrap()],
            vec![],
        );
        let (session, tasks) = Session::new(
            config,
            registry,
            Arc::new(LogAlarmPlayer::default()),
        );
        (session, tasks.foreground)
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_armed_only_while_critical() {
        let (session, mut monitor) = session();
        let mut rx = session.subscribe();
        let mut realert = None;

        monitor.on_position(Coordinate::new(0.005, 0.005), &mut realert);
        assert!(realert.is_some());
        assert!(matches!(
            rx.try_recv(),
            Ok(MonitorSignal::Transition(TransitionEvent {
                kind: TransitionKind::CriticalEntered,
                ..
            }))
        ));

        // Still critical: timer kept
        monitor.on_position(Coordinate::new(0.006, 0.006), &mut realert);
        assert!(realert.is_some());

        monitor.on_dismiss(&mut realert);
        assert!(realert.is_none());
        assert!(matches!(
            rx.try_recv(),
            Ok(MonitorSignal::Transition(TransitionEvent {
                kind: TransitionKind::Cleared,
                ..
            }))
        ));

        // Second dismiss publishes nothing
        monitor.on_dismiss(&mut realert);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_position_keeps_state() {
        let (session, mut monitor) = session();
        let mut rx = session.subscribe();
        let mut realert = None;

        monitor.on_position(Coordinate::new(0.005, 0.005), &mut realert);
        let _ = rx.try_recv();

        monitor.on_position(Coordinate::new(f64::NAN, 0.0), &mut realert);
        assert!(rx.try_recv().is_err());
        assert!(realert.is_some());
        assert_eq!(monitor.machine.level(), hotzone_core::AlertLevel::Critical);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_tick_reports_degraded() {
        let (session, mut monitor) = session();
        let mut rx = session.subscribe();
        let mut realert = None;

        monitor.on_position(Coordinate::new(0.005, 0.005), &mut realert);
        let _ = rx.try_recv();

        let scheduled = Instant::now() + Duration::from_secs(10);
        tokio::time::advance(Duration::from_secs(35)).await;
        monitor.on_realert(scheduled);

        assert!(matches!(
            rx.try_recv(),
            Ok(MonitorSignal::CapabilityDegraded { .. })
        ));
        // The collapsed re-alert still fires
        assert!(matches!(
            rx.try_recv(),
            Ok(MonitorSignal::Transition(TransitionEvent {
                kind: TransitionKind::CriticalSustained,
                ..
            }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unschedulable_realert_is_degraded() {
        let config = MonitorConfig {
            realert_interval_ms: u64::MAX,
            ..Default::default()
        };
        let (session, mut monitor) = session_with(config);
        let mut rx = session.subscribe();
        let mut realert = None;

        monitor.on_position(Coordinate::new(0.005, 0.005), &mut realert);
        assert!(realert.is_none());
        assert!(matches!(
            rx.try_recv(),
            Ok(MonitorSignal::CapabilityDegraded { .. })
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(MonitorSignal::Transition(TransitionEvent {
                kind: TransitionKind::CriticalEntered,
                ..
            }))
        ));
    }
}
