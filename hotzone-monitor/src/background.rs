//! Background evaluation loop.
//!
//! Wakes on a fixed period, evaluates the latest known position and applies
//! the cooldown-gated notify rule of [`BackgroundAlerter`]. Runs independently
//! of the foreground loop and keeps its own alert session.

use std::future::Future;
use std::time::Duration;

use hotzone_core::{BackgroundAlerter, Coordinate, ProximityEvaluator};
use log::{debug, info, warn};
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, MissedTickBehavior};
use tokio_graceful_shutdown::SubsystemHandle;

use crate::error::MonitorError;
use crate::{MonitorSignal, SessionClock};

pub struct BackgroundMonitor {
    evaluator: ProximityEvaluator,
    alerter: BackgroundAlerter,
    period: Duration,
    clock: SessionClock,
    rx_latest: watch::Receiver<Option<Coordinate>>,
    tx_signal: broadcast::Sender<MonitorSignal>,
}

impl BackgroundMonitor {
    pub(crate) fn new(
        evaluator: ProximityEvaluator,
        period: Duration,
        cooldown_ms: u64,
        clock: SessionClock,
        rx_latest: watch::Receiver<Option<Coordinate>>,
        tx_signal: broadcast::Sender<MonitorSignal>,
    ) -> Self {
        BackgroundMonitor {
            evaluator,
            alerter: BackgroundAlerter::new(cooldown_ms),
            period,
            clock,
            rx_latest,
            tx_signal,
        }
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), MonitorError> {
        self.run_until(subsys.on_shutdown_requested()).await
    }

    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), MonitorError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut trigger = interval(self.period);
        trigger.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Background monitor started, every {} ms",
            self.period.as_millis()
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Background monitor: shutdown requested");
                    break;
                }
                _ = trigger.tick() => self.evaluate_latest(),
            }
        }

        self.alerter.reset();
        info!("Background monitor finished");
        Ok(())
    }

    fn evaluate_latest(&mut self) {
        let Some(position) = *self.rx_latest.borrow() else {
            debug!("Background trigger without a position");
            return;
        };

        let assessment = match self.evaluator.assess(&position) {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!("Background evaluation skipped: {}", e);
                return;
            }
        };

        if let Some(notice) = self.alerter.evaluate(&assessment, self.clock.now_ms()) {
            info!(
                "Background notification: {} - {}",
                notice.notification.title, notice.notification.body
            );
            let _ = self.tx_signal.send(MonitorSignal::Notification(notice));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::LogAlarmPlayer;
    use crate::config::MonitorConfig;
    use crate::Session;
    use hotzone_core::{AlertLevel, Zone, ZoneRegistry};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_no_position_no_notice() {
        let (session, tasks) = Session::new(
            MonitorConfig::default(),
            ZoneRegistry::new(),
            Arc::new(LogAlarmPlayer::default()),
        );
        let mut rx = session.subscribe();
        let mut monitor = tasks.background;

        monitor.evaluate_latest();
        assert!(rx.try_recv().is_err());
        assert_eq!(monitor.alerter.level(), AlertLevel::Safe);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_position_is_used() {
        let registry = ZoneRegistry::new();
        let (session, tasks) = Session::new(
            MonitorConfig::default(),
            registry,
            Arc::new(LogAlarmPlayer::default()),
        );
        let center = Coordinate::new(33.6844, 73.0479);
        session.inject_test_hotzone(&center);
        let mut rx = session.subscribe();
        let mut monitor = tasks.background;

        // Only the newest position matters to the background loop
        session.inner.tx_latest.send_replace(Some(Coordinate::new(0.0, 0.0)));
        session.inner.tx_latest.send_replace(Some(center));
        monitor.evaluate_latest();

        match rx.try_recv() {
            Ok(MonitorSignal::Notification(notice)) => {
                assert_eq!(notice.event.level, AlertLevel::Critical);
                assert_eq!(
                    notice.event.target_id.as_deref(),
                    Some(hotzone_core::zone::TEST_HOTZONE_ID)
                );
            }
            other => panic!("expected notification, got {:?}", other),
        }
        assert!(session.registry().snapshot().zones.iter().any(Zone::is_synthetic));
    }
}
