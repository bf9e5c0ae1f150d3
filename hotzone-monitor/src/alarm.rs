//! Alarm capability and alert dispatch.
//!
//! The monitor never touches audio or vibration directly. It publishes
//! [`MonitorSignal`]s, and the [`AlertDispatcher`] drives whatever
//! [`AlarmPlayer`] the host injects:
//!
//! | Signal                       | Alarm           |
//! |------------------------------|-----------------|
//! | Critical-Entered             | start           |
//! | Downgraded-To-Warning        | stop            |
//! | Cleared (movement, dismiss)  | stop            |
//! | dispatcher shutdown          | stop            |

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hotzone_core::{TransitionEvent, TransitionKind};
use log::{debug, info, warn};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_graceful_shutdown::SubsystemHandle;

use crate::error::MonitorError;
use crate::MonitorSignal;

/// Audible/haptic alarm device
pub trait AlarmPlayer: Send + Sync {
    /// Start the alarm. Does nothing if it is already playing.
    fn start(&self, event: &TransitionEvent);

    /// Stop the alarm. Does nothing if it is not playing.
    fn stop(&self);

    fn is_playing(&self) -> bool;
}

/// Alarm that only writes to the log
#[derive(Debug, Default)]
pub struct LogAlarmPlayer {
    playing: AtomicBool,
}

impl AlarmPlayer for LogAlarmPlayer {
    fn start(&self, event: &TransitionEvent) {
        if !self.playing.swap(true, Ordering::SeqCst) {
            warn!("ALARM ON: {} ({})", event.message, event);
        }
    }

    fn stop(&self) {
        if self.playing.swap(false, Ordering::SeqCst) {
            info!("Alarm off");
        }
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

pub struct AlertDispatcher {
    player: Arc<dyn AlarmPlayer>,
    rx_signal: broadcast::Receiver<MonitorSignal>,
    tx_signal: broadcast::Sender<MonitorSignal>,
}

impl AlertDispatcher {
    /// Subscribe to `tx_signal` now, so nothing published after construction
    /// is missed
    pub fn new(player: Arc<dyn AlarmPlayer>, tx_signal: &broadcast::Sender<MonitorSignal>) -> Self {
        AlertDispatcher {
            player,
            rx_signal: tx_signal.subscribe(),
            tx_signal: tx_signal.clone(),
        }
    }

    pub fn handle(&self, signal: &MonitorSignal) {
        match signal {
            MonitorSignal::Transition(event) => match event.kind {
                TransitionKind::CriticalEntered => self.player.start(event),
                TransitionKind::CriticalSustained => {
                    warn!("Still inside {}", event.target_name.as_deref().unwrap_or("a hotspot"))
                }
                TransitionKind::DowngradedToWarning | TransitionKind::Cleared => self.player.stop(),
                TransitionKind::WarningEntered => info!("{}", event.message),
            },
            MonitorSignal::Notification(notice) => debug!(
                "Notification [{:?}] {}",
                notice.notification.priority, notice.notification.title
            ),
            MonitorSignal::CapabilityDegraded { reason } => {
                debug!("Degraded signal observed: {}", reason)
            }
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

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                signal = self.rx_signal.recv() => match signal {
                    Ok(signal) => self.handle(&signal),
                    Err(RecvError::Lagged(missed)) => {
                        let reason = format!("alert dispatcher missed {} signals", missed);
                        warn!("Capability degraded: {}", reason);
                        let _ = self.tx_signal.send(MonitorSignal::CapabilityDegraded { reason });
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        self.player.stop();
        debug!("Alert dispatcher finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotzone_core::AlertLevel;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<&'static str>>,
        playing: AtomicBool,
    }

    impl AlarmPlayer for Recorder {
        fn start(&self, _event: &TransitionEvent) {
            if !self.playing.swap(true, Ordering::SeqCst) {
                self.calls.lock().unwrap().push("start");
            }
        }

        fn stop(&self) {
            if self.playing.swap(false, Ordering::SeqCst) {
                self.calls.lock().unwrap().push("stop");
            }
        }

        fn is_playing(&self) -> bool {
            self.playing.load(Ordering::SeqCst)
        }
    }

    fn event(kind: TransitionKind, level: AlertLevel) -> MonitorSignal {
        MonitorSignal::Transition(TransitionEvent {
            kind,
            level,
            target_id: Some("cluster:1".into()),
            target_name: Some("Cluster 1".into()),
            target_kind: None,
            distance_m: Some(0.0),
            timestamp_ms: 0,
            message: String::new(),
        })
    }

    #[test]
    fn test_log_player_start_is_idempotent() {
        let player = LogAlarmPlayer::default();
        let signal = event(TransitionKind::CriticalEntered, AlertLevel::Critical);
        let MonitorSignal::Transition(e) = &signal else {
            unreachable!()
        };
        player.start(e);
        player.start(e);
        assert!(player.is_playing());
        player.stop();
        player.stop();
        assert!(!player.is_playing());
    }

    #[test]
    fn test_dispatch_mapping() {
        let recorder = Arc::new(Recorder::default());
        let (tx, _) = broadcast::channel(8);
        let dispatcher = AlertDispatcher::new(recorder.clone(), &tx);

        dispatcher.handle(&event(TransitionKind::CriticalEntered, AlertLevel::Critical));
        dispatcher.handle(&event(TransitionKind::CriticalSustained, AlertLevel::Critical));
        dispatcher.handle(&event(TransitionKind::DowngradedToWarning, AlertLevel::Warning));
        dispatcher.handle(&event(TransitionKind::CriticalEntered, AlertLevel::Critical));
        dispatcher.handle(&event(TransitionKind::Cleared, AlertLevel::Safe));
        dispatcher.handle(&event(TransitionKind::WarningEntered, AlertLevel::Warning));

        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["start", "stop", "start", "stop"]
        );
    }

    #[tokio::test]
    async fn test_lag_reports_degraded() {
        let recorder = Arc::new(Recorder::default());
        let (tx, _) = broadcast::channel(2);
        let dispatcher = AlertDispatcher::new(recorder.clone(), &tx);

        for _ in 0..5 {
            tx.send(event(TransitionKind::WarningEntered, AlertLevel::Warning))
                .unwrap();
        }
        let mut probe = tx.subscribe();

        let token = CancellationToken::new();
        let handle = tokio::spawn(dispatcher.run_until(token.clone().cancelled_owned()));

        match probe.recv().await {
            Ok(MonitorSignal::CapabilityDegraded { reason }) => assert!(reason.contains('3')),
            other => panic!("expected degraded signal, got {:?}", other),
        }

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_alarm() {
        let recorder = Arc::new(Recorder::default());
        let (tx, _) = broadcast::channel(8);
        let dispatcher = AlertDispatcher::new(recorder.clone(), &tx);
        dispatcher.handle(&event(TransitionKind::CriticalEntered, AlertLevel::Critical));
        assert!(recorder.is_playing());

        let token = CancellationToken::new();
        token.cancel();
        dispatcher.run_until(token.cancelled_owned()).await.unwrap();
        assert!(!recorder.is_playing());
    }
}
