//! # Hotzone Monitor
//!
//! Runtime host for [`hotzone_core`]: feeds positions into a foreground and a
//! background evaluation loop, keeps the critical re-alert timer, and turns
//! transition events into alarms and notifications.
//!
//! ## Architecture
//!
//! ```text
//!   TrackReplay ──publish_position()──┬──► mpsc ──► ForegroundMonitor ──┐
//!                                     │              (re-alert timer)   │
//!                                     └──► watch ─► BackgroundMonitor ──┤
//!   Session::dismiss() ──► mpsc ──► ForegroundMonitor                   │
//!                                                                       ▼
//!                                   broadcast<MonitorSignal> ──► AlertDispatcher
//!                                                                 (AlarmPlayer)
//! ```
//!
//! Both loops read the same [`ZoneRegistry`] and each owns its own alert
//! session; nothing mutable is shared between them. Every loop is a
//! `tokio-graceful-shutdown` subsystem, or can be driven directly with a
//! [`CancellationToken`] through [`MonitorTasks::spawn`].
//!
//! ## Command-Line Interface
//!
//! See [`Cli`]. Key options:
//!
//! - `--track` - JSON-lines position track to replay
//! - `--zones` - cluster snapshot to monitor against
//! - `--test-hotzone` - inject a synthetic zone around the first position
//! - `-v` / `-q` - verbosity

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use hotzone_core::{BackgroundNotice, Coordinate, ProximityEvaluator, TransitionEvent, Zone, ZoneRegistry};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle};
use tokio_util::sync::CancellationToken;

pub mod alarm;
pub mod background;
pub mod config;
pub mod error;
pub mod foreground;
pub mod snapshot;
pub mod track;

use alarm::{AlarmPlayer, AlertDispatcher};
use background::BackgroundMonitor;
use config::MonitorConfig;
use error::MonitorError;
use foreground::ForegroundMonitor;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const POSITION_QUEUE_LEN: usize = 32;
const COMMAND_QUEUE_LEN: usize = 8;
const SIGNAL_QUEUE_LEN: usize = 64;

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Position track to replay, one `{"latitude", "longitude"}` object per line
    #[arg(short, long)]
    pub track: PathBuf,

    /// Cluster snapshot (JSON) with clusters and outliers
    #[arg(short, long)]
    pub zones: Option<PathBuf>,

    /// Configuration file; defaults to config.json in the user config directory
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Inject a synthetic test hotzone around the first track position
    #[arg(long, default_value_t = false)]
    pub test_hotzone: bool,

    /// Delay between replayed positions
    #[arg(long, default_value_t = 1000)]
    pub replay_interval_ms: u64,

    /// Run only the foreground loop
    #[arg(long, default_value_t = false)]
    pub no_background: bool,
}

/// Everything the monitor publishes to alarm, notification and UI consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MonitorSignal {
    /// Foreground transition event
    Transition(TransitionEvent),
    /// Background notify decision
    Notification(BackgroundNotice),
    /// Periodic re-alert or event delivery could not keep up; monitoring
    /// continues on whatever triggers do arrive
    CapabilityDegraded { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorCommand {
    /// Silence the current alert without changing zones or position
    Dismiss,
}

/// Milliseconds since the session started, on the tokio clock
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    start: tokio::time::Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        SessionClock {
            start: tokio::time::Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SessionInner {
    pub config: MonitorConfig,
    pub registry: ZoneRegistry,
    tx_position: mpsc::Sender<Coordinate>,
    tx_latest: watch::Sender<Option<Coordinate>>,
    tx_command: mpsc::Sender<MonitorCommand>,
    tx_signal: broadcast::Sender<MonitorSignal>,
}

/// Handle for feeding and controlling a running monitor
#[derive(Clone)]
pub struct Session {
    pub inner: Arc<SessionInner>,
}

/// Loops created with a [`Session`], not yet running
pub struct MonitorTasks {
    pub foreground: ForegroundMonitor,
    pub background: BackgroundMonitor,
    pub dispatcher: AlertDispatcher,
}

impl Session {
    pub fn new(
        config: MonitorConfig,
        registry: ZoneRegistry,
        player: Arc<dyn AlarmPlayer>,
    ) -> (Session, MonitorTasks) {
        let (tx_position, rx_position) = mpsc::channel(POSITION_QUEUE_LEN);
        let (tx_latest, rx_latest) = watch::channel(None);
        let (tx_command, rx_command) = mpsc::channel(COMMAND_QUEUE_LEN);
        let (tx_signal, _) = broadcast::channel(SIGNAL_QUEUE_LEN);

        let clock = SessionClock::new();
        let evaluator = ProximityEvaluator::new(registry.clone(), config.proximity_settings())
            .with_proximity_filter(config.proximity_filter_km);

        let tasks = MonitorTasks {
            foreground: ForegroundMonitor::new(
                evaluator.clone(),
                config.realert_interval(),
                clock,
                rx_position,
                rx_command,
                tx_signal.clone(),
            ),
            background: BackgroundMonitor::new(
                evaluator,
                config.background_interval(),
                config.notification_cooldown_ms,
                clock,
                rx_latest,
                tx_signal.clone(),
            ),
            dispatcher: AlertDispatcher::new(player, &tx_signal),
        };

        let session = Session {
            inner: Arc::new(SessionInner {
                config,
                registry,
                tx_position,
                tx_latest,
                tx_command,
                tx_signal,
            }),
        };
        (session, tasks)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ZoneRegistry {
        &self.inner.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorSignal> {
        self.inner.tx_signal.subscribe()
    }

    /// Deliver a position update to both loops
    pub async fn publish_position(&self, position: Coordinate) -> Result<(), MonitorError> {
        self.inner.tx_latest.send_replace(Some(position));
        self.inner
            .tx_position
            .send(position)
            .await
            .map_err(|_| MonitorError::ChannelClosed("foreground positions"))
    }

    pub async fn dismiss(&self) -> Result<(), MonitorError> {
        self.inner
            .tx_command
            .send(MonitorCommand::Dismiss)
            .await
            .map_err(|_| MonitorError::ChannelClosed("monitor commands"))
    }

    /// Merge the synthetic test hotzone around `center` into the registry
    pub fn inject_test_hotzone(&self, center: &Coordinate) -> Option<u64> {
        log::info!("Injecting test hotzone around {}", center);
        self.inner
            .registry
            .merge_synthetic(Zone::test_hotzone(center))
    }
}

impl MonitorTasks {
    /// Start every loop as a subsystem of `subsys`
    pub fn start(self, subsys: &SubsystemHandle, background: bool) {
        let MonitorTasks {
            foreground,
            background: background_monitor,
            dispatcher,
        } = self;

        subsys.start(SubsystemBuilder::new("Dispatcher", |s| dispatcher.run(s)));
        subsys.start(SubsystemBuilder::new("Foreground", |s| foreground.run(s)));
        if background {
            subsys.start(SubsystemBuilder::new("Background", |s| {
                background_monitor.run(s)
            }));
        } else {
            log::info!("Background monitoring disabled");
        }
    }

    /// Spawn every loop on the current runtime, stopping when `token` is
    /// cancelled
    pub fn spawn(
        self,
        token: CancellationToken,
        background: bool,
    ) -> Vec<JoinHandle<Result<(), MonitorError>>> {
        let mut handles = vec![
            tokio::spawn(self.dispatcher.run_until(token.clone().cancelled_owned())),
            tokio::spawn(self.foreground.run_until(token.clone().cancelled_owned())),
        ];
        if background {
            handles.push(tokio::spawn(
                self.background.run_until(token.cancelled_owned()),
            ));
        }
        handles
    }
}
