use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hotzone_core::ZoneRegistry;
use hotzone_monitor::alarm::LogAlarmPlayer;
use hotzone_monitor::config::MonitorConfig;
use hotzone_monitor::error::MonitorError;
use hotzone_monitor::snapshot::load_snapshot;
use hotzone_monitor::track::{load_track, TrackReplay};
use hotzone_monitor::{Cli, MonitorSignal, Session};
use miette::{IntoDiagnostic, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    log::info!("hotzone-monitor {}", hotzone_monitor::VERSION);

    let config = MonitorConfig::load(args.config.as_deref()).into_diagnostic()?;
    let track = load_track(&args.track).into_diagnostic()?;

    let registry = ZoneRegistry::new();
    if let Some(path) = &args.zones {
        let data = load_snapshot(path).into_diagnostic()?;
        registry.replace(data.zones, data.points);
    }

    Toplevel::new(move |s| async move {
        let (session, tasks) = Session::new(config, registry, Arc::new(LogAlarmPlayer::default()));

        if args.test_hotzone {
            match track.first() {
                Some(first) => {
                    session.inject_test_hotzone(first);
                }
                None => log::warn!("Empty track, no test hotzone injected"),
            }
        }

        let rx_signal = session.subscribe();
        s.start(SubsystemBuilder::new("Output", move |subsys| {
            print_signals(subsys, rx_signal)
        }));

        tasks.start(&s, !args.no_background);

        let replay = TrackReplay::new(
            session,
            track,
            Duration::from_millis(args.replay_interval_ms),
        );
        s.start(SubsystemBuilder::new("Replay", |subsys| replay.run(subsys)));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(5))
    .await
    .into_diagnostic()
}

/// Write every monitor signal to stdout as one JSON line
async fn print_signals(
    subsys: SubsystemHandle,
    mut rx_signal: tokio::sync::broadcast::Receiver<MonitorSignal>,
) -> Result<(), MonitorError> {
    loop {
        tokio::select! {
            _ = subsys.on_shutdown_requested() => break,
            signal = rx_signal.recv() => match signal {
                Ok(signal) => match serde_json::to_string(&signal) {
                    Ok(line) => println!("{}", line),
                    Err(e) => log::error!("Cannot serialize signal: {}", e),
                },
                Err(RecvError::Lagged(missed)) => log::warn!("Output skipped {} signals", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
