//! Position track replay.
//!
//! Stands in for the location-sensing collaborator: reads a JSON-lines file of
//! `{ "latitude": .., "longitude": .. }` objects and publishes them to the
//! session at a fixed interval. Blank lines are ignored. Coordinates are not
//! validated here; out-of-range positions reach the evaluators, which skip
//! them.

use std::fs;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use hotzone_core::Coordinate;
use log::{debug, info};
use tokio::time::sleep;
use tokio_graceful_shutdown::SubsystemHandle;

use crate::error::MonitorError;
use crate::Session;

pub fn parse_track(text: &str) -> Result<Vec<Coordinate>, MonitorError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|source| MonitorError::Track { line: n + 1, source })
        })
        .collect()
}

pub fn load_track(path: &Path) -> Result<Vec<Coordinate>, MonitorError> {
    let text = fs::read_to_string(path).map_err(|e| MonitorError::io(path, e))?;
    let track = parse_track(&text)?;
    info!("Loaded {} positions from {}", track.len(), path.display());
    Ok(track)
}

pub struct TrackReplay {
    session: Session,
    positions: Vec<Coordinate>,
    interval: Duration,
}

impl TrackReplay {
    pub fn new(session: Session, positions: Vec<Coordinate>, interval: Duration) -> Self {
        TrackReplay {
            session,
            positions,
            interval,
        }
    }

    /// Replay the track, then request shutdown of the whole monitor
    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), MonitorError> {
        let finished = self.replay_until(subsys.on_shutdown_requested()).await?;
        if finished {
            info!("Track replay complete, shutting down");
            subsys.request_shutdown();
        }
        Ok(())
    }

    /// Publish every position, one interval apart, and hold the last one for
    /// one more interval. Returns `false` if `shutdown` cut the replay short.
    pub async fn replay_until<F>(&self, shutdown: F) -> Result<bool, MonitorError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        for (n, position) in self.positions.iter().enumerate() {
            if n > 0 {
                tokio::select! {
                    _ = &mut shutdown => return Ok(false),
                    _ = sleep(self.interval) => {}
                }
            }
            debug!("Position {}/{}: {}", n + 1, self.positions.len(), position);
            self.session.publish_position(*position).await?;
        }

        tokio::select! {
            _ = &mut shutdown => Ok(false),
            _ = sleep(self.interval) => Ok(true),
        }
    }
}
