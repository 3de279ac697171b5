// Liveness sweeper: probe registered entities and evict the dead ones

mod probe;

pub use probe::{HttpProber, Prober};

use crate::config::SweeperConfig;
use crate::control::ControlChannel;
use crate::message::Message;
use crate::registry::{EntityClass, EntityRecord, Registry, RegistrySession};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};


/// Command sent to every probed entity
pub const PING: &str = "ping";

/// The only reply that counts as alive
pub const PONG: &str = "pong";

/// Outcome of one class pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Records examined
    pub checked: usize,
    /// Ids selected for deletion, in registry order
    pub dead: Vec<String>,
    /// Rows the registry reported as removed; None when it could not tell
    pub removed: Option<usize>,
}

/// Outcome of one sweep tick. A `None` pass was aborted by a registry error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub agents: Option<PassReport>,
    pub cubes: Option<PassReport>,
    pub obstacles: Option<PassReport>,
}

impl SweepReport {
    /// Short text for the client's status log
    pub fn summary(&self) -> String {
        fn count(pass: &Option<PassReport>) -> String {
            match pass.as_ref().map(|p| p.removed) {
                Some(Some(n)) => n.to_string(),
                Some(None) => "an unknown number of".to_string(),
                None => "(aborted)".to_string(),
            }
        }

        format!(
            "Liveness sweep removed {} agents, {} cubes, {} obstacles<br />",
            count(&self.agents),
            count(&self.cubes),
            count(&self.obstacles)
        )
    }
}

/// Periodic health check over the entity registry
pub struct Sweeper<R, P> {
    registry: R,
    prober: Arc<P>,
    config: SweeperConfig,
    status: Option<Arc<ControlChannel>>,
}

impl<R: Registry, P: Prober + 'static> Sweeper<R, P> {
    pub fn new(registry: R, prober: P, config: SweeperConfig) -> Self {
        Self {
            registry,
            prober: Arc::new(prober),
            config,
            status: None,
        }
    }

    /// Publish a summary to the client after every tick
    pub fn with_status_channel(mut self, channel: Arc<ControlChannel>) -> Self {
        self.status = Some(channel);
        self
    }

    /// Run background sweep loop.
    ///
    /// The first sweep happens one interval after start. Runs indefinitely
    /// until the task is cancelled.
    pub async fn run_sweep_loop(&self) {
        if !self.config.enabled {
            info!("Liveness sweeper disabled, exiting loop");
            return;
        }

        let period = self.config.interval().max(Duration::from_secs(1));
        info!(
            interval_seconds = period.as_secs(),
            obstacle_max_age_seconds = self.config.obstacle_max_age_seconds,
            "Starting liveness sweeper"
        );

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            info!(at = %Utc::now(), "Liveness sweep running");

            let report = self.sweep().await;

            if let Some(channel) = &self.status {
                // Dropped on timeout; publish logs it
                let _ = channel.publish(Message::status_info(report.summary())).await;
            }
        }
    }

    /// One full tick: agents, then cubes, then obstacles
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Same as `sweep`, with obstacle ages measured from `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let agents = self.probe_pass(EntityClass::Agent).await;
        let cubes = self.probe_pass(EntityClass::Cube).await;
        let obstacles = self.expire_obstacles(now);

        SweepReport {
            agents: Self::settle(EntityClass::Agent, agents),
            cubes: Self::settle(EntityClass::Cube, cubes),
            obstacles: Self::settle(EntityClass::Obstacle, obstacles),
        }
    }

    fn settle(class: EntityClass, pass: Result<PassReport>) -> Option<PassReport> {
        match pass {
            Ok(report) => Some(report),
            Err(e) => {
                error!(class = class.label(), error = %format!("{:#}", e), "Sweep pass aborted");
                None
            }
        }
    }

    /// Probe every agent or cube and delete the ones that fail
    async fn probe_pass(&self, class: EntityClass) -> Result<PassReport> {
        let session = self.registry.open()?;
        let records = session.list_endpoints(class)?;
        let checked = records.len();

        let dead = self.find_dead(&records).await;
        let removed = self.delete(&session, class, &dead)?;

        Ok(PassReport {
            checked,
            dead,
            removed,
        })
    }

    async fn find_dead(&self, records: &[EntityRecord]) -> Vec<String> {
        let concurrency = self.config.probe_concurrency.max(1);
        let probe_timeout = self.config.probe_timeout();
        let prober = Arc::clone(&self.prober);

        // Each probe owns its record and prober handle; results keep registry order
        let outcomes: Vec<(String, bool)> = stream::iter(records.to_vec())
            .map(move |record| {
                let prober = Arc::clone(&prober);
                async move {
                    let alive = is_alive(prober.as_ref(), &record, probe_timeout).await;
                    (record.id, alive)
                }
            })
            .buffered(concurrency)
            .collect()
            .await;

        outcomes
            .into_iter()
            .filter(|(_, alive)| !alive)
            .map(|(id, _)| id)
            .collect()
    }

    /// Delete all obstacles last seen before `now - obstacle_max_age`
    fn expire_obstacles(&self, now: DateTime<Utc>) -> Result<PassReport> {
        // A window reaching past the calendar keeps every dated obstacle
        let cutoff = now
            .checked_sub_signed(self.config.obstacle_max_age())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let session = self.registry.open()?;
        let obstacles = session.list_obstacles()?;
        let checked = obstacles.len();

        // Unparseable timestamps can never age out, so they count as stale
        let stale: Vec<String> = obstacles
            .into_iter()
            .filter(|o| o.last_update.map_or(true, |seen| seen < cutoff))
            .map(|o| o.id)
            .collect();

        let removed = self.delete(&session, EntityClass::Obstacle, &stale)?;

        Ok(PassReport {
            checked,
            dead: stale,
            removed,
        })
    }

    fn delete(
        &self,
        session: &R::Session,
        class: EntityClass,
        ids: &[String],
    ) -> Result<Option<usize>> {
        if ids.is_empty() {
            info!(class = class.label(), "Nothing to delete");
            return Ok(Some(0));
        }

        let removed = session.delete(class, ids)?;

        match removed {
            Some(n) if n == ids.len() => {
                info!(class = class.label(), removed = n, ids = ?ids, "Deleted unresponsive entities");
            }
            Some(n) => {
                warn!(
                    class = class.label(),
                    requested = ids.len(),
                    removed = n,
                    ids = ?ids,
                    "Deleted a different number of entities than requested"
                );
            }
            None => {
                info!(
                    class = class.label(),
                    requested = ids.len(),
                    ids = ?ids,
                    "Deleted an unknown number of entities"
                );
            }
        }

        Ok(removed)
    }
}

/// Alive iff the probe answers exactly "pong" within `probe_timeout`
async fn is_alive<P: Prober + ?Sized>(
    prober: &P,
    record: &EntityRecord,
    probe_timeout: Duration,
) -> bool {
    match timeout(probe_timeout, prober.probe(&record.endpoint, PING)).await {
        Ok(Ok(reply)) if reply == PONG => {
            debug!(id = %record.id, endpoint = %record.endpoint, "Probe answered");
            true
        }
        Ok(Ok(reply)) => {
            info!(id = %record.id, endpoint = %record.endpoint, reply = ?reply, "Unexpected probe reply");
            false
        }
        Ok(Err(e)) => {
            info!(id = %record.id, endpoint = %record.endpoint, error = %e, "Probe failed");
            false
        }
        Err(_) => {
            info!(id = %record.id, endpoint = %record.endpoint, "Probe timed out");
            false
        }
    }
}
