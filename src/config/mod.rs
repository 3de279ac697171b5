use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Complete botfleet configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BotFleetConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// HTTP/WebSocket listener
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Control channel and engine loop timing
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// How long a queue send may wait before the message is dropped (milliseconds)
    #[serde(default = "default_send_timeout")]
    pub send_timeout_millis: u64,
    /// Buffered messages per queue before senders start waiting
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Engine loop sub-tick length (milliseconds)
    #[serde(default = "default_sub_tick_millis")]
    pub sub_tick_millis: u64,
    /// Sub-ticks per engine decision cycle
    #[serde(default = "default_cycle_ticks")]
    pub cycle_ticks: usize,
}

fn default_send_timeout() -> u64 {
    10_000
}

fn default_queue_capacity() -> usize {
    16
}

fn default_sub_tick_millis() -> u64 {
    1000
}

fn default_cycle_ticks() -> usize {
    4
}

impl ControlConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_millis)
    }

    /// Never zero; a zero interval would stop the engine loop
    pub fn sub_tick(&self) -> Duration {
        Duration::from_millis(self.sub_tick_millis.max(1))
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            send_timeout_millis: default_send_timeout(),
            queue_capacity: default_queue_capacity(),
            sub_tick_millis: default_sub_tick_millis(),
            cycle_ticks: default_cycle_ticks(),
        }
    }
}

/// Liveness sweeper schedule and probe limits
#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_sweeper_enabled")]
    pub enabled: bool,
    /// Time between sweeps (seconds)
    #[serde(default = "default_sweep_interval")]
    pub interval_seconds: u64,
    /// Obstacles not updated within this window are deleted (seconds)
    #[serde(default = "default_obstacle_max_age")]
    pub obstacle_max_age_seconds: i64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
    /// Probes in flight at once during a single pass
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,
}

fn default_sweeper_enabled() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    4 * 60 * 60
}

fn default_obstacle_max_age() -> i64 {
    4 * 60 * 60
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_probe_concurrency() -> usize {
    8
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Falls back to the default when the setting is out of range
    pub fn obstacle_max_age(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.obstacle_max_age_seconds)
            .filter(|age| *age >= chrono::Duration::zero())
            .unwrap_or_else(|| {
                warn!(
                    obstacle_max_age_seconds = self.obstacle_max_age_seconds,
                    "Obstacle max age out of range, using default"
                );
                chrono::Duration::seconds(default_obstacle_max_age())
            })
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweeper_enabled(),
            interval_seconds: default_sweep_interval(),
            obstacle_max_age_seconds: default_obstacle_max_age(),
            probe_timeout_seconds: default_probe_timeout(),
            probe_concurrency: default_probe_concurrency(),
        }
    }
}

/// Entity registry location
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("botfleet.db")
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl BotFleetConfig {
    /// Apply BOTFLEET_* environment overrides on top of file values.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("BOTFLEET_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("BOTFLEET_DATABASE_PATH") {
            self.registry.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("BOTFLEET_SWEEP_INTERVAL_SECONDS") {
            match v.parse::<u64>() {
                Ok(n) => self.sweeper.interval_seconds = n,
                Err(e) => warn!(
                    value = %v,
                    error = %e,
                    "Ignoring invalid BOTFLEET_SWEEP_INTERVAL_SECONDS"
                ),
            }
        }
        self
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<BotFleetConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
    let config: BotFleetConfig = toml::from_str(&contents).context("Failed to parse config")?;
    Ok(config)
}
