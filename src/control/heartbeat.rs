use super::EngineState;
use crate::config::ControlConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};

const ACTIVE_FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const PAUSED_FRAMES: [char; 4] = ['𝔷', 'z', 'Z', 'ℤ'];

/// One sub-tick of the engine loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heartbeat {
    Active(char),
    Paused(char),
}

/// Engine main loop.
///
/// Reads the shared flag once per sub-tick and emits a heartbeat frame.
/// Never touches the message queues.
pub struct EngineLoop {
    engine: Arc<EngineState>,
    sub_tick: Duration,
    cycle_ticks: usize,
    tick: usize,
}

impl EngineLoop {
    pub fn new(engine: Arc<EngineState>, config: &ControlConfig) -> Self {
        Self {
            engine,
            sub_tick: config.sub_tick(),
            cycle_ticks: config.cycle_ticks.max(1),
            tick: 0,
        }
    }

    /// Advance one sub-tick
    pub fn step(&mut self) -> Heartbeat {
        let position = self.tick % self.cycle_ticks;
        self.tick = self.tick.wrapping_add(1);

        if self.engine.is_running() {
            Heartbeat::Active(ACTIVE_FRAMES[position % ACTIVE_FRAMES.len()])
        } else {
            Heartbeat::Paused(PAUSED_FRAMES[position % PAUSED_FRAMES.len()])
        }
    }

    /// True when the next step starts a new decision cycle
    fn at_cycle_start(&self) -> bool {
        self.tick % self.cycle_ticks == 0
    }

    pub async fn run(mut self) {
        let mut ticker = interval(self.sub_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if self.at_cycle_start() {
                debug!(running = self.engine.is_running(), "Engine cycle");
            }

            match self.step() {
                Heartbeat::Active(frame) => trace!(%frame, "engine active"),
                Heartbeat::Paused(frame) => trace!(%frame, "engine paused"),
            }
        }
    }
}
