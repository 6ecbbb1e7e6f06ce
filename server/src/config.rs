//! Runtime configuration of the server

use std::time::Duration;

use crate::error::ServerError;

pub const DEFAULT_TICK_RATE: u32 = 60;
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_MESSAGES_PER_TICK: usize = 1024;
pub const DEFAULT_MAX_SESSIONS: usize = 32;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Simulation steps per second.
    pub tick_rate: u32,
    /// Silence after which a session is evicted.
    pub session_timeout: Duration,
    /// Cap on datagrams drained in one tick so a flooding peer cannot starve it.
    pub max_messages_per_tick: usize,
    /// Threads in the job scheduler's pool.
    pub workers: usize,
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            max_messages_per_tick: DEFAULT_MAX_MESSAGES_PER_TICK,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate as f64)
    }

    /// Fixed simulation step in seconds.
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(ServerError::Config(format!(
                "tick rate must be within 1..=1000, got {}",
                self.tick_rate
            )));
        }
        if self.workers == 0 {
            return Err(ServerError::Config("at least one worker is required".into()));
        }
        if self.max_messages_per_tick == 0 {
            return Err(ServerError::Config(
                "max messages per tick must be positive".into(),
            ));
        }
        if self.session_timeout < self.tick_duration() {
            return Err(ServerError::Config(format!(
                "session timeout {:?} is shorter than one tick",
                self.session_timeout
            )));
        }
        Ok(())
    }
}
