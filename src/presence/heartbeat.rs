//! Per-connection liveness probe.
//!
//! The monitor owns its ticker, so dropping it (which happens when the
//! connection task returns, however it returns) stops the pings.

use tokio::time::{self, Duration, Instant, Interval, MissedTickBehavior};

use crate::config::HeartbeatConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatTick {
    /// Time to send a ping
    Ping,
    /// No acknowledgement within the timeout
    Expired,
}

pub struct HeartbeatMonitor {
    timeout: Duration,
    last_ack: Instant,
    ticker: Interval,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig) -> Self {
        let now = Instant::now();
        let mut ticker = time::interval_at(now + config.interval, config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            timeout: config.timeout(),
            last_ack: now,
            ticker,
        }
    }

    /// Any sign of life from the peer
    pub fn record_ack(&mut self) {
        self.last_ack = Instant::now();
    }

    pub fn last_ack(&self) -> Instant {
        self.last_ack
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_ack) >= self.timeout
    }

    /// Wait for the next interval. Cancel-safe.
    pub async fn tick(&mut self) -> HeartbeatTick {
        let now = self.ticker.tick().await;
        if self.is_expired(now) {
            HeartbeatTick::Expired
        } else {
            HeartbeatTick::Ping
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(interval_ms: u64, factor: u32) -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_millis(interval_ms),
            timeout_factor: factor,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_while_acknowledged() {
        let mut monitor = HeartbeatMonitor::new(config(30_000, 2));

        assert_eq!(monitor.tick().await, HeartbeatTick::Ping);
        monitor.record_ack();
        assert_eq!(monitor.tick().await, HeartbeatTick::Ping);
        monitor.record_ack();
        assert_eq!(monitor.tick().await, HeartbeatTick::Ping);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_without_ack() {
        let mut monitor = HeartbeatMonitor::new(config(30_000, 2));

        assert_eq!(monitor.tick().await, HeartbeatTick::Ping);
        assert_eq!(monitor.tick().await, HeartbeatTick::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_waits_one_interval() {
        let start = Instant::now();
        let mut monitor = HeartbeatMonitor::new(config(30_000, 2));

        monitor.tick().await;

        assert!(Instant::now().duration_since(start) >= Duration::from_millis(30_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_expired_boundary() {
        let monitor = HeartbeatMonitor::new(config(1_000, 3));
        let base = monitor.last_ack();

        assert!(!monitor.is_expired(base + Duration::from_millis(2_999)));
        assert!(monitor.is_expired(base + Duration::from_millis(3_000)));
    }
}
