//! Keepalive supervisor.
//!
//! On open: one `Hello`, then a `Ping` every period until the connection
//! ends. `Pong` echoes are turned into round-trip times for logging only.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};
use wildlands_shared::protocol::ClientMessage;

/// Periodic ping timer plus latency bookkeeping.
pub struct Keepalive {
    period: Duration,
    timer: Option<Interval>,
    last_rtt: Option<Duration>,
    pings_sent: u64,
}

impl Keepalive {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            timer: None,
            last_rtt: None,
            pings_sent: 0,
        }
    }

    /// Connection opened: starts the ping timer and returns the `Hello`
    /// to send first.
    pub fn on_opened(&mut self, username: &str) -> ClientMessage {
        self.start();
        ClientMessage::Hello {
            username: username.to_string(),
        }
    }

    /// Connection closed or failed. Safe to call any number of times.
    pub fn on_closed(&mut self) {
        if self.timer.take().is_some() {
            debug!(pings = self.pings_sent, "Keepalive stopped");
        }
    }

    /// (Re)starts the timer; the first ping is due one period from now.
    pub fn start(&mut self) {
        let mut timer = time::interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
        debug!(period_ms = self.period.as_millis() as u64, "Keepalive started");
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Resolves when the next ping is due. Pends forever while stopped.
    pub async fn due(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Builds the `Ping` for `now_ms`.
    pub fn ping(&mut self, now_ms: u64) -> ClientMessage {
        self.pings_sent += 1;
        ClientMessage::Ping { timestamp: now_ms }
    }

    /// Records the round trip for a `Pong` echoing `echoed_ms`.
    pub fn on_pong(&mut self, echoed_ms: u64, now_ms: u64) -> Duration {
        let rtt = Duration::from_millis(now_ms.saturating_sub(echoed_ms));
        self.last_rtt = Some(rtt);
        info!(rtt_ms = rtt.as_millis() as u64, "Pong");
        rtt
    }

    pub fn last_rtt(&self) -> Option<Duration> {
        self.last_rtt
    }

    pub fn pings_sent(&self) -> u64 {
        self.pings_sent
    }
}

/// Wall clock in ms since the Unix epoch, as carried by `Ping`.
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn opened_sends_hello_then_pings_each_period() {
        let mut keepalive = Keepalive::new(Duration::from_secs(5));
        let hello = keepalive.on_opened("tester");
        assert_eq!(
            hello,
            ClientMessage::Hello {
                username: "tester".into()
            }
        );

        let started = Instant::now();
        keepalive.due().await;
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        keepalive.due().await;
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_timer_never_fires() {
        let mut keepalive = Keepalive::new(Duration::from_millis(10));
        keepalive.on_opened("tester");
        keepalive.on_closed();
        keepalive.on_closed();
        assert!(!keepalive.is_running());

        let fired = time::timeout(Duration::from_secs(1), keepalive.due()).await;
        assert!(fired.is_err());
    }

    #[test]
    fn pong_measures_round_trip() {
        let mut keepalive = Keepalive::new(Duration::from_secs(5));
        let ClientMessage::Ping { timestamp } = keepalive.ping(1_000) else {
            panic!("expected ping");
        };
        assert_eq!(keepalive.on_pong(timestamp, 1_042), Duration::from_millis(42));
        assert_eq!(keepalive.last_rtt(), Some(Duration::from_millis(42)));
        assert_eq!(keepalive.pings_sent(), 1);
    }

    #[test]
    fn pong_from_the_future_clamps_to_zero() {
        let mut keepalive = Keepalive::new(Duration::from_secs(5));
        assert_eq!(keepalive.on_pong(2_000, 1_000), Duration::ZERO);
    }
}
