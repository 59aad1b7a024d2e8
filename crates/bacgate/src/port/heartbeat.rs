//! Periodic liveness frame

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::outbound::Outbound;
use crate::protocol::Notification;

pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(4);

/// Send `heartbeat` every `period`, first one after a full period.
/// The task ends when the outbound channel fails.
pub fn spawn_heartbeat(outbound: Outbound, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let term = Notification::Heartbeat.to_term();

        loop {
            ticker.tick().await;
            if let Err(e) = outbound.send(&term).await {
                tracing::warn!("Heartbeat stopped: {}", e);
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::frame::FrameReader;
    use bacgate_term::Term;

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_period() {
        let (client, server) = tokio::io::duplex(1024);
        let handle = spawn_heartbeat(Outbound::new(server), DEFAULT_HEARTBEAT_PERIOD);
        let mut reader = FrameReader::new(client, 1024);

        let start = Instant::now();
        let body = reader.recv().await.unwrap().unwrap();
        assert_eq!(bacgate_term::decode(&body).unwrap(), Term::atom("heartbeat"));
        assert!(start.elapsed() >= DEFAULT_HEARTBEAT_PERIOD);

        reader.recv().await.unwrap().unwrap();
        assert!(start.elapsed() >= DEFAULT_HEARTBEAT_PERIOD * 2);

        handle.abort();
    }
}
