//! Shared outbound side of the control channel
//!
//! Replies, events, log records and heartbeats all leave through one
//! [`Outbound`]. The writer lock is held for a whole frame, so frames from
//! different senders never interleave.

use std::sync::Arc;

use bacgate_term::Term;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::frame::FrameWriter;
use crate::error::TransportError;
use crate::protocol::Notification;

type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

#[derive(Clone)]
pub struct Outbound {
    writer: Arc<Mutex<FrameWriter<BoxedWriter>>>,
}

impl Outbound {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            writer: Arc::new(Mutex::new(FrameWriter::new(Box::new(writer) as BoxedWriter))),
        }
    }

    /// Encode and send one term as a frame
    pub async fn send(&self, term: &Term) -> Result<(), TransportError> {
        let body = bacgate_term::encode(term);
        let mut writer = self.writer.lock().await;
        writer.send(&body).await
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound").finish_non_exhaustive()
    }
}

/// Handle for publishing notifications from any thread, including ones
/// outside the runtime
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    /// A notifier and the receiving end of its queue
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Create a notifier and the forwarder task draining it into `outbound`
    pub fn spawn(outbound: Outbound) -> (Self, JoinHandle<()>) {
        let (notifier, rx) = Self::channel();
        let handle = tokio::spawn(forward(outbound, rx));
        (notifier, handle)
    }

    /// Queue a notification; returns false once the forwarder has stopped
    pub fn notify(&self, notification: Notification) -> bool {
        self.tx.send(notification).is_ok()
    }
}

async fn forward(outbound: Outbound, mut rx: mpsc::UnboundedReceiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        if let Err(e) = outbound.send(&notification.to_term()).await {
            // Targets under this module are not forwarded to the port
            tracing::warn!("Outbound channel failed, dropping notifications: {}", e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CommandEffect;
    use crate::port::frame::FrameReader;

    #[tokio::test]
    async fn test_notifications_are_framed_in_order() {
        let (client, server) = tokio::io::duplex(4096);
        let outbound = Outbound::new(server);
        let (notifier, forwarder) = Notifier::spawn(outbound);

        assert!(notifier.notify(Notification::Heartbeat));
        assert!(notifier.notify(Notification::Command(CommandEffect {
            device_id: 10,
            object_id: 2,
            value: 1,
        })));
        drop(notifier);
        forwarder.await.unwrap();

        let mut reader = FrameReader::new(client, 1024);
        let first = reader.recv().await.unwrap().unwrap();
        assert_eq!(bacgate_term::decode(&first).unwrap(), Term::atom("heartbeat"));
        let second = reader.recv().await.unwrap().unwrap();
        let term = bacgate_term::decode(&second).unwrap();
        assert_eq!(term.as_tuple().unwrap()[0], Term::atom("$event"));
    }

    #[tokio::test]
    async fn test_concurrent_senders_never_interleave() {
        let (client, server) = tokio::io::duplex(64);
        let outbound = Outbound::new(server);

        let big = Term::binary(vec![0xAB; 700]);
        let mut tasks = Vec::new();
        for i in 0..8u32 {
            let outbound = outbound.clone();
            let term = if i % 2 == 0 { big.clone() } else { Term::atom("heartbeat") };
            tasks.push(tokio::spawn(async move {
                for _ in 0..5 {
                    outbound.send(&term).await.unwrap();
                }
            }));
        }

        let reading = tokio::spawn(async move {
            let mut reader = FrameReader::new(client, 4096);
            let mut frames = Vec::new();
            while let Some(body) = reader.recv().await.unwrap() {
                frames.push(bacgate_term::decode(&body).unwrap());
            }
            frames
        });

        for task in tasks {
            task.await.unwrap();
        }
        drop(outbound);
        let frames = reading.await.unwrap();

        assert_eq!(frames.len(), 40);
        assert_eq!(frames.iter().filter(|t| **t == big).count(), 20);
        assert_eq!(frames.iter().filter(|t| t.is_atom("heartbeat")).count(), 20);
    }
}
