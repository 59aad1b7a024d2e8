//! Control channel to the supervising Erlang process
//!
//! Requests arrive as `$gen_call` envelopes on the reader; each one is
//! decoded, dispatched and answered before the next frame is read.
//! Everything outbound shares a single [`Outbound`].

pub mod call;
pub mod frame;
pub mod heartbeat;
pub mod log_layer;
pub mod outbound;

use bacgate_term::Term;
use tokio::io::AsyncRead;

pub use call::GenCall;
pub use frame::{FrameReader, FrameWriter};
pub use heartbeat::{spawn_heartbeat, DEFAULT_HEARTBEAT_PERIOD};
pub use log_layer::PortLogLayer;
pub use outbound::{Notifier, Outbound};

use crate::dispatch::Dispatcher;
use crate::error::TransportError;
use crate::protocol::{decode_command, Reply};

pub struct Port<R> {
    reader: FrameReader<R>,
    outbound: Outbound,
    dispatcher: Dispatcher,
}

impl<R: AsyncRead + Unpin> Port<R> {
    pub fn new(reader: R, outbound: Outbound, dispatcher: Dispatcher, max_frame_len: usize) -> Self {
        Self {
            reader: FrameReader::new(reader, max_frame_len),
            outbound,
            dispatcher,
        }
    }

    /// Serve requests until the supervisor closes the channel
    pub async fn run(mut self) -> Result<(), TransportError> {
        tracing::info!("Control channel ready");

        loop {
            match self.reader.recv().await {
                Ok(Some(body)) => self.handle_frame(&body).await?,
                Ok(None) => {
                    tracing::info!("Control channel closed");
                    return Ok(());
                }
                Err(TransportError::FrameTooLarge(len)) => {
                    tracing::warn!("Discarded oversize frame of {} bytes", len);
                    self.send_uncorrelated().await?;
                }
                Err(TransportError::Truncated { expected, got }) => {
                    tracing::warn!("Control channel ended inside a frame ({} of {} bytes)", got, expected);
                    self.send_uncorrelated().await?;
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn handle_frame(&self, body: &[u8]) -> Result<(), TransportError> {
        let term = match bacgate_term::decode(body) {
            Ok(term) => term,
            Err(e) => {
                tracing::warn!("Undecodable frame: {}", e);
                return self.send_uncorrelated().await;
            }
        };
        let Some(call) = GenCall::from_term(term) else {
            tracing::warn!("Frame is not a call envelope");
            return self.send_uncorrelated().await;
        };

        let reply = self.handle_call(&call.request);
        self.outbound.send(&call.reply(reply)).await
    }

    fn handle_call(&self, request: &Term) -> Reply {
        let command = match decode_command(request) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!("Rejected request: {}", e);
                return Reply::from(&e);
            }
        };
        match self.dispatcher.dispatch(command) {
            Ok(()) => Reply::Ok,
            Err(e) => Reply::from(&e),
        }
    }

    /// `{error, bad_request}` with no call to correlate it with
    async fn send_uncorrelated(&self) -> Result<(), TransportError> {
        self.outbound.send(&Reply::BadRequest.to_term()).await
    }
}
