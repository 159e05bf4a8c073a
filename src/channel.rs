//! Controller side of the controller ↔ loader message channel.
//!
//! Outbound control messages go through a `Sender<ControlMessage>` obtained
//! from the loader; inbound loader messages arrive on a single receiver owned
//! by the event loop. Sends before `connect` or after `disconnect` are no-ops,
//! and a failed send marks the channel disconnected.

use tokio::sync::mpsc;

use crate::protocol::{ControlMessage, LoaderMessage};

/// Buffer size for inbound loader messages.
pub const REPLY_BUFFER: usize = 256;

pub struct LoaderChannel {
    outbound: Option<mpsc::Sender<ControlMessage>>,
    reply: mpsc::Sender<LoaderMessage>,
}

impl LoaderChannel {
    /// Create a disconnected channel and the receiver for loader messages.
    pub fn new() -> (Self, mpsc::Receiver<LoaderMessage>) {
        let (reply, inbound) = mpsc::channel(REPLY_BUFFER);
        (
            Self {
                outbound: None,
                reply,
            },
            inbound,
        )
    }

    /// Attach to a loader and register for replies.
    ///
    /// Returns false if the loader is already gone, in which case the channel
    /// stays disconnected.
    pub async fn connect(&mut self, loader: mpsc::Sender<ControlMessage>) -> bool {
        let register = ControlMessage::RegisterClient {
            reply: self.reply.clone(),
        };
        if let Err(e) = loader.send(register).await {
            tracing::debug!(error = %e, "Loader unavailable on connect");
            self.outbound = None;
            return false;
        }
        self.outbound = Some(loader);
        true
    }

    /// Unregister from the loader and drop the outbound handle.
    pub async fn disconnect(&mut self) {
        self.send(ControlMessage::UnregisterClient).await;
        self.outbound = None;
    }

    pub fn is_connected(&self) -> bool {
        self.outbound.is_some()
    }

    /// Send a control message. Never fails; a closed loader is logged and the
    /// channel is marked disconnected.
    pub async fn send(&mut self, message: ControlMessage) {
        let Some(outbound) = &self.outbound else {
            tracing::debug!(message = ?message, "Dropping control message, not connected");
            return;
        };
        let result = outbound.send(message).await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "Loader presumed terminated, disconnecting");
            self.outbound = None;
        }
    }
}
