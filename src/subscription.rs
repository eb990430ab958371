use crate::error::{KefError, Result};
use crate::types::{ConnectionState, DeviceSnapshot};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event published by a client
#[derive(Debug, Clone)]
pub enum KefEvent {
    /// The connection moved to a new lifecycle state
    Lifecycle {
        state: ConnectionState,
        /// Why the socket closed, when known (only set for `Closed`)
        cause: Option<String>,
    },

    /// Socket-level failure. Reconnection is driven by the `Closed` transition
    /// that follows, not by this event.
    TransportError(Arc<std::io::Error>),

    /// Device state changed (or was re-read with `emit_unchanged_state` set)
    State(DeviceSnapshot),
}

/// Receiver for client events
///
/// Events are buffered per subscriber. One that falls behind a burst of state
/// reports gets a `ChannelError` telling how many events it missed, then
/// resumes with the oldest one still buffered.
pub struct EventReceiver {
    rx: broadcast::Receiver<KefEvent>,
}

impl EventReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<KefEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event
    ///
    /// Fails with `ConnectionClosed` once the client has been dropped.
    pub async fn recv(&mut self) -> Result<KefEvent> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => KefError::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => {
                KefError::ChannelError(format!("Lagged by {} messages", n))
            }
        })
    }

    /// Try to receive an event without blocking
    ///
    /// Returns `None` if no event is available.
    pub fn try_recv(&mut self) -> Result<Option<KefEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(KefError::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(KefError::ChannelError(format!("Lagged by {} messages", n)))
            }
        }
    }
}
