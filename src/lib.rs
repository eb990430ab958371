//! Rust library for controlling KEF wireless speakers
//!
//! KEF's wireless speakers (LS50 Wireless and relatives) accept a small binary
//! command protocol on TCP port 50001. This library keeps a persistent
//! connection to one speaker and provides:
//!
//! - Power on / input selection and power off
//! - Absolute and relative volume, mute toggle
//! - A live model of volume, mute, input and power, kept current by decoding
//!   the frames the speaker pushes and by polling it
//! - Automatic reconnection after the socket closes
//! - Event subscriptions for lifecycle, transport errors and state changes
//!
//! # Quick Start
//!
//! ```no_run
//! use kef_wireless::{ClientOptions, KefClient, KefEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = KefClient::new(ClientOptions::new("192.168.1.40"))?;
//!     let mut events = client.subscribe();
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             KefEvent::State(state) => println!("{:?}", state),
//!             KefEvent::Lifecycle { state, .. } => println!("socket {}", state),
//!             KefEvent::TransportError(e) => eprintln!("socket error: {}", e),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Client**: public handle; every call is a message to the session
//! - **Connection**: session task owning the socket, lifecycle state machine
//!   and reconnection
//! - **Poll**: single-flight "volume, wait, source" state check
//! - **State**: device snapshot and change detection
//! - **Protocol**: command tables and frame decoding
//! - **Timer**: epoch-keyed cancellable delays

mod client;
mod config;
mod connection;
mod error;
mod poll;
pub mod protocol;
mod state;
mod subscription;
mod timer;
mod types;

// Public exports
pub use client::KefClient;
pub use config::{ClientOptions, DEFAULT_PORT};
pub use connection::{Connector, TcpConnector};
pub use error::{FrameError, KefError, Result};
pub use poll::{Phase, SingleFlight};
pub use subscription::{EventReceiver, KefEvent};
pub use types::{ConnectionState, DeviceSnapshot, Power, Source};
