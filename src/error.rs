use thiserror::Error;

/// Result type for KEF operations
pub type Result<T> = std::result::Result<T, KefError>;

/// Errors that can occur when interacting with KEF speakers
#[derive(Error, Debug)]
pub enum KefError {
    /// No host was configured
    #[error("No host defined")]
    MissingHost,

    /// Max volume outside 1..=100
    #[error("Invalid max volume set: {0}")]
    InvalidMaxVolume(u8),

    /// Command issued while the socket is not connected
    #[error("Socket is not connected")]
    NotConnected,

    /// A state check is already in flight
    #[error("Already requesting state from speaker")]
    PollInProgress,

    /// Relative volume change requested before any volume report arrived
    #[error("Unable to change relative volume, current volume unknown")]
    UnknownVolume,

    /// Mute toggle requested before any volume report arrived
    #[error("Unable to toggle mute, current mute state unknown")]
    UnknownMuteState,

    /// Volume value that must not be encoded
    #[error("Volume value out of range: {value} (max volume {max_volume})")]
    VolumeOutOfRange {
        /// Requested raw value
        value: i32,
        /// Configured ceiling
        max_volume: u8,
    },

    /// Unknown input name
    #[error("Invalid input: {0}")]
    InvalidSource(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Inbound frame could not be decoded
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// The session task has stopped or the connection dropped mid-operation
    #[error("Connection closed")]
    ConnectionClosed,

    /// Channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),
}

/// Reasons an inbound buffer is not a usable device response
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// First byte is not the response header
    #[error("not a device response (header {0:#04x})")]
    NotAResponse(u8),

    /// Buffer too short for its type
    #[error("truncated frame ({0} bytes)")]
    Truncated(usize),

    /// Type byte not recognised
    #[error("unknown frame type {0:#04x}")]
    UnknownType(u8),

    /// Source/power payload not in any table
    #[error("unmapped source byte {0:#04x}")]
    UnknownSource(u8),
}
