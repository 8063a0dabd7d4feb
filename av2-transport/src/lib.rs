//! Serial transport engine for the AV2 amplifier control link
//!
//! This crate owns everything byte-level on the half-duplex serial
//! connection to the amplifier:
//!
//! ```text
//! [Amplifier facade]                ← av2-amplifier (semantic API)
//!        |
//!   [CommandQueue]                  ← single-flight FIFO + timing discipline
//!        |
//!    [Channel]                      ← SerialChannel (9600 8N1) or a test double
//!        |
//!   frame codec / status decoder    ← pure byte transforms, no I/O
//! ```
//!
//! Outbound commands are serialised through [`CommandQueue`], which
//! enforces the device's inter-command gap and the two-phase
//! attention-byte write. Inbound frames arrive asynchronously on the
//! channel's broadcast stream regardless of outbound state.

pub mod error;
pub mod frame;
pub mod protocol;
pub mod queue;
pub mod serial;
pub mod status;

pub use error::TransportError;
pub use frame::FrameError;
pub use queue::CommandQueue;
pub use serial::SerialChannel;
pub use status::{
    try_parse_status, DecodeMode, DistanceUnits, FirmwareVersion, Input, InputLabel,
    InputMenuStatus, ParseError, ParsedStatus, SoftwareVersion, SpeakerMenuStatus, SpeakerSize,
    StatusResponse, SystemStatus,
};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// The physical channel seam - implemented by [`SerialChannel`] and by
/// test doubles.
///
/// `write` and `drain` are the transmitter's two primitives: `drain`
/// resolves once previously written bytes have been fully handed to the
/// device, which is the suspension point the timing discipline in
/// [`CommandQueue`] is built on. Inbound traffic is exposed as a
/// broadcast stream of raw frames with the 0xFF delimiter already
/// stripped; subscribers decode independently of the outbound side.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Write raw bytes to the link.
    async fn write(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Wait until previously written bytes have been flushed to the device.
    async fn drain(&self) -> Result<(), TransportError>;

    /// Subscribe to inbound frames (0xFF-delimited, delimiter stripped).
    fn subscribe_frames(&self) -> broadcast::Receiver<Vec<u8>>;
}

/// Type alias for a shared channel handle
pub type BoxedChannel = Arc<dyn Channel>;
