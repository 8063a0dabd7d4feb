//! Transport error types

use thiserror::Error;

use crate::frame::FrameError;

/// Errors that can occur on the serial control link
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Serial port open failed: {0}")]
    PortOpen(String),

    #[error("Channel write failed: {0}")]
    Write(String),

    #[error("Channel drain failed: {0}")]
    Drain(String),

    #[error("Channel disconnected")]
    Disconnected,

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl From<serialport::Error> for TransportError {
    fn from(e: serialport::Error) -> Self {
        TransportError::PortOpen(e.to_string())
    }
}
