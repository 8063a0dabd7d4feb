//! Amplifier interface error types

use av2_transport::TransportError;
use thiserror::Error;

/// Errors from amplifier operations
#[derive(Error, Debug)]
pub enum AmplifierError {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
