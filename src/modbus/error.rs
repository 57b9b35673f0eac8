//! The protocol-core error taxonomy: IO, decode, exception-response, and
//! timeout errors, layered beneath the ambient [`crate::RelayError`].

use std::time::Duration;
use thiserror::Error;

/// Raised by a frame-size calculator when the buffer doesn't yet hold enough
/// bytes to know the frame's total length (e.g. the byte-count field of a
/// variable-length read response hasn't arrived yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeedMoreData;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown function code {0:#04x}")]
    UnknownFunction(u8),
    #[error("payload truncated for the declared byte count")]
    Truncated,
    #[error("payload byte count does not match declared quantity")]
    BadByteCount,
}

/// The core's own error taxonomy. Converted to [`crate::RelayError`] at the
/// boundary where the relay binary drives the protocol core.
///
/// CRC mismatches and exception responses are deliberately absent here: a CRC
/// failure is resync noise the RTU framer swallows and retries past, and an
/// exception response is a valid PDU (`PduBody::Exception`) delivered to the
/// caller rather than an error condition, matching a transparent relay's job
/// of forwarding whatever the device says instead of acting as a Modbus
/// master with its own exception-raising semantics.
#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame error: {0}")]
    Frame(String),

    #[error("failed to decode payload for function {function_code:#04x}: {source}")]
    Decode {
        function_code: u8,
        #[source]
        source: DecodeError,
    },

    #[error("no response within {timeout:?} after {attempts} attempt(s)")]
    Timeout { timeout: Duration, attempts: u8 },

    #[error("execute() called with no active transport")]
    NotConnected,
}
