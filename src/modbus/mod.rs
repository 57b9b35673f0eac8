//! The Modbus protocol core: framing, encoding, and transaction dispatch,
//! independent of which carrier (RTU serial or MBAP/TCP) is in use.
//!
//! Control flow on receive: bytes arrive from a transport, are appended to
//! the framer's buffer, and the framer is polled for complete frames; each
//! extracted frame is decoded by the [`registry`] and handed to a callback.
//! Control flow on send: a [`pdu::Pdu`] is turned into wire bytes by
//! [`encoder`], the [`transaction`] dispatcher enforces the RTU inter-frame
//! gap, and the transport sends it.

pub mod buffer;
pub mod crc;
pub mod encoder;
pub mod error;
pub mod framer;
pub mod pdu;
pub mod registry;
pub mod transaction;
pub mod transport;

pub use error::ModbusError;
pub use pdu::{Direction, Pdu, PduBody};
pub use transaction::{Dispatcher, ExecuteOutcome};
