//! The framer contract shared by [`rtu::RtuFramer`] and [`socket::SocketFramer`]:
//! turn an unreliable byte stream into discrete, validated frames.

pub mod rtu;
pub mod socket;

use crate::modbus::pdu::Pdu;
use crate::modbus::error::DecodeError;

/// What `process_incoming` hands back for each frame boundary it finds.
/// A decode failure on an otherwise well-framed message is reported rather
/// than silently dropped, but framing continues past it rather than
/// deadlocking on a single bad frame.
///
/// `slave_id`/`transaction_id` identify which in-flight transaction (if any)
/// the failed frame belongs to, the same way a successful `Frame`'s fields
/// do, so a waiting dispatcher can tell a decode failure on its own pending
/// request apart from line noise meant for nobody.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    Frame(Pdu),
    DecodeFailed {
        function_code: u8,
        source: DecodeError,
        slave_id: Option<u8>,
        transaction_id: Option<u16>,
    },
}

/// Shared by both framers: feed newly arrived bytes and drain as many
/// complete frames as the buffer currently holds. Malformed prefixes, CRC
/// mismatches, and other resync noise are handled internally and never
/// appear as `FrameEvent`s.
pub trait Framer {
    fn process_incoming(&mut self, bytes: &[u8], on_frame: &mut dyn FnMut(FrameEvent));
}
