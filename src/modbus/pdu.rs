//! The Protocol Data Unit: a tagged-variant sum type shared by both carriers.
//!
//! The framer never inspects a [`Pdu`] beyond its `function_code`; only the
//! registry (see [`super::registry`]) knows how a function code's bytes map
//! onto a [`PduBody`] variant, and that mapping differs between requests and
//! responses carrying the very same function code.

use crate::modbus::error::DecodeError;

/// Which side of a request/response pair a frame represents. The wire bytes
/// for the same function code differ by direction (e.g. a read-holding-
/// registers *request* is address+quantity, its *response* is a byte count
/// followed by register data), so decoding must know which is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

/// Function codes with the high bit set denote an exception response.
pub const EXCEPTION_BIT: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub start_address: u16,
    pub quantity: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitsResponse {
    pub values: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistersResponse {
    pub values: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleCoilWrite {
    pub address: u16,
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleRegisterWrite {
    pub address: u16,
    pub value: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipleCoilsWriteRequest {
    pub address: u16,
    pub values: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipleRegistersWriteRequest {
    pub address: u16,
    pub values: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipleWriteResponse {
    pub address: u16,
    pub quantity: u16,
}

/// The decoded payload, independent of carrier. Shared across the function
/// codes that have the same wire shape (e.g. every read response is a byte
/// count followed by data, whether it's coils or holding registers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PduBody {
    ReadRequest(ReadRequest),
    BitsResponse(BitsResponse),
    RegistersResponse(RegistersResponse),
    SingleCoilWrite(SingleCoilWrite),
    SingleRegisterWrite(SingleRegisterWrite),
    MultipleCoilsWriteRequest(MultipleCoilsWriteRequest),
    MultipleRegistersWriteRequest(MultipleRegistersWriteRequest),
    MultipleWriteResponse(MultipleWriteResponse),
    Exception { exception_code: u8 },
}

/// A fully addressed Modbus message: function code plus carrier-independent
/// identity fields plus the decoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub function_code: u8,
    pub slave_id: u8,
    pub transaction_id: u16,
    pub protocol_id: u16,
    pub body: PduBody,
}

impl Pdu {
    pub fn new(function_code: u8, slave_id: u8, body: PduBody) -> Self {
        Self {
            function_code,
            slave_id,
            transaction_id: 0,
            protocol_id: 0,
            body,
        }
    }

    pub fn is_exception(&self) -> bool {
        self.function_code & EXCEPTION_BIT != 0
    }

    pub fn exception_code(&self) -> Option<u8> {
        match self.body {
            PduBody::Exception { exception_code } => Some(exception_code),
            _ => None,
        }
    }

    /// Encodes the payload that follows `[slave_id, function_code]` on the
    /// wire. The carrier-specific encoders (RTU, MBAP) prepend the address
    /// header and append whatever trailer (CRC, nothing) the carrier needs.
    pub fn encode_payload(&self) -> Vec<u8> {
        match &self.body {
            PduBody::ReadRequest(r) => {
                let mut out = Vec::with_capacity(4);
                out.extend_from_slice(&r.start_address.to_be_bytes());
                out.extend_from_slice(&r.quantity.to_be_bytes());
                out
            }
            PduBody::BitsResponse(r) => {
                let byte_count = r.values.len().div_ceil(8);
                let mut out = Vec::with_capacity(1 + byte_count);
                out.push(byte_count as u8);
                let mut packed = vec![0u8; byte_count];
                for (i, &bit) in r.values.iter().enumerate() {
                    if bit {
                        packed[i / 8] |= 1 << (i % 8);
                    }
                }
                out.extend_from_slice(&packed);
                out
            }
            PduBody::RegistersResponse(r) => {
                let mut out = Vec::with_capacity(1 + r.values.len() * 2);
                out.push((r.values.len() * 2) as u8);
                for value in &r.values {
                    out.extend_from_slice(&value.to_be_bytes());
                }
                out
            }
            PduBody::SingleCoilWrite(w) => {
                let mut out = Vec::with_capacity(4);
                out.extend_from_slice(&w.address.to_be_bytes());
                out.extend_from_slice(&(if w.value { 0xFF00u16 } else { 0x0000 }).to_be_bytes());
                out
            }
            PduBody::SingleRegisterWrite(w) => {
                let mut out = Vec::with_capacity(4);
                out.extend_from_slice(&w.address.to_be_bytes());
                out.extend_from_slice(&w.value.to_be_bytes());
                out
            }
            PduBody::MultipleCoilsWriteRequest(w) => {
                let byte_count = w.values.len().div_ceil(8);
                let mut out = Vec::with_capacity(5 + byte_count);
                out.extend_from_slice(&w.address.to_be_bytes());
                out.extend_from_slice(&(w.values.len() as u16).to_be_bytes());
                out.push(byte_count as u8);
                let mut packed = vec![0u8; byte_count];
                for (i, &bit) in w.values.iter().enumerate() {
                    if bit {
                        packed[i / 8] |= 1 << (i % 8);
                    }
                }
                out.extend_from_slice(&packed);
                out
            }
            PduBody::MultipleRegistersWriteRequest(w) => {
                let mut out = Vec::with_capacity(5 + w.values.len() * 2);
                out.extend_from_slice(&w.address.to_be_bytes());
                out.extend_from_slice(&(w.values.len() as u16).to_be_bytes());
                out.push((w.values.len() * 2) as u8);
                for value in &w.values {
                    out.extend_from_slice(&value.to_be_bytes());
                }
                out
            }
            PduBody::MultipleWriteResponse(w) => {
                let mut out = Vec::with_capacity(4);
                out.extend_from_slice(&w.address.to_be_bytes());
                out.extend_from_slice(&w.quantity.to_be_bytes());
                out
            }
            PduBody::Exception { exception_code } => vec![*exception_code],
        }
    }
}

pub(super) fn unpack_bits(data: &[u8], count: u16) -> Vec<bool> {
    (0..count as usize)
        .map(|i| data[i / 8] & (1 << (i % 8)) != 0)
        .collect()
}

pub(super) fn unpack_registers(data: &[u8]) -> Result<Vec<u16>, DecodeError> {
    if data.len() % 2 != 0 {
        return Err(DecodeError::Truncated);
    }
    Ok(data
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_registers_response() {
        let pdu = Pdu::new(
            0x03,
            1,
            PduBody::RegistersResponse(RegistersResponse { values: vec![10] }),
        );
        assert_eq!(pdu.encode_payload(), vec![0x02, 0x00, 0x0A]);
    }

    #[test]
    fn encode_read_request() {
        let pdu = Pdu::new(
            0x03,
            1,
            PduBody::ReadRequest(ReadRequest {
                start_address: 0,
                quantity: 10,
            }),
        );
        assert_eq!(pdu.encode_payload(), vec![0x00, 0x00, 0x00, 0x0A]);
    }

    #[test]
    fn pack_bits_roundtrip() {
        let values = vec![true, false, true, true, false, false, false, false, true];
        let pdu = Pdu::new(0x01, 1, PduBody::BitsResponse(BitsResponse { values: values.clone() }));
        let payload = pdu.encode_payload();
        assert_eq!(payload[0], 2); // byte count for 9 bits
        let unpacked = unpack_bits(&payload[1..], values.len() as u16);
        assert_eq!(unpacked, values);
    }
}
