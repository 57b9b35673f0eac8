//! The function-code registry: a process-wide immutable table mapping each
//! supported function code to its RTU frame-size calculators and decoders.
//!
//! Built once via [`std::sync::OnceLock`] from a static table of
//! `(function_code, size calculators, decoders)` triples, matching the
//! source's global-registry design without requiring runtime registration.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::modbus::error::{DecodeError, NeedMoreData};
use crate::modbus::pdu::{
    unpack_bits, unpack_registers, BitsResponse, Direction, MultipleCoilsWriteRequest,
    MultipleRegistersWriteRequest, MultipleWriteResponse, PduBody, ReadRequest,
    RegistersResponse, SingleCoilWrite, SingleRegisterWrite,
};

/// Exception responses are a fixed `uid + fc + exception_code + crc(2)`
/// shape regardless of the base function code.
pub const EXCEPTION_RTU_FRAME_SIZE: usize = 5;

pub struct PduSpec {
    pub function_code: u8,
    pub request_frame_size: fn(&[u8]) -> Result<usize, NeedMoreData>,
    pub response_frame_size: fn(&[u8]) -> Result<usize, NeedMoreData>,
    pub decode_request: fn(&[u8]) -> Result<PduBody, DecodeError>,
    pub decode_response: fn(&[u8]) -> Result<PduBody, DecodeError>,
}

fn fixed(size: usize) -> impl Fn(&[u8]) -> Result<usize, NeedMoreData> {
    move |_prefix| Ok(size)
}

fn byte_count_at(offset: usize, header_len: usize) -> impl Fn(&[u8]) -> Result<usize, NeedMoreData> {
    move |prefix| {
        if prefix.len() <= offset {
            return Err(NeedMoreData);
        }
        let byte_count = prefix[offset] as usize;
        Ok(header_len + byte_count + 2)
    }
}

fn read_request_size(prefix: &[u8]) -> Result<usize, NeedMoreData> {
    fixed(8)(prefix)
}

fn read_response_size(prefix: &[u8]) -> Result<usize, NeedMoreData> {
    byte_count_at(2, 3)(prefix)
}

fn decode_read_request(payload: &[u8]) -> Result<PduBody, DecodeError> {
    if payload.len() < 4 {
        return Err(DecodeError::Truncated);
    }
    Ok(PduBody::ReadRequest(ReadRequest {
        start_address: u16::from_be_bytes([payload[0], payload[1]]),
        quantity: u16::from_be_bytes([payload[2], payload[3]]),
    }))
}

fn decode_bits_response(payload: &[u8]) -> Result<PduBody, DecodeError> {
    let byte_count = *payload.first().ok_or(DecodeError::Truncated)? as usize;
    let data = payload.get(1..1 + byte_count).ok_or(DecodeError::Truncated)?;
    Ok(PduBody::BitsResponse(BitsResponse {
        values: unpack_bits(data, (byte_count * 8) as u16),
    }))
}

fn decode_registers_response(payload: &[u8]) -> Result<PduBody, DecodeError> {
    let byte_count = *payload.first().ok_or(DecodeError::Truncated)? as usize;
    let data = payload.get(1..1 + byte_count).ok_or(DecodeError::Truncated)?;
    Ok(PduBody::RegistersResponse(RegistersResponse {
        values: unpack_registers(data)?,
    }))
}

fn decode_single_coil(payload: &[u8]) -> Result<PduBody, DecodeError> {
    if payload.len() < 4 {
        return Err(DecodeError::Truncated);
    }
    let value = u16::from_be_bytes([payload[2], payload[3]]);
    Ok(PduBody::SingleCoilWrite(SingleCoilWrite {
        address: u16::from_be_bytes([payload[0], payload[1]]),
        value: value == 0xFF00,
    }))
}

fn decode_single_register(payload: &[u8]) -> Result<PduBody, DecodeError> {
    if payload.len() < 4 {
        return Err(DecodeError::Truncated);
    }
    Ok(PduBody::SingleRegisterWrite(SingleRegisterWrite {
        address: u16::from_be_bytes([payload[0], payload[1]]),
        value: u16::from_be_bytes([payload[2], payload[3]]),
    }))
}

fn decode_multiple_write_response(payload: &[u8]) -> Result<PduBody, DecodeError> {
    if payload.len() < 4 {
        return Err(DecodeError::Truncated);
    }
    Ok(PduBody::MultipleWriteResponse(MultipleWriteResponse {
        address: u16::from_be_bytes([payload[0], payload[1]]),
        quantity: u16::from_be_bytes([payload[2], payload[3]]),
    }))
}

fn decode_multiple_coils_request(payload: &[u8]) -> Result<PduBody, DecodeError> {
    if payload.len() < 5 {
        return Err(DecodeError::Truncated);
    }
    let quantity = u16::from_be_bytes([payload[2], payload[3]]);
    let byte_count = payload[4] as usize;
    let data = payload.get(5..5 + byte_count).ok_or(DecodeError::Truncated)?;
    Ok(PduBody::MultipleCoilsWriteRequest(MultipleCoilsWriteRequest {
        address: u16::from_be_bytes([payload[0], payload[1]]),
        values: unpack_bits(data, quantity),
    }))
}

fn decode_multiple_registers_request(payload: &[u8]) -> Result<PduBody, DecodeError> {
    if payload.len() < 5 {
        return Err(DecodeError::Truncated);
    }
    let byte_count = payload[4] as usize;
    let data = payload.get(5..5 + byte_count).ok_or(DecodeError::Truncated)?;
    Ok(PduBody::MultipleRegistersWriteRequest(
        MultipleRegistersWriteRequest {
            address: u16::from_be_bytes([payload[0], payload[1]]),
            values: unpack_registers(data)?,
        },
    ))
}

fn build_registry() -> HashMap<u8, PduSpec> {
    let mut map = HashMap::new();

    map.insert(
        0x01,
        PduSpec {
            function_code: 0x01,
            request_frame_size: read_request_size,
            response_frame_size: read_response_size,
            decode_request: decode_read_request,
            decode_response: decode_bits_response,
        },
    );
    map.insert(
        0x02,
        PduSpec {
            function_code: 0x02,
            request_frame_size: read_request_size,
            response_frame_size: read_response_size,
            decode_request: decode_read_request,
            decode_response: decode_bits_response,
        },
    );
    map.insert(
        0x03,
        PduSpec {
            function_code: 0x03,
            request_frame_size: read_request_size,
            response_frame_size: read_response_size,
            decode_request: decode_read_request,
            decode_response: decode_registers_response,
        },
    );
    map.insert(
        0x04,
        PduSpec {
            function_code: 0x04,
            request_frame_size: read_request_size,
            response_frame_size: read_response_size,
            decode_request: decode_read_request,
            decode_response: decode_registers_response,
        },
    );
    map.insert(
        0x05,
        PduSpec {
            function_code: 0x05,
            request_frame_size: |p| fixed(8)(p),
            response_frame_size: |p| fixed(8)(p),
            decode_request: decode_single_coil,
            decode_response: decode_single_coil,
        },
    );
    map.insert(
        0x06,
        PduSpec {
            function_code: 0x06,
            request_frame_size: |p| fixed(8)(p),
            response_frame_size: |p| fixed(8)(p),
            decode_request: decode_single_register,
            decode_response: decode_single_register,
        },
    );
    map.insert(
        0x0F,
        PduSpec {
            function_code: 0x0F,
            request_frame_size: byte_count_at(6, 7),
            response_frame_size: |p| fixed(8)(p),
            decode_request: decode_multiple_coils_request,
            decode_response: decode_multiple_write_response,
        },
    );
    map.insert(
        0x10,
        PduSpec {
            function_code: 0x10,
            request_frame_size: byte_count_at(6, 7),
            response_frame_size: |p| fixed(8)(p),
            decode_request: decode_multiple_registers_request,
            decode_response: decode_multiple_write_response,
        },
    );

    map
}

fn registry() -> &'static HashMap<u8, PduSpec> {
    static REGISTRY: OnceLock<HashMap<u8, PduSpec>> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

pub fn lookup(function_code: u8) -> Option<&'static PduSpec> {
    registry().get(&function_code)
}

/// True if `function_code` (with the exception bit stripped) names a
/// function this registry knows how to size and decode.
pub fn is_known_function_code(function_code: u8) -> bool {
    let base = function_code & !crate::modbus::pdu::EXCEPTION_BIT;
    registry().contains_key(&base)
}

/// Computes the total RTU frame length (`uid + fc + payload + crc`) from the
/// bytes seen so far, starting at `uid`. Returns `Err(NeedMoreData)` when the
/// calculator needs bytes that haven't arrived yet.
pub fn calculate_rtu_frame_size(
    function_code: u8,
    direction: Direction,
    prefix: &[u8],
) -> Result<usize, NeedMoreData> {
    if function_code & crate::modbus::pdu::EXCEPTION_BIT != 0 {
        return Ok(EXCEPTION_RTU_FRAME_SIZE);
    }
    let spec = lookup(function_code).ok_or(NeedMoreData)?;
    match direction {
        Direction::Request => (spec.request_frame_size)(prefix),
        Direction::Response => (spec.response_frame_size)(prefix),
    }
}

/// Decodes `payload` (the bytes after `[uid, function_code]`, excluding the
/// CRC or MBAP trailer) into a [`PduBody`].
pub fn decode(
    function_code: u8,
    direction: Direction,
    payload: &[u8],
) -> Result<PduBody, DecodeError> {
    if function_code & crate::modbus::pdu::EXCEPTION_BIT != 0 {
        let exception_code = *payload.first().ok_or(DecodeError::Truncated)?;
        return Ok(PduBody::Exception { exception_code });
    }
    let spec = lookup(function_code).ok_or(DecodeError::UnknownFunction(function_code))?;
    match direction {
        Direction::Request => (spec.decode_request)(payload),
        Direction::Response => (spec.decode_response)(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_holding_registers_response_size() {
        // uid fc bytecount data... crc crc
        let prefix = [0x01, 0x03, 0x02, 0x00, 0x0A];
        let size = calculate_rtu_frame_size(0x03, Direction::Response, &prefix).unwrap();
        assert_eq!(size, 3 + 2 + 2);
    }

    #[test]
    fn read_holding_registers_response_needs_more_data() {
        let prefix = [0x01, 0x03];
        assert_eq!(
            calculate_rtu_frame_size(0x03, Direction::Response, &prefix),
            Err(NeedMoreData)
        );
    }

    #[test]
    fn exception_frame_size_is_fixed() {
        let prefix = [0x01, 0x83];
        assert_eq!(
            calculate_rtu_frame_size(0x83, Direction::Response, &prefix),
            Ok(EXCEPTION_RTU_FRAME_SIZE)
        );
    }

    #[test]
    fn decode_registers_response_roundtrip() {
        let payload = [0x02, 0x00, 0x0A];
        let body = decode(0x03, Direction::Response, &payload).unwrap();
        assert_eq!(
            body,
            PduBody::RegistersResponse(RegistersResponse { values: vec![10] })
        );
    }

    #[test]
    fn unknown_function_code() {
        assert!(lookup(0x99).is_none());
        assert!(!is_known_function_code(0x99));
    }
}
