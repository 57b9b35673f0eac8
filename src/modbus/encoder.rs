//! Carrier-specific wire encoding: RTU appends a CRC, MBAP prepends a
//! 7-byte header. Both share the same [`super::pdu::Pdu::encode_payload`].

use crate::modbus::crc;
use crate::modbus::pdu::Pdu;

/// `[slave_id, function_code] || payload || crc_lo || crc_hi`.
pub fn encode_rtu(pdu: &Pdu) -> Vec<u8> {
    let payload = pdu.encode_payload();
    let mut frame = Vec::with_capacity(2 + payload.len() + 2);
    frame.push(pdu.slave_id);
    frame.push(pdu.function_code);
    frame.extend_from_slice(&payload);
    let checksum = crc::compute(&frame);
    frame.extend_from_slice(&crc::to_wire_bytes(checksum));
    frame
}

/// MBAP header (transaction id, protocol id, length, unit id) followed by the
/// function code and payload. `length` covers everything after itself:
/// unit id + function code + payload.
pub fn encode_mbap(pdu: &Pdu) -> Vec<u8> {
    let payload = pdu.encode_payload();
    let length = 1 + 1 + payload.len();
    let mut frame = Vec::with_capacity(7 + 1 + payload.len());
    frame.extend_from_slice(&pdu.transaction_id.to_be_bytes());
    frame.extend_from_slice(&pdu.protocol_id.to_be_bytes());
    frame.extend_from_slice(&(length as u16).to_be_bytes());
    frame.push(pdu.slave_id);
    frame.push(pdu.function_code);
    frame.extend_from_slice(&payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::pdu::{PduBody, ReadRequest, RegistersResponse};

    #[test]
    fn rtu_frame_matches_known_crc() {
        let pdu = Pdu::new(
            3,
            1,
            PduBody::ReadRequest(ReadRequest {
                start_address: 0,
                quantity: 10,
            }),
        );
        let frame = encode_rtu(&pdu);
        assert_eq!(&frame[..6], &[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]);
        assert_eq!(&frame[6..], &crc::to_wire_bytes(0xCDC5));
    }

    #[test]
    fn mbap_header_length_excludes_itself() {
        let mut pdu = Pdu::new(
            3,
            1,
            PduBody::RegistersResponse(RegistersResponse { values: vec![10] }),
        );
        pdu.transaction_id = 0x1234;
        let frame = encode_mbap(&pdu);
        assert_eq!(&frame[0..2], &[0x12, 0x34]);
        assert_eq!(&frame[2..4], &[0x00, 0x00]);
        // unit id + fc + (byte_count + 2 register bytes) = 1+1+3 = 5
        assert_eq!(&frame[4..6], &[0x00, 0x05]);
        assert_eq!(frame[6], 1);
        assert_eq!(frame[7], 3);
    }
}
