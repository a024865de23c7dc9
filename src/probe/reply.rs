//! Decoding of received ICMP frames.
//!
//! Frames come from a raw IPv4 socket and still carry the outer IP header,
//! which is assumed to be 20 bytes (no options). All fields are read at fixed
//! offsets behind that header.

use pnet::packet::icmp::IcmpTypes;
use std::time::Duration;

use crate::probe::ProbeError;
use crate::probe::checksum::checksum;

/// Outer IPv4 header size assumed in front of every ICMP message
pub const IPV4_HEADER_SIZE: usize = 20;
/// Bytes needed to read type and code
pub const CLASSIFY_MIN_LEN: usize = IPV4_HEADER_SIZE + 2;
/// Bytes needed to decode an echo reply up to the payload text
pub const ECHO_REPLY_MIN_LEN: usize = IPV4_HEADER_SIZE + 16;

const TYPE_OFFSET: usize = 20;
const CODE_OFFSET: usize = 21;
const CHECKSUM_OFFSET: usize = 22;
const IDENTIFIER_OFFSET: usize = 24;
const SEQUENCE_OFFSET: usize = 26;
const TIMESTAMP_OFFSET: usize = 28;
const DATA_OFFSET: usize = 36;

/// Reasons for Time Exceeded (type 11), indexed by code
const TIME_EXCEEDED_REASONS: [&str; 2] = [
    "Time to Live exceeded in Transit",
    "Fragment Reassembly Time Exceeded",
];

/// Reasons for Destination Unreachable (type 3), indexed by code
const UNREACHABLE_REASONS: [&str; 16] = [
    "Net Unreachable",
    "Host Unreachable",
    "Protocol Unreachable",
    "Port Unreachable",
    "Fragmentation Needed and Don't Fragment was Set",
    "Source Route Failed",
    "Destination Network Unknown",
    "Destination Host Unknown",
    "Source Host Isolated",
    "Communication with Destination Network is Administratively Prohibited",
    "Communication with Destination Host is Administratively Prohibited",
    "Destination Network Unreachable for Type of Service",
    "Destination Host Unreachable for Type of Service",
    "Communication Administratively Prohibited",
    "Host Precedence Violation",
    "Precedence cutoff in effect",
];

/// Human-readable reason for a Time Exceeded code
pub fn time_exceeded_reason(code: u8) -> &'static str {
    TIME_EXCEEDED_REASONS
        .get(code as usize)
        .copied()
        .unwrap_or("Unknown Time Exceeded code")
}

/// Human-readable reason for a Destination Unreachable code
pub fn unreachable_reason(code: u8) -> &'static str {
    UNREACHABLE_REASONS
        .get(code as usize)
        .copied()
        .unwrap_or("Unknown Destination Unreachable code")
}

/// What kind of ICMP message a frame carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    EchoReply,
    TimeExceeded { code: u8 },
    DestUnreachable { code: u8 },
    Other { icmp_type: u8, code: u8 },
}

impl ReplyClass {
    /// Reason string for ICMP error classes
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::TimeExceeded { code } => Some(time_exceeded_reason(*code)),
            Self::DestUnreachable { code } => Some(unreachable_reason(*code)),
            Self::EchoReply | Self::Other { .. } => None,
        }
    }
}

/// Classify a received frame by its ICMP type
pub fn classify(frame: &[u8]) -> Result<ReplyClass, ProbeError> {
    if frame.len() < CLASSIFY_MIN_LEN {
        return Err(ProbeError::Malformed {
            len: frame.len(),
            needed: CLASSIFY_MIN_LEN,
        });
    }

    let icmp_type = frame[TYPE_OFFSET];
    let code = frame[CODE_OFFSET];

    let class = match icmp_type {
        t if t == IcmpTypes::EchoReply.0 => ReplyClass::EchoReply,
        t if t == IcmpTypes::TimeExceeded.0 => ReplyClass::TimeExceeded { code },
        t if t == IcmpTypes::DestinationUnreachable.0 => ReplyClass::DestUnreachable { code },
        _ => ReplyClass::Other { icmp_type, code },
    };
    Ok(class)
}

/// A received echo reply. Fields are decoded from the frame on access.
#[derive(Debug, Clone, PartialEq)]
pub struct EchoReply {
    raw: Vec<u8>,
}

impl EchoReply {
    /// Wrap a received frame, checking it is long enough to decode
    pub fn parse(raw: Vec<u8>) -> Result<Self, ProbeError> {
        if raw.len() < ECHO_REPLY_MIN_LEN {
            return Err(ProbeError::Malformed {
                len: raw.len(),
                needed: ECHO_REPLY_MIN_LEN,
            });
        }
        Ok(Self { raw })
    }

    /// The full frame including the outer IP header
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn icmp_type(&self) -> u8 {
        self.raw[TYPE_OFFSET]
    }

    pub fn icmp_code(&self) -> u8 {
        self.raw[CODE_OFFSET]
    }

    pub fn checksum(&self) -> u16 {
        self.read_u16(CHECKSUM_OFFSET)
    }

    pub fn identifier(&self) -> u16 {
        self.read_u16(IDENTIFIER_OFFSET)
    }

    pub fn sequence(&self) -> u16 {
        self.read_u16(SEQUENCE_OFFSET)
    }

    /// Send timestamp echoed back from the request, seconds since the epoch
    pub fn sent_timestamp(&self) -> f64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.raw[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8]);
        f64::from_ne_bytes(bytes)
    }

    /// Payload text after the timestamp
    pub fn data(&self) -> String {
        String::from_utf8_lossy(&self.raw[DATA_OFFSET..]).into_owned()
    }

    /// True when the ICMP checksum over the message verifies
    pub fn checksum_ok(&self) -> bool {
        checksum(&self.raw[IPV4_HEADER_SIZE..]) == 0
    }

    /// Round trip measured against the echoed send timestamp
    pub fn embedded_rtt(&self, received_at: f64) -> Option<Duration> {
        let elapsed = received_at - self.sent_timestamp();
        if elapsed.is_finite() && elapsed >= 0.0 {
            Some(Duration::from_secs_f64(elapsed))
        } else {
            None
        }
    }

    fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.raw[offset], self.raw[offset + 1]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::icmp::{EchoRequest, PAYLOAD_TEXT};

    /// Wrap an ICMP message in a zeroed 20-byte IPv4 header
    fn frame(icmp: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; IPV4_HEADER_SIZE];
        frame[0] = 0x45;
        frame.extend_from_slice(icmp);
        frame
    }

    /// Turn a built echo request into the reply a host would send
    fn reply_frame(request: &EchoRequest) -> Vec<u8> {
        let mut icmp = request.packet().unwrap().to_vec();
        icmp[0] = 0;
        icmp[2..4].copy_from_slice(&[0, 0]);
        let cksum = checksum(&icmp);
        icmp[2..4].copy_from_slice(&cksum.to_be_bytes());
        frame(&icmp)
    }

    #[test]
    fn test_decode_recovers_request_fields() {
        let mut request = EchoRequest::new();
        request.set_timestamp(1234.5);
        request.build(1234, 42);

        let reply = EchoReply::parse(reply_frame(&request)).unwrap();
        assert_eq!(reply.icmp_type(), 0);
        assert_eq!(reply.icmp_code(), 0);
        assert_eq!(reply.identifier(), 1234);
        assert_eq!(reply.sequence(), 42);
        assert_eq!(reply.sent_timestamp(), 1234.5);
        assert_eq!(reply.data(), PAYLOAD_TEXT);
        assert!(reply.checksum_ok());
    }

    #[test]
    fn test_decode_bounds() {
        for value in [0u16, 65535] {
            let mut request = EchoRequest::new();
            request.build(value, value);
            let reply = EchoReply::parse(reply_frame(&request)).unwrap();
            assert_eq!(reply.identifier(), value);
            assert_eq!(reply.sequence(), value);
        }
    }

    #[test]
    fn test_short_frame_is_malformed() {
        let err = EchoReply::parse(vec![0u8; ECHO_REPLY_MIN_LEN - 1]).unwrap_err();
        assert!(matches!(err, ProbeError::Malformed { len: 35, needed: 36 }));

        let err = classify(&[0u8; 21]).unwrap_err();
        assert!(matches!(err, ProbeError::Malformed { len: 21, needed: 22 }));
    }

    #[test]
    fn test_minimum_echo_reply_has_empty_data() {
        let reply = EchoReply::parse(vec![0u8; ECHO_REPLY_MIN_LEN]).unwrap();
        assert_eq!(reply.data(), "");
    }

    #[test]
    fn test_classify_types() {
        assert_eq!(classify(&frame(&[0, 0])).unwrap(), ReplyClass::EchoReply);
        assert_eq!(
            classify(&frame(&[11, 0])).unwrap(),
            ReplyClass::TimeExceeded { code: 0 }
        );
        assert_eq!(
            classify(&frame(&[3, 13])).unwrap(),
            ReplyClass::DestUnreachable { code: 13 }
        );
        assert_eq!(
            classify(&frame(&[8, 0])).unwrap(),
            ReplyClass::Other { icmp_type: 8, code: 0 }
        );
    }

    #[test]
    fn test_reason_strings() {
        assert_eq!(time_exceeded_reason(0), "Time to Live exceeded in Transit");
        assert_eq!(time_exceeded_reason(1), "Fragment Reassembly Time Exceeded");
        assert_eq!(unreachable_reason(3), "Port Unreachable");
        assert_eq!(unreachable_reason(15), "Precedence cutoff in effect");
        assert!(unreachable_reason(16).starts_with("Unknown"));
        assert_eq!(ReplyClass::EchoReply.reason(), None);
    }

    #[test]
    fn test_embedded_rtt() {
        let mut request = EchoRequest::new();
        request.set_timestamp(100.0);
        request.build(1, 1);
        let reply = EchoReply::parse(reply_frame(&request)).unwrap();

        assert_eq!(reply.embedded_rtt(100.25), Some(Duration::from_millis(250)));
        assert_eq!(reply.embedded_rtt(99.0), None);
    }
}
