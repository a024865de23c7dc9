use log::{Level, debug, log_enabled, trace};
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpType, IcmpTypes};
use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::lookup::resolve_target;
use crate::probe::ProbeError;
use crate::probe::checksum::checksum;

/// ICMP header size (fixed)
pub const ICMP_HEADER_SIZE: usize = 8;
/// Send timestamp that prefixes the payload text
pub const TIMESTAMP_SIZE: usize = 8;
/// Payload text carried by every echo request
pub const PAYLOAD_TEXT: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Get process identifier for ICMP identification field
pub fn get_identifier() -> u16 {
    std::process::id() as u16
}

/// Seconds since the Unix epoch, as carried in the payload timestamp
pub fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// An outgoing ICMP echo request.
///
/// Field setters discard the encoded packet; only [`EchoRequest::finalize`]
/// produces bytes that can be transmitted, so a transmitted checksum always
/// covers exactly the header and body that are sent.
#[derive(Debug, Clone)]
pub struct EchoRequest {
    target: String,
    destination: Option<Ipv4Addr>,
    icmp_type: u8,
    icmp_code: u8,
    identifier: u16,
    sequence: u16,
    ttl: u8,
    payload: String,
    timestamp: f64,
    /// Set by `set_timestamp`; `build` then keeps the explicit value
    timestamp_pinned: bool,
    checksum: u16,
    encoded: Option<Vec<u8>>,
}

impl Default for EchoRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoRequest {
    pub fn new() -> Self {
        Self {
            target: String::new(),
            destination: None,
            icmp_type: IcmpTypes::EchoRequest.0,
            icmp_code: 0,
            identifier: 0,
            sequence: 0,
            ttl: 255,
            payload: String::new(),
            timestamp: 0.0,
            timestamp_pinned: false,
            checksum: 0,
            encoded: None,
        }
    }

    /// Assign the probe target and resolve it.
    ///
    /// An empty or whitespace-only name is stored without resolving; the
    /// transport falls back to loopback for such requests.
    pub fn set_target(&mut self, name: &str) -> Result<(), ProbeError> {
        self.target = name.to_string();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        self.destination = Some(resolve_target(trimmed)?);
        Ok(())
    }

    /// Set type 8 / code 0 with the given identifier and sequence, stamp the
    /// send time, then finalize.
    pub fn build(&mut self, identifier: u16, sequence: u16) -> &[u8] {
        if !self.timestamp_pinned {
            self.timestamp = epoch_seconds();
        }
        self.icmp_type = IcmpTypes::EchoRequest.0;
        self.icmp_code = 0;
        self.identifier = identifier;
        self.sequence = sequence;
        self.payload = PAYLOAD_TEXT.to_string();
        self.finalize()
    }

    /// Encode body, pack header with zero checksum, checksum header+body,
    /// re-pack header with the final checksum.
    pub fn finalize(&mut self) -> &[u8] {
        let body = self.encode_body();
        let mut buffer = vec![0u8; ICMP_HEADER_SIZE + body.len()];
        buffer[ICMP_HEADER_SIZE..].copy_from_slice(&body);

        self.pack_header(&mut buffer, 0);
        let cksum = checksum(&buffer);
        self.pack_header(&mut buffer, cksum);
        self.checksum = cksum;

        trace!(
            "finalized echo request id={} seq={} checksum={:#06x} len={}",
            self.identifier,
            self.sequence,
            cksum,
            buffer.len()
        );
        if log_enabled!(Level::Trace) {
            trace!("header ({} bytes):", ICMP_HEADER_SIZE);
            for row in hex_rows(&buffer[..ICMP_HEADER_SIZE]) {
                trace!("  {}", row);
            }
            trace!("data ({} bytes):", buffer.len() - ICMP_HEADER_SIZE);
            for row in hex_rows(&buffer[ICMP_HEADER_SIZE..]) {
                trace!("  {}", row);
            }
        }
        self.encoded.insert(buffer).as_slice()
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(TIMESTAMP_SIZE + self.payload.len());
        body.extend_from_slice(&self.timestamp.to_ne_bytes());
        body.extend_from_slice(self.payload.as_bytes());
        body
    }

    fn pack_header(&self, buffer: &mut [u8], cksum: u16) {
        // Buffer is always at least ICMP_HEADER_SIZE long
        if let Some(mut packet) = MutableEchoRequestPacket::new(buffer) {
            packet.set_icmp_type(IcmpType::new(self.icmp_type));
            packet.set_icmp_code(IcmpCode::new(self.icmp_code));
            packet.set_checksum(cksum);
            packet.set_identifier(self.identifier);
            packet.set_sequence_number(self.sequence);
        }
    }

    /// The finalized header+body ready for transmission
    pub fn packet(&self) -> Result<&[u8], ProbeError> {
        self.encoded.as_deref().ok_or(ProbeError::NotFinalized)
    }

    pub fn is_finalized(&self) -> bool {
        self.encoded.is_some()
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn destination(&self) -> Option<Ipv4Addr> {
        self.destination
    }

    pub fn icmp_type(&self) -> u8 {
        self.icmp_type
    }

    pub fn icmp_code(&self) -> u8 {
        self.icmp_code
    }

    /// Checksum embedded by the last `finalize()`
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    /// Payload text without the timestamp prefix
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn set_icmp_type(&mut self, icmp_type: u8) {
        self.icmp_type = icmp_type;
        self.invalidate();
    }

    pub fn set_icmp_code(&mut self, icmp_code: u8) {
        self.icmp_code = icmp_code;
        self.invalidate();
    }

    pub fn set_identifier(&mut self, identifier: u16) {
        self.identifier = identifier;
        self.invalidate();
    }

    pub fn set_sequence(&mut self, sequence: u16) {
        self.sequence = sequence;
        self.invalidate();
    }

    /// Pin the payload timestamp; later builds keep it
    pub fn set_timestamp(&mut self, timestamp: f64) {
        self.timestamp = timestamp;
        self.timestamp_pinned = true;
        self.invalidate();
    }

    /// TTL travels as a socket option, not in the ICMP bytes
    pub fn set_ttl(&mut self, ttl: u8) {
        self.ttl = ttl;
    }

    fn invalidate(&mut self) {
        if self.encoded.take().is_some() {
            debug!("echo request seq={} modified; checksum invalidated", self.sequence);
        }
    }
}

/// Offset-prefixed hex rows, 16 bytes each
pub(crate) fn hex_rows(bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(i, chunk)| {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
            format!("{:04x}  {}", i * 16, hex.join(" "))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn built(identifier: u16, sequence: u16) -> EchoRequest {
        let mut request = EchoRequest::new();
        request.set_timestamp(1_700_000_000.25);
        request.build(identifier, sequence);
        request
    }

    #[test]
    fn test_build_echo_request() {
        let request = built(1234, 5678);
        let packet = request.packet().unwrap();
        assert_eq!(packet.len(), ICMP_HEADER_SIZE + TIMESTAMP_SIZE + PAYLOAD_TEXT.len());
        assert_eq!(packet[0], 8); // Echo Request type
        assert_eq!(packet[1], 0); // Code
        assert_eq!(u16::from_be_bytes([packet[4], packet[5]]), 1234);
        assert_eq!(u16::from_be_bytes([packet[6], packet[7]]), 5678);
        assert_eq!(&packet[16..], PAYLOAD_TEXT.as_bytes());
    }

    #[test]
    fn test_checksum_embedded_and_valid() {
        let request = built(1234, 0);
        let packet = request.packet().unwrap();
        assert_eq!(u16::from_be_bytes([packet[2], packet[3]]), request.checksum());
        assert_eq!(checksum(packet), 0);
    }

    #[test]
    fn test_build_is_idempotent() {
        let mut request = built(42, 7);
        let first = request.packet().unwrap().to_vec();
        let second = request.build(42, 7).to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn test_mutation_invalidates_packet() {
        let mut request = built(1, 1);
        request.set_sequence(2);
        assert!(matches!(request.packet(), Err(ProbeError::NotFinalized)));

        request.finalize();
        let packet = request.packet().unwrap();
        assert_eq!(u16::from_be_bytes([packet[6], packet[7]]), 2);
        assert_eq!(checksum(packet), 0);
    }

    #[test]
    fn test_ttl_does_not_invalidate() {
        let mut request = built(1, 1);
        request.set_ttl(0);
        assert!(request.is_finalized());
        request.set_ttl(255);
        assert_eq!(request.ttl(), 255);
    }

    #[test]
    fn test_unbuilt_request_is_not_transmittable() {
        let request = EchoRequest::new();
        assert!(request.packet().is_err());
    }

    #[test]
    fn test_identifier_and_sequence_bounds() {
        for value in [0u16, 65535] {
            let request = built(value, value);
            let packet = request.packet().unwrap();
            assert_eq!(u16::from_be_bytes([packet[4], packet[5]]), value);
            assert_eq!(u16::from_be_bytes([packet[6], packet[7]]), value);
            assert_eq!(checksum(packet), 0);
        }
    }

    #[test]
    fn test_timestamp_prefix_is_native_f64() {
        let request = built(1, 1);
        let packet = request.packet().unwrap();
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&packet[8..16]);
        assert_eq!(f64::from_ne_bytes(raw), 1_700_000_000.25);
    }

    #[test]
    fn test_build_stamps_send_time() {
        let mut request = EchoRequest::new();
        let before = epoch_seconds();
        request.build(1, 0);
        let after = epoch_seconds();
        assert!(request.timestamp() >= before && request.timestamp() <= after);

        let packet = request.packet().unwrap();
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&packet[8..16]);
        assert_eq!(f64::from_ne_bytes(raw), request.timestamp());
    }

    #[test]
    fn test_pinned_timestamp_survives_rebuild() {
        let mut request = built(3, 4);
        request.build(3, 5);
        assert_eq!(request.timestamp(), 1_700_000_000.25);
    }

    #[test]
    fn test_hex_rows() {
        assert_eq!(hex_rows(&[0x08, 0x00, 0xe5]), vec!["0000  08 00 e5"]);

        let rows = hex_rows(&[0xab; 17]);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("0000  ab ab"));
        assert_eq!(rows[1], "0010  ab");
        assert!(hex_rows(&[]).is_empty());
    }

    #[test]
    fn test_empty_target_defers_resolution() {
        let mut request = EchoRequest::new();
        request.set_target("   ").unwrap();
        assert_eq!(request.destination(), None);
        assert_eq!(request.target(), "   ");
    }

    #[test]
    fn test_literal_target_resolves() {
        let mut request = EchoRequest::new();
        request.set_target("192.0.2.7").unwrap();
        assert_eq!(request.destination(), Some(Ipv4Addr::new(192, 0, 2, 7)));
    }
}
