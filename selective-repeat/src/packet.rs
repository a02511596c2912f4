//! Packet codec: framing, checksums, and the binary wire image.
//!
//! Every unit exchanged between the sender (A) and the receiver (B) is a
//! [`Packet`].  This module is responsible for:
//! - Building data and acknowledgment packets with a correct checksum.
//! - Verifying that a packet's carried checksum still matches its contents.
//! - Serialising a [`Packet`] into its fixed 32-byte wire image and back.
//!
//! No I/O happens here.  Whether a corrupt packet is dropped or trusted is a
//! policy decision made by the entities (see [`crate::config::IntegrityPolicy`]);
//! [`Packet::decode`] only checks the length.
//!
//! # Wire format
//!
//! All integers are **big-endian** two's-complement `i32`.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |               Acknowledgment Number (-1 = none)               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Checksum                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Payload (20 bytes) ...                    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total size: [`WIRE_LEN`] = 32 bytes.

use thiserror::Error;

/// Fixed payload length of every message and packet.
pub const PAYLOAD_LEN: usize = 20;

/// Byte length of an encoded packet.
pub const WIRE_LEN: usize = 12 + PAYLOAD_LEN;

/// Acknowledgment number carried by data packets ("no ack").
pub const NO_ACK: i32 = -1;

// Byte offsets of each field within the wire image.
const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_CHECKSUM: usize = 8;
const OFF_PAYLOAD: usize = 12;

/// Fixed-size payload buffer.
pub type Payload = [u8; PAYLOAD_LEN];

/// An application message awaiting transmission.
///
/// Has no sequence identity until the sender frames it into a [`Packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub data: Payload,
}

impl Message {
    /// Build a message from arbitrary bytes: zero-padded when shorter than
    /// [`PAYLOAD_LEN`], truncated when longer.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = [0u8; PAYLOAD_LEN];
        let n = bytes.len().min(PAYLOAD_LEN);
        data[..n].copy_from_slice(&bytes[..n]);
        Self { data }
    }
}

impl From<Payload> for Message {
    fn from(data: Payload) -> Self {
        Self { data }
    }
}

/// A protocol packet: data (carrying a payload) or a pure acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub seqnum: i32,
    pub acknum: i32,
    pub checksum: i32,
    pub payload: Payload,
}

impl Packet {
    /// Build a packet with a freshly computed checksum.
    ///
    /// A missing payload is zero-filled, which is what pure acknowledgments
    /// carry.
    pub fn build(seqnum: i32, acknum: i32, payload: Option<&Payload>) -> Self {
        let payload = payload.copied().unwrap_or([0u8; PAYLOAD_LEN]);
        Self {
            seqnum,
            acknum,
            checksum: checksum(seqnum, acknum, &payload),
            payload,
        }
    }

    /// Data packet for `seqnum` (acknowledgment field unused).
    pub fn data(seqnum: i32, payload: &Payload) -> Self {
        Self::build(seqnum, NO_ACK, Some(payload))
    }

    /// Pure acknowledgment for `acknum`.
    pub fn ack(acknum: i32) -> Self {
        Self::build(0, acknum, None)
    }

    /// `true` when the carried checksum matches the packet's contents.
    pub fn verify(&self) -> bool {
        checksum(self.seqnum, self.acknum, &self.payload) == self.checksum
    }

    /// Serialise into the fixed 32-byte wire image.
    ///
    /// The checksum is written as carried, so a corrupt packet stays corrupt
    /// on the wire.
    pub fn encode(&self) -> [u8; WIRE_LEN] {
        let mut buf = [0u8; WIRE_LEN];
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seqnum.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.acknum.to_be_bytes());
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 4].copy_from_slice(&self.checksum.to_be_bytes());
        buf[OFF_PAYLOAD..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// Returns [`PacketError::Length`] unless `buf` is exactly [`WIRE_LEN`]
    /// bytes.  The checksum is *not* verified here.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() != WIRE_LEN {
            return Err(PacketError::Length {
                expected: WIRE_LEN,
                actual: buf.len(),
            });
        }

        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&buf[OFF_PAYLOAD..]);

        Ok(Self {
            seqnum: read_i32(buf, OFF_SEQ),
            acknum: read_i32(buf, OFF_ACK),
            checksum: read_i32(buf, OFF_CHECKSUM),
            payload,
        })
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram is {actual} bytes, expected {expected}")]
    Length { expected: usize, actual: usize },
}

/// Additive checksum over seqnum, acknum, and every payload byte.
///
/// Wrapping arithmetic, so garbage header values cannot overflow.
pub fn checksum(seqnum: i32, acknum: i32, payload: &Payload) -> i32 {
    payload
        .iter()
        .fold(seqnum.wrapping_add(acknum), |sum, &b| sum.wrapping_add(i32::from(b)))
}

fn read_i32(buf: &[u8], off: usize) -> i32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[off..off + 4]);
    i32::from_be_bytes(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(text: &[u8]) -> Payload {
        Message::from_bytes(text).data
    }

    #[test]
    fn build_computes_additive_checksum() {
        let p = Packet::build(3, 7, Some(&payload(b"\x01\x02\x03")));
        assert_eq!(p.checksum, 3 + 7 + 1 + 2 + 3);
    }

    #[test]
    fn ack_has_zero_payload_and_seq() {
        let a = Packet::ack(5);
        assert_eq!(a.seqnum, 0);
        assert_eq!(a.acknum, 5);
        assert_eq!(a.payload, [0u8; PAYLOAD_LEN]);
        assert_eq!(a.checksum, 5);
    }

    #[test]
    fn data_packet_carries_no_ack_sentinel() {
        let p = Packet::data(2, &payload(b"hi"));
        assert_eq!(p.acknum, NO_ACK);
        assert!(p.verify());
    }

    #[test]
    fn verify_detects_every_flipped_payload_byte() {
        let p = Packet::data(4, &payload(b"aaaaaaaaaaaaaaaaaaaa"));
        assert!(p.verify());
        for i in 0..PAYLOAD_LEN {
            let mut bad = p;
            bad.payload[i] ^= 0x01;
            assert!(!bad.verify(), "flip at byte {i} went unnoticed");
        }
    }

    #[test]
    fn verify_detects_garbage_header() {
        let mut p = Packet::ack(3);
        p.acknum = 999_999;
        assert!(!p.verify());
    }

    #[test]
    fn checksum_wraps_instead_of_overflowing() {
        let p = Packet::build(i32::MAX, i32::MAX, Some(&[0xff; PAYLOAD_LEN]));
        assert!(p.verify());
    }

    #[test]
    fn message_is_padded_and_truncated() {
        assert_eq!(&Message::from_bytes(b"ab").data[..3], b"ab\0");
        let long = Message::from_bytes(b"0123456789abcdefghijKLMN");
        assert_eq!(&long.data, b"0123456789abcdefghij");
    }

    #[test]
    fn wire_image_layout_is_big_endian() {
        let bytes = Packet::build(0x0102_0304, -1, None).encode();
        assert_eq!(bytes.len(), WIRE_LEN);
        assert_eq!(&bytes[OFF_SEQ..OFF_SEQ + 4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[OFF_ACK..OFF_ACK + 4], &[0xff; 4]);
    }

    #[test]
    fn decode_preserves_a_corrupt_checksum() {
        let mut p = Packet::data(1, &payload(b"data"));
        p.checksum += 1;
        let decoded = Packet::decode(&p.encode()).unwrap();
        assert_eq!(decoded, p);
        assert!(!decoded.verify());
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert_eq!(
            Packet::decode(&[0u8; WIRE_LEN - 1]),
            Err(PacketError::Length {
                expected: WIRE_LEN,
                actual: WIRE_LEN - 1
            })
        );
        assert!(Packet::decode(&[]).is_err());
    }
}
