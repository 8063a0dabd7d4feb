//! Wire framing for the amplifier control protocol
//!
//! Outbound command frames: `0x2A "AV2" 0x20 <payload> 0xFF`.
//! Inbound response frames: `0x23 "AV2" 0x20 <payload>`, delimited on
//! the wire by `0xFF` (the reader strips the delimiter before handing
//! frames to [`decode`]).
//!
//! There is no checksum in this protocol; the only validation on the
//! inbound side is the 5-byte `#AV2 ` prefix.

use thiserror::Error;

/// Leading byte of every outbound command frame. Also doubles as the
/// wake/attention byte the transmitter sends ahead of each frame.
pub const COMMAND_HEADER: u8 = 0x2A;

/// Leading byte of every inbound response frame (`#`).
pub const RESPONSE_HEADER: u8 = 0x23;

/// Device address on the link. Exactly one device is addressed.
pub const DEVICE_ID: &[u8] = b"AV2";

/// Separator between the address and the payload.
pub const SEPARATOR: u8 = 0x20;

/// Frame delimiter in both directions.
pub const EOL: u8 = 0xFF;

/// `#AV2 ` - the required prefix of every inbound frame.
const RESPONSE_PREFIX: [u8; 5] = [RESPONSE_HEADER, b'A', b'V', b'2', SEPARATOR];

/// Framing errors on the inbound path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid frame header: {0:02X?}")]
    InvalidHeader(Vec<u8>),
}

/// Build a complete command frame around `payload`.
///
/// No payload validation happens here - each command knows its own
/// parameter layout.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 6);
    buf.push(COMMAND_HEADER);
    buf.extend_from_slice(DEVICE_ID);
    buf.push(SEPARATOR);
    buf.extend_from_slice(payload);
    buf.push(EOL);
    buf
}

/// Extract the payload from an inbound frame.
///
/// Fails with [`FrameError::InvalidHeader`] unless the frame starts with
/// `#AV2 `. On success the 5-byte prefix, any trailing whitespace and a
/// leftover delimiter are stripped. Only whitespace is stripped, not
/// arbitrary control bytes - payload tails carry raw binary values
/// (version numbers, level bytes) that must survive.
pub fn decode(raw: &[u8]) -> Result<&[u8], FrameError> {
    if raw.len() < RESPONSE_PREFIX.len() || raw[..RESPONSE_PREFIX.len()] != RESPONSE_PREFIX {
        let head = raw.iter().copied().take(8).collect();
        return Err(FrameError::InvalidHeader(head));
    }
    let mut payload = &raw[RESPONSE_PREFIX.len()..];
    while let Some((&last, rest)) = payload.split_last() {
        if last == EOL || last.is_ascii_whitespace() {
            payload = rest;
        } else {
            break;
        }
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        // A response frame is a command frame with the inbound header;
        // decode recovers the payload exactly.
        let payload = [0x69u8, 0x81, 0xE7, 0x85, 0x00, 0x02];
        let mut framed = encode(&payload);
        framed[0] = RESPONSE_HEADER;
        assert_eq!(decode(&framed).unwrap(), &payload);
    }

    #[test]
    fn encode_layout() {
        let framed = encode(&[0x50]);
        assert_eq!(framed, [0x2A, b'A', b'V', b'2', 0x20, 0x50, 0xFF]);
    }

    #[test]
    fn rejects_bad_header() {
        assert!(matches!(
            decode(b"!AV2 i"),
            Err(FrameError::InvalidHeader(_))
        ));
        assert!(matches!(
            decode(b"#AV3 i"),
            Err(FrameError::InvalidHeader(_))
        ));
        assert!(matches!(decode(b"#AV"), Err(FrameError::InvalidHeader(_))));
    }

    #[test]
    fn strips_trailing_whitespace() {
        assert_eq!(decode(b"#AV2 s\x02\x07 \r\n").unwrap(), &[b's', 0x02, 0x07]);
    }

    #[test]
    fn empty_payload_is_ok() {
        assert_eq!(decode(b"#AV2 ").unwrap(), b"");
    }
}
