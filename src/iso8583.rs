//! ISO-8583 frame recognition.
//!
//! On the wire each message is one frame: 4 ASCII decimal digits declaring
//! the payload length, followed by that many payload bytes. Payloads are
//! screened by MTI before anything downstream sees them, and correlation
//! keys are cut from fixed byte positions of the ASCII encoding.

use std::fmt;

/// MTIs the extractor emits. Everything else is consumed and discarded.
const LIKELY_MTIS: [&[u8; 4]; 17] = [
    b"0200", b"0210", b"0220", b"0230", b"0800", b"0810", b"0820", b"0830",
    b"0840", b"0100", b"0110", b"0120", b"0130", b"0400", b"0410", b"0420",
    b"0430",
];

/// Byte range of the PAN in a fixed-position ASCII payload.
const PAN_RANGE: std::ops::Range<usize> = 38..54;
/// Byte range of the processing code.
const PROC_RANGE: std::ops::Range<usize> = 54..60;
/// Minimum payload length that yields a complete key.
const MIN_KEY_LEN: usize = 64;

/// Key substituted when the payload is too short for extraction.
pub const KEY_ERROR_PLACEHOLDER: &str = "[key-error]";

/// Whether a payload plausibly is an ISO-8583 message, judged by its MTI
/// alone. No bitmap or field parsing.
pub fn is_likely_iso8583(payload: &[u8]) -> bool {
    if payload.len() < 4 {
        return false;
    }
    LIKELY_MTIS.iter().any(|mti| mti[..] == payload[..4])
}

#[derive(Debug, PartialEq, Eq)]
pub enum KeyError {
    /// Payload shorter than the fixed key window.
    TooShort { len: usize },
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::TooShort { len } => {
                write!(f, "payload too short for key: {} bytes", len)
            }
        }
    }
}

impl std::error::Error for KeyError {}

/// Build the correlation key `MTI_PAN_PROC` from fixed byte windows of the
/// payload. The windows are reproduced, never decoded; non-ASCII bytes pass
/// through lossily.
pub fn extract_key(payload: &[u8]) -> Result<String, KeyError> {
    if payload.len() < MIN_KEY_LEN {
        return Err(KeyError::TooShort { len: payload.len() });
    }
    let mti = String::from_utf8_lossy(&payload[0..4]);
    let pan = String::from_utf8_lossy(&payload[PAN_RANGE]);
    let proc = String::from_utf8_lossy(&payload[PROC_RANGE]);
    Ok(format!("{}_{}_{}", mti, pan, proc))
}

/// Parse a 4-byte ASCII decimal length prefix. `None` if any byte is not a
/// digit.
fn parse_length(prefix: &[u8]) -> Option<usize> {
    prefix.iter().try_fold(0usize, |acc, &b| {
        if b.is_ascii_digit() {
            Some(acc * 10 + (b - b'0') as usize)
        } else {
            None
        }
    })
}

/// Compact the scan buffer once this many consumed bytes accumulate at its
/// head.
const COMPACT_THRESHOLD: usize = 4096;

/// Incremental frame scanner over one flow's reassembled byte stream.
///
/// Bytes are appended at the tail as the flow delivers them; complete frames
/// are consumed from the head. A prefix that is not 4 ASCII digits, or that
/// declares a zero length, drops a single leading byte and rescans, so the
/// scanner always makes progress through corrupted data.
#[derive(Debug, Default)]
pub struct FrameScanner {
    buf: Vec<u8>,
    head: usize,
}

enum Step {
    /// Drop one leading byte and rescan.
    Resync,
    /// A complete, self-consistent frame of this payload length.
    Frame(usize),
}

impl FrameScanner {
    pub fn new() -> Self {
        FrameScanner::default()
    }

    /// Append reassembled bytes to the tail of the scan buffer.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Unconsumed bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.head
    }

    /// Next payload that passes the MTI screen, or `None` once the buffer
    /// holds no further complete frame. Well-framed payloads with an
    /// unrecognised MTI are consumed silently.
    pub fn next_message(&mut self) -> Option<Vec<u8>> {
        loop {
            let step = {
                let pending = &self.buf[self.head..];
                if pending.len() < 4 {
                    return None;
                }
                match parse_length(&pending[..4]) {
                    None | Some(0) => Step::Resync,
                    Some(len) => {
                        if pending.len() < 4 + len {
                            return None;
                        }
                        Step::Frame(len)
                    }
                }
            };

            match step {
                Step::Resync => self.advance(1),
                Step::Frame(len) => {
                    let start = self.head + 4;
                    let payload = self.buf[start..start + len].to_vec();
                    self.advance(4 + len);
                    if is_likely_iso8583(&payload) {
                        return Some(payload);
                    }
                }
            }
        }
    }

    fn advance(&mut self, n: usize) {
        self.head += n;
        if self.head == self.buf.len() || self.head >= COMPACT_THRESHOLD {
            self.buf.drain(..self.head);
            self.head = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A syntactically valid frame: length prefix plus a payload carrying
    /// the given MTI, PAN `1234567890123456` and processing code `004000`.
    fn frame(mti: &str, payload_len: usize) -> Vec<u8> {
        assert!(payload_len >= 60);
        let mut payload = Vec::with_capacity(payload_len);
        payload.extend_from_slice(mti.as_bytes());
        payload.resize(38, b'x');
        payload.extend_from_slice(b"1234567890123456");
        payload.extend_from_slice(b"004000");
        payload.resize(payload_len, b'y');

        let mut out = format!("{:04}", payload_len).into_bytes();
        out.extend_from_slice(&payload);
        out
    }

    #[test]
    fn mti_allowlist() {
        for mti in ["0100", "0200", "0420", "0800", "0840"] {
            let mut payload = mti.as_bytes().to_vec();
            payload.resize(20, 0);
            assert!(is_likely_iso8583(&payload), "{} should pass", mti);
        }
        for mti in ["9999", "0201", "0300", "abcd", "0000"] {
            let mut payload = mti.as_bytes().to_vec();
            payload.resize(20, 0);
            assert!(!is_likely_iso8583(&payload), "{} should fail", mti);
        }
    }

    #[test]
    fn short_payload_is_not_iso() {
        assert!(!is_likely_iso8583(b"020"));
        assert!(!is_likely_iso8583(b""));
    }

    #[test]
    fn key_from_64_byte_payload() {
        let data = frame("0200", 64);
        let key = extract_key(&data[4..]).unwrap();
        assert_eq!(key, "0200_1234567890123456_004000");
    }

    #[test]
    fn key_rejected_below_64_bytes() {
        let data = frame("0200", 63);
        assert_eq!(
            extract_key(&data[4..]),
            Err(KeyError::TooShort { len: 63 })
        );
    }

    #[test]
    fn single_frame_scanned() {
        let mut scanner = FrameScanner::new();
        scanner.extend(&frame("0200", 80));
        let msg = scanner.next_message().unwrap();
        assert_eq!(msg.len(), 80);
        assert_eq!(&msg[..4], b"0200");
        assert!(scanner.next_message().is_none());
        assert_eq!(scanner.buffered(), 0);
    }

    #[test]
    fn resync_over_garbage_prefix() {
        let mut scanner = FrameScanner::new();
        let mut data = b"XY".to_vec();
        data.extend_from_slice(&frame("0200", 80));
        scanner.extend(&data);
        let msg = scanner.next_message().unwrap();
        assert_eq!(&msg[..4], b"0200");
    }

    #[test]
    fn stray_numeric_frame_consumed_silently() {
        // "0020" + 20 junk bytes frames cleanly but fails the MTI screen;
        // the scanner must consume it and find the real frame after.
        let mut scanner = FrameScanner::new();
        let mut data = b"0020".to_vec();
        data.extend_from_slice(&[b'z'; 20]);
        data.extend_from_slice(&frame("0200", 80));
        scanner.extend(&data);
        let msg = scanner.next_message().unwrap();
        assert_eq!(&msg[..4], b"0200");
        assert!(scanner.next_message().is_none());
    }

    #[test]
    fn zero_length_prefix_resyncs() {
        let mut scanner = FrameScanner::new();
        let mut data = b"0000ZZ".to_vec();
        data.extend_from_slice(&frame("0210", 64));
        scanner.extend(&data);
        let msg = scanner.next_message().unwrap();
        assert_eq!(&msg[..4], b"0210");
    }

    #[test]
    fn incomplete_frame_waits_for_more_bytes() {
        let mut scanner = FrameScanner::new();
        let full = frame("0200", 80);
        scanner.extend(&full[..30]);
        assert!(scanner.next_message().is_none());
        // Nothing consumed while waiting.
        assert_eq!(scanner.buffered(), 30);
        scanner.extend(&full[30..]);
        assert!(scanner.next_message().is_some());
    }

    #[test]
    fn unknown_mti_fully_consumed() {
        let mut scanner = FrameScanner::new();
        scanner.extend(&frame("9999", 80));
        assert!(scanner.next_message().is_none());
        assert_eq!(scanner.buffered(), 0);
    }

    #[test]
    fn back_to_back_frames() {
        let mut scanner = FrameScanner::new();
        let mut data = frame("0200", 64);
        data.extend_from_slice(&frame("0210", 64));
        scanner.extend(&data);
        assert_eq!(&scanner.next_message().unwrap()[..4], b"0200");
        assert_eq!(&scanner.next_message().unwrap()[..4], b"0210");
        assert!(scanner.next_message().is_none());
    }

    #[test]
    fn all_garbage_makes_progress() {
        let mut scanner = FrameScanner::new();
        scanner.extend(&[0xFFu8; 10_000]);
        assert!(scanner.next_message().is_none());
        // Everything but the last 3 bytes is droppable garbage.
        assert!(scanner.buffered() <= 4);
    }
}
