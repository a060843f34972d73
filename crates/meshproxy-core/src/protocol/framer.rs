//! Incremental framer for the gateway's serial byte stream.
//!
//! The firmware prints free-text diagnostics onto the same USB-CDC channel as
//! the binary protocol, so the inbound stream is a mix of well-formed
//! `[tag][len][payload]` frames and arbitrary ASCII.  [`FrameCodec`] buffers
//! whatever arrives, emits every complete frame it can find, and when the
//! bytes at the head of the buffer cannot be a frame it *resynchronizes*:
//! it skips forward to the next position that looks like a frame start.
//!
//! # How resync works (for beginners)
//!
//! A position is a plausible frame start when its byte is one of the five
//! response tags (`0x81`–`0x85`) **and** the byte after it is a legal length
//! (≤ 64).  ASCII text never contains bytes ≥ `0x80`, so a log line like
//! `"RX: MeshCore 12\n"` is skipped in a single scan.
//!
//! The scan is bounded to [`RESYNC_WINDOW`] bytes.  If nothing plausible turns
//! up, the whole buffer is dropped.  That loses data, but guarantees every
//! call makes progress and the buffer never grows without limit.
//!
//! A tag sitting at the very end of the buffer also counts as plausible: its
//! length byte simply has not arrived yet, and discarding it would break a
//! frame that happens to be split across two reads.

use tracing::{debug, trace};

use crate::protocol::codec::ProtocolError;
use crate::protocol::messages::{Frame, ResponseTag, HEADER_SIZE, MAX_PAYLOAD_LEN, RESYNC_WINDOW};

/// Builds the wire bytes for one frame: `[tag, len, payload...]`.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLong`] when `payload` is longer than
/// [`MAX_PAYLOAD_LEN`]; such a frame would be rejected as desynchronized by
/// the receiving side.
pub fn encode_frame(tag: u8, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLong {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.push(tag);
    buf.push(payload.len() as u8);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Result of one [`FrameCodec::feed`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeedOutput {
    /// Complete frames, in stream order.
    pub frames: Vec<Frame>,
    /// Bytes dropped by resync during this call.
    pub discarded: usize,
}

/// Stateful stream framer.  Owns the inbound accumulation buffer.
#[derive(Debug, Default)]
pub struct FrameCodec {
    buffer: Vec<u8>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associated form of [`encode_frame`].
    pub fn encode(tag: u8, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        encode_frame(tag, payload)
    }

    /// Appends `chunk` to the buffer and extracts every complete frame.
    ///
    /// Partial frames stay buffered verbatim, so feeding a stream in any
    /// number of pieces yields the same frames as feeding it in one go.
    pub fn feed(&mut self, chunk: &[u8]) -> FeedOutput {
        self.buffer.extend_from_slice(chunk);

        let mut out = FeedOutput::default();
        let mut cursor = 0usize;

        loop {
            let rest = &self.buffer[cursor..];
            if rest.len() < HEADER_SIZE {
                break;
            }

            let tag = rest[0];
            let len = rest[1] as usize;

            if !ResponseTag::is_recognized(tag) || len > MAX_PAYLOAD_LEN {
                match find_resync_point(rest) {
                    Some(skip) => {
                        trace!(skip, "framer desync, skipping to next candidate");
                        cursor += skip;
                        out.discarded += skip;
                        continue;
                    }
                    None => {
                        debug!(dropped = rest.len(), "framer desync with no candidate, dropping buffer");
                        out.discarded += rest.len();
                        cursor = self.buffer.len();
                        break;
                    }
                }
            }

            let total = HEADER_SIZE + len;
            if rest.len() < total {
                break;
            }

            out.frames.push(Frame {
                tag,
                payload: rest[HEADER_SIZE..total].to_vec(),
            });
            cursor += total;
        }

        self.buffer.drain(..cursor);
        out
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Drops all buffered bytes.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Finds the first plausible frame start after position 0, within the window.
fn find_resync_point(buf: &[u8]) -> Option<usize> {
    let limit = buf.len().min(RESYNC_WINDOW);
    (1..limit).find(|&i| {
        ResponseTag::is_recognized(buf[i])
            && buf
                .get(i + 1)
                .map_or(true, |&len| len as usize <= MAX_PAYLOAD_LEN)
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(tag: u8, payload: &[u8]) -> Vec<u8> {
        encode_frame(tag, payload).expect("encode failed")
    }

    #[test]
    fn test_encode_frame_layout() {
        assert_eq!(frame_bytes(0x02, &[]), vec![0x02, 0x00]);
        assert_eq!(frame_bytes(0x09, &[1]), vec![0x09, 0x01, 0x01]);
    }

    #[test]
    fn test_encode_frame_accepts_max_payload() {
        let bytes = frame_bytes(0x85, &[b'x'; MAX_PAYLOAD_LEN]);
        assert_eq!(bytes.len(), HEADER_SIZE + MAX_PAYLOAD_LEN);
        assert_eq!(bytes[1], 64);
    }

    #[test]
    fn test_encode_frame_rejects_oversized_payload() {
        assert_eq!(
            encode_frame(0x85, &[0u8; 65]),
            Err(ProtocolError::PayloadTooLong { len: 65, max: 64 })
        );
    }

    #[test]
    fn test_feed_single_frame() {
        // Arrange
        let mut codec = FrameCodec::new();

        // Act
        let out = codec.feed(&frame_bytes(0x84, b"oops"));

        // Assert
        assert_eq!(
            out.frames,
            vec![Frame {
                tag: 0x84,
                payload: b"oops".to_vec()
            }]
        );
        assert_eq!(out.discarded, 0);
        assert!(codec.pending().is_empty());
    }

    #[test]
    fn test_feed_empty_payload_frame() {
        let mut codec = FrameCodec::new();
        let out = codec.feed(&[0x85, 0x00]);
        assert_eq!(out.frames.len(), 1);
        assert!(out.frames[0].payload.is_empty());
    }

    #[test]
    fn test_feed_back_to_back_frames_in_order() {
        let mut codec = FrameCodec::new();
        let mut bytes = frame_bytes(0x82, &[0u8; 20]);
        bytes.extend(frame_bytes(0x85, b"hi"));
        bytes.extend(frame_bytes(0x83, &[0, 0, 0, 0, 0]));

        let out = codec.feed(&bytes);

        let tags: Vec<u8> = out.frames.iter().map(|f| f.tag).collect();
        assert_eq!(tags, vec![0x82, 0x85, 0x83]);
    }

    #[test]
    fn test_feed_single_byte_waits() {
        let mut codec = FrameCodec::new();
        let out = codec.feed(&[0x81]);
        assert!(out.frames.is_empty());
        assert_eq!(codec.pending(), &[0x81]);
    }

    #[test]
    fn test_feed_partial_frame_is_kept_verbatim() {
        let mut codec = FrameCodec::new();
        let out = codec.feed(&[0x84, 0x03, b'a']);
        assert!(out.frames.is_empty());
        assert_eq!(codec.pending(), &[0x84, 0x03, b'a']);

        let out = codec.feed(&[b'b', b'c']);
        assert_eq!(out.frames[0].payload, b"abc".to_vec());
        assert!(codec.pending().is_empty());
    }

    #[test]
    fn test_feed_skips_ascii_log_line() {
        // Arrange
        let mut codec = FrameCodec::new();
        let mut bytes = b"RX: MeshCore 12 TX: 3\r\n".to_vec();
        let garbage_len = bytes.len();
        bytes.extend(frame_bytes(0x85, b"ok"));

        // Act
        let out = codec.feed(&bytes);

        // Assert
        assert_eq!(out.discarded, garbage_len);
        assert_eq!(out.frames.len(), 1);
        assert_eq!(out.frames[0].payload, b"ok".to_vec());
    }

    #[test]
    fn test_feed_oversized_length_triggers_resync() {
        // 0x81 followed by 200 is not a frame; the next 0x82 with a sane length is.
        let mut codec = FrameCodec::new();
        let mut bytes = vec![0x81, 200, 0x00];
        bytes.extend(frame_bytes(0x82, &[0u8; 20]));

        let out = codec.feed(&bytes);

        assert_eq!(out.discarded, 3);
        assert_eq!(out.frames.len(), 1);
        assert_eq!(out.frames[0].tag, 0x82);
    }

    #[test]
    fn test_feed_drops_buffer_when_window_has_no_candidate() {
        let mut codec = FrameCodec::new();
        let garbage = vec![b'.'; RESYNC_WINDOW + 20];

        let out = codec.feed(&garbage);

        assert!(out.frames.is_empty());
        assert_eq!(out.discarded, garbage.len());
        assert!(codec.pending().is_empty());
    }

    #[test]
    fn test_feed_candidate_beyond_window_is_lost() {
        let mut codec = FrameCodec::new();
        let mut bytes = vec![b'.'; RESYNC_WINDOW + 5];
        bytes.extend(frame_bytes(0x85, b"late"));

        let out = codec.feed(&bytes);

        // Whole buffer dropped in one cycle, including the frame beyond the window.
        assert!(out.frames.is_empty());
        assert!(codec.pending().is_empty());
    }

    #[test]
    fn test_feed_trailing_tag_is_kept_for_next_chunk() {
        let mut codec = FrameCodec::new();

        let out = codec.feed(b"boot\x85");
        assert!(out.frames.is_empty());
        assert_eq!(codec.pending(), &[0x85]);

        let out = codec.feed(&[0x02, b'o', b'k']);
        assert_eq!(out.frames.len(), 1);
        assert_eq!(out.frames[0].payload, b"ok".to_vec());
    }

    #[test]
    fn test_reset_clears_pending_bytes() {
        let mut codec = FrameCodec::new();
        codec.feed(&[0x81, 0x0C, 1, 2]);
        codec.reset();
        assert!(codec.pending().is_empty());
    }
}
