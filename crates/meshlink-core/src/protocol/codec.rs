//! Stream framing for serial and TCP links
//!
//! Each frame is `0x94 0xC3 <len_hi> <len_lo> <body>`. Anything between
//! frames is the device's debug console output and is surfaced as text lines.

use crate::errors::{MeshError, MeshResult};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

const START1: u8 = 0x94;
const START2: u8 = 0xC3;
const HEADER_LEN: usize = 4;

/// Largest body a frame may carry
pub const MAX_FRAME_SIZE: usize = 512;

/// Written once before the first frame so the device's parser resynchronises
pub const WAKE_SEQUENCE: [u8; 32] = [START2; 32];

/// Cap on buffered console text without a newline
const MAX_TEXT_LINE: usize = 1024;

// ----------------------------------------------------------------------------
// Encoding
// ----------------------------------------------------------------------------

/// Wrap an encoded body in the stream header
pub fn encode_stream_frame(body: &[u8]) -> MeshResult<Vec<u8>> {
    if body.len() > MAX_FRAME_SIZE {
        return Err(MeshError::app_error(format!(
            "frame too large: {} bytes (max: {})",
            body.len(),
            MAX_FRAME_SIZE
        )));
    }
    let len = body.len() as u16;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.push(START1);
    out.push(START2);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

// ----------------------------------------------------------------------------
// Decoding
// ----------------------------------------------------------------------------

/// Output of [`StreamDecoder::push`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedItem {
    /// A complete frame body
    Frame(Vec<u8>),
    /// One line of console text found between frames
    Text(String),
}

/// Incremental decoder that tolerates garbage and split reads
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: Vec<u8>,
    text: Vec<u8>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and collect everything that became complete
    pub fn push(&mut self, bytes: &[u8]) -> Vec<DecodedItem> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();

        loop {
            match self.buf.iter().position(|&b| b == START1) {
                None => {
                    let drained: Vec<u8> = self.buf.drain(..).collect();
                    self.push_text(&drained, &mut out);
                    break;
                }
                Some(pos) if pos > 0 => {
                    let drained: Vec<u8> = self.buf.drain(..pos).collect();
                    self.push_text(&drained, &mut out);
                    continue;
                }
                Some(_) => {}
            }

            // buf[0] == START1
            if ends_mid_character(strip_wake_run(&self.text)) {
                let drained: Vec<u8> = self.buf.drain(..1).collect();
                self.push_text(&drained, &mut out);
                continue;
            }
            if self.buf.len() < 2 {
                break;
            }
            if self.buf[1] != START2 {
                let drained: Vec<u8> = self.buf.drain(..1).collect();
                self.push_text(&drained, &mut out);
                continue;
            }
            if self.buf.len() < HEADER_LEN {
                break;
            }

            let declared = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
            if declared > MAX_FRAME_SIZE {
                tracing::debug!("Ignoring frame header with oversized length {}", declared);
                let drained: Vec<u8> = self.buf.drain(..1).collect();
                self.push_text(&drained, &mut out);
                continue;
            }
            if self.buf.len() < HEADER_LEN + declared {
                break;
            }

            self.flush_text(&mut out);
            let frame: Vec<u8> = self.buf[HEADER_LEN..HEADER_LEN + declared].to_vec();
            self.buf.drain(..HEADER_LEN + declared);
            out.push(DecodedItem::Frame(frame));
        }

        out
    }

    fn push_text(&mut self, bytes: &[u8], out: &mut Vec<DecodedItem>) {
        for &b in bytes {
            if b == b'\n' {
                self.flush_text(out);
            } else {
                self.text.push(b);
                if self.text.len() >= MAX_TEXT_LINE {
                    self.flush_text(out);
                }
            }
        }
    }

    fn flush_text(&mut self, out: &mut Vec<DecodedItem>) {
        if self.text.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(strip_wake_run(&self.text))
            .trim()
            .to_string();
        self.text.clear();
        if !line.is_empty() {
            out.push(DecodedItem::Text(line));
        }
    }
}

fn is_continuation(b: u8) -> bool {
    (0x80..=0xBF).contains(&b)
}

/// Drop a leading run of wake bytes; the last one stays when it leads a
/// multi-byte character
fn strip_wake_run(bytes: &[u8]) -> &[u8] {
    let run = bytes.iter().take_while(|&&b| b == START2).count();
    match bytes.get(run) {
        Some(&next) if run > 0 && is_continuation(next) => &bytes[run - 1..],
        _ => &bytes[run..],
    }
}

/// Whether `text` stops inside a UTF-8 sequence, making the next byte a
/// continuation rather than a frame start
fn ends_mid_character(text: &[u8]) -> bool {
    let tail = &text[text.len().saturating_sub(3)..];
    let Some(lead) = tail.iter().rposition(|&b| !is_continuation(b)) else {
        return false;
    };
    let needed = match tail[lead] {
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 1,
    };
    tail.len() - lead < needed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_split_across_reads() {
        let encoded = encode_stream_frame(b"hello").unwrap();
        let mut decoder = StreamDecoder::new();

        assert!(decoder.push(&encoded[..3]).is_empty());
        let items = decoder.push(&encoded[3..]);
        assert_eq!(items, vec![DecodedItem::Frame(b"hello".to_vec())]);
    }

    #[test]
    fn test_console_text_between_frames() {
        let mut bytes = b"INFO | booting\r\n".to_vec();
        bytes.extend(encode_stream_frame(&[1, 2, 3]).unwrap());
        bytes.extend_from_slice(b"DEBUG | radio up\n");

        let items = StreamDecoder::new().push(&bytes);
        assert_eq!(
            items,
            vec![
                DecodedItem::Text("INFO | booting".into()),
                DecodedItem::Frame(vec![1, 2, 3]),
                DecodedItem::Text("DEBUG | radio up".into()),
            ]
        );
    }

    #[test]
    fn test_resync_after_oversized_header() {
        let mut bytes = vec![START1, START2, 0xff, 0xff];
        bytes.extend(encode_stream_frame(&[9]).unwrap());

        let items = StreamDecoder::new().push(&bytes);
        assert_eq!(items.last(), Some(&DecodedItem::Frame(vec![9])));
    }

    #[test]
    fn test_wake_sequence_is_not_text() {
        let items = StreamDecoder::new().push(&WAKE_SEQUENCE);
        assert!(items.is_empty());
    }

    #[test]
    fn test_wake_run_before_frame_is_dropped() {
        let mut bytes = WAKE_SEQUENCE.to_vec();
        bytes.extend(encode_stream_frame(&[7]).unwrap());

        let items = StreamDecoder::new().push(&bytes);
        assert_eq!(items, vec![DecodedItem::Frame(vec![7])]);
    }

    #[test]
    fn test_console_text_keeps_multibyte_characters() {
        let mut decoder = StreamDecoder::new();
        let mut items = decoder.push("INFO | caf\u{e9} \u{2014}\u{e9}t\u{e9}\n".as_bytes());
        // split inside the em dash, whose last byte is 0x94
        let line = "WARN | a\u{2014}\u{c9}b\n".as_bytes();
        items.extend(decoder.push(&line[..10]));
        items.extend(decoder.push(&line[10..]));
        items.extend(decoder.push("\u{e9}cole\n".as_bytes()));

        assert_eq!(
            items,
            vec![
                DecodedItem::Text("INFO | caf\u{e9} \u{2014}\u{e9}t\u{e9}".into()),
                DecodedItem::Text("WARN | a\u{2014}\u{c9}b".into()),
                DecodedItem::Text("\u{e9}cole".into()),
            ]
        );
    }

    #[test]
    fn test_rejects_oversized_body() {
        assert!(encode_stream_frame(&[0u8; MAX_FRAME_SIZE + 1]).is_err());
    }
}
