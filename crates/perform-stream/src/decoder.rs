use tracing::debug;

/// Incremental UTF-8 decoder for a chunked byte stream.
///
/// Chunks may end anywhere, including inside a multi-byte code point. The
/// incomplete tail is held back until the next chunk completes it. Invalid
/// sequences elsewhere decode to U+FFFD; decoding never fails.
///
/// One decoder belongs to exactly one stream session.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    pending: Vec<u8>,
}

impl ChunkDecoder {
    /// Decodes as much of `chunk` (plus any held-back bytes) as is complete.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let keep = incomplete_tail_len(&self.pending);
        let split = self.pending.len() - keep;
        let text = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        self.pending.drain(..split);
        text
    }

    /// Ends the input and returns how many held-back bytes were discarded.
    ///
    /// Only an incomplete trailing sequence is ever held back, so nothing
    /// decodable remains at this point.
    pub fn finish(&mut self) -> usize {
        let discarded = self.pending.len();
        if discarded > 0 {
            debug!(
                bytes = discarded,
                "discarding incomplete UTF-8 sequence at end of stream"
            );
            self.pending.clear();
        }
        discarded
    }

    /// Number of bytes currently held back.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Length of a trailing, not yet complete UTF-8 sequence (0..=3).
fn incomplete_tail_len(buf: &[u8]) -> usize {
    let start = buf.len().saturating_sub(3);
    for i in (start..buf.len()).rev() {
        let byte = buf[i];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let width = match byte {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return 0,
        };
        let have = buf.len() - i;
        return if have < width { have } else { 0 };
    }
    0
}
