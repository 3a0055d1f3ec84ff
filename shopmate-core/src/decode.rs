//! Incremental UTF-8 decoding for a chunked byte stream
//!
//! Transport chunks split on arbitrary byte boundaries, so a multi-byte
//! character can arrive half in one chunk and half in the next. One decoder
//! instance is fed every chunk of a session in order and carries the
//! incomplete tail bytes across calls; decoding a chunk in isolation would
//! corrupt those characters.

#[derive(Debug, Default)]
pub struct StreamDecoder {
    partial: Vec<u8>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning all text that is complete so far.
    ///
    /// An incomplete trailing sequence is held back until the following
    /// chunk. Invalid bytes decode to U+FFFD and decoding continues.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.partial);
        buf.extend_from_slice(chunk);

        let mut out = String::new();
        let mut input = buf.as_slice();

        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    return out;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    if let Ok(s) = std::str::from_utf8(valid) {
                        out.push_str(s);
                    }
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.partial = rest.to_vec();
                            return out;
                        }
                        // Genuinely invalid bytes: substitute and move on.
                        Some(len) => {
                            out.push('\u{FFFD}');
                            input = &rest[len..];
                        }
                    }
                }
            }
        }
    }

    /// End of stream: flush any dangling partial sequence as U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.partial.is_empty() {
            String::new()
        } else {
            self.partial.clear();
            "\u{FFFD}".to_string()
        }
    }

    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.decode(b"Hello, world!"), "Hello, world!");
        assert!(!decoder.has_partial());
    }

    #[test]
    fn multibyte_split_across_two_chunks() {
        // "世" is E4 B8 96
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.decode(&[0xE4, 0xB8]), "");
        assert!(decoder.has_partial());
        assert_eq!(decoder.decode(&[0x96]), "世");
        assert!(!decoder.has_partial());
    }

    #[test]
    fn four_byte_emoji_split_three_ways() {
        // "🤖" is F0 9F A4 96
        let bytes = "🤖".as_bytes();
        let mut decoder = StreamDecoder::new();
        let mut out = String::new();
        out.push_str(&decoder.decode(&bytes[..1]));
        out.push_str(&decoder.decode(&bytes[1..3]));
        out.push_str(&decoder.decode(&bytes[3..]));
        assert_eq!(out, "🤖");
    }

    #[test]
    fn split_point_inside_mixed_text() {
        let text = "价格：¥99";
        let bytes = text.as_bytes();
        // Split at every position and reassemble; the result never changes.
        for split in 1..bytes.len() {
            let mut decoder = StreamDecoder::new();
            let mut out = String::new();
            out.push_str(&decoder.decode(&bytes[..split]));
            out.push_str(&decoder.decode(&bytes[split..]));
            out.push_str(&decoder.finish());
            assert_eq!(out, text, "split at byte {}", split);
        }
    }

    #[test]
    fn invalid_byte_becomes_replacement_char() {
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.decode(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
    }

    #[test]
    fn truncated_stream_flushes_replacement() {
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.decode(&[0xE4, 0xB8]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert!(!decoder.has_partial());
    }

    #[test]
    fn finish_is_empty_after_clean_decode() {
        let mut decoder = StreamDecoder::new();
        decoder.decode("こんにちは".as_bytes());
        assert_eq!(decoder.finish(), "");
    }
}
