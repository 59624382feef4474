//! Source text decoding with a fallback encoding.
//!
//! Files are decoded as UTF-8 first; on failure the next encoding in the
//! list is tried. Windows-1252 leaves five byte values undefined, so it
//! can fail too.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Windows1252,
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => f.write_str("utf-8"),
            TextEncoding::Windows1252 => f.write_str("cp1252"),
        }
    }
}

impl TextEncoding {
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                std::str::from_utf8(bytes).ok().map(str::to_owned)
            }
            TextEncoding::Windows1252 => bytes.iter().map(|&b| cp1252_char(b)).collect(),
        }
    }
}

/// Decode with each encoding in turn, returning the text and the encoding
/// that worked.
pub fn decode_with_fallback(
    bytes: &[u8],
    encodings: &[TextEncoding],
) -> Option<(String, TextEncoding)> {
    encodings
        .iter()
        .find_map(|enc| enc.decode(bytes).map(|text| (text, *enc)))
}

/// 0x80..=0x9F; `None` marks the undefined slots.
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

fn cp1252_char(b: u8) -> Option<char> {
    match b {
        0x80..=0x9F => CP1252_HIGH[(b - 0x80) as usize],
        _ => Some(char::from(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOTH: &[TextEncoding] = &[TextEncoding::Utf8, TextEncoding::Windows1252];

    #[test]
    fn test_utf8_first() {
        let (text, enc) = decode_with_fallback("Café,1\n".as_bytes(), BOTH).unwrap();
        assert_eq!(text, "Café,1\n");
        assert_eq!(enc, TextEncoding::Utf8);
    }

    #[test]
    fn test_bom_is_stripped() {
        let (text, _) = decode_with_fallback(b"\xEF\xBB\xBFa,b\n", BOTH).unwrap();
        assert_eq!(text, "a,b\n");
    }

    #[test]
    fn test_falls_back_to_cp1252() {
        // 0xE9 = é, 0x80 = €, invalid as UTF-8
        let (text, enc) = decode_with_fallback(b"Caf\xE9 \x80", BOTH).unwrap();
        assert_eq!(text, "Café €");
        assert_eq!(enc, TextEncoding::Windows1252);
    }

    #[test]
    fn test_both_fail_on_undefined_byte() {
        assert!(decode_with_fallback(b"bad \x81 byte \xFF\xFE", BOTH).is_none());
    }

    #[test]
    fn test_single_encoding_does_not_fall_back() {
        assert!(decode_with_fallback(b"Caf\xE9", &[TextEncoding::Utf8]).is_none());
    }
}
