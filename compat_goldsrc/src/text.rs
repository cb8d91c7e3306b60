//! Windows-1252 text helpers. Every string stored in the formats of this
//! crate (entity blocks, texture and archive entry names) uses the legacy
//! single-byte codepage, never UTF-8.

use encoding_rs::WINDOWS_1252;

pub fn decode_cp1252(bytes: &[u8]) -> String {
    let (text, _had_errors) = WINDOWS_1252.decode_without_bom_handling(bytes);
    text.into_owned()
}

pub fn encode_cp1252(text: &str) -> Vec<u8> {
    let (bytes, _encoding, had_errors) = WINDOWS_1252.encode(text);
    if had_errors {
        log::warn!("text is not representable in windows-1252: {:?}", text);
    }
    bytes.into_owned()
}

/// Decodes a fixed-width, NUL-terminated name field. Bytes after the first
/// NUL are padding and ignored.
pub fn read_name_field(field: &[u8]) -> String {
    let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    decode_cp1252(&field[..len])
}

/// Encodes `name` into a zeroed field of `N` bytes, truncated so that at
/// least one terminating NUL always remains.
pub fn write_name_field<const N: usize>(name: &str) -> [u8; N] {
    let mut field = [0u8; N];
    let bytes = encode_cp1252(name);
    let len = bytes.len().min(N.saturating_sub(1));
    field[..len].copy_from_slice(&bytes[..len]);
    field
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_byte_value_round_trips() {
        let bytes: Vec<u8> = (1u8..=255).collect();
        let text = decode_cp1252(&bytes);
        assert_eq!(encode_cp1252(&text), bytes);
    }

    #[test]
    fn name_field_stops_at_nul() {
        let field = *b"wall\0garbage!!!!";
        assert_eq!(read_name_field(&field), "wall");
    }

    #[test]
    fn name_field_truncates() {
        let field: [u8; 16] = write_name_field("abcdefghijklmnopqrstu");
        assert_eq!(&field[..15], b"abcdefghijklmno");
        assert_eq!(field[15], 0);
    }

    #[test]
    fn high_codepage_characters() {
        assert_eq!(decode_cp1252(&[0xE9]), "é");
        assert_eq!(encode_cp1252("é"), vec![0xE9]);
    }
}
