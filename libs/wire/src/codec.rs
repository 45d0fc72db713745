//! ISO-8859-1 text codec.
//!
//! Every byte maps to the code point of the same value and back. Characters
//! outside U+0000..=U+00FF have no encoding and become [`REPLACEMENT_BYTE`].

/// Byte written for characters that cannot be encoded (`?`).
pub const REPLACEMENT_BYTE: u8 = b'?';

/// Decodes raw backend bytes, one character per byte.
pub fn decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Encodes text for the backend, one byte per character.
pub fn encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(REPLACEMENT_BYTE))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_decode_high_bytes() {
        // Bytes above 0x7f are not UTF-8 sequences here
        assert_eq!(decode(&[0x68, 0xe9, 0xff]), "h\u{e9}\u{ff}");
        assert_eq!(decode(&[0xc3, 0xa9]).chars().count(), 2);
    }

    #[test]
    fn test_every_byte_survives() {
        let all: Vec<u8> = (0..=255).collect();
        let text = decode(&all);
        assert_eq!(text.chars().count(), 256);
        assert_eq!(encode(&text), all);
    }

    #[rstest]
    #[case("ping", b"ping".to_vec())]
    #[case("caf\u{e9}", vec![b'c', b'a', b'f', 0xe9])]
    #[case("\u{20ac}5", vec![REPLACEMENT_BYTE, b'5'])]
    #[case("", vec![])]
    fn test_encode(#[case] input: &str, #[case] expected: Vec<u8>) {
        assert_eq!(encode(input), expected);
    }
}
