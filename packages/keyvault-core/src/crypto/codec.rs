//! # Binary Codecs
//!
//! Base64 (standard alphabet, padded) for stored envelope fields and sealed
//! payloads, and base64url (URL-safe alphabet, unpadded) for key ids.
//!
//! Both decoders are strict about the alphabet: a stray character is an
//! error, never silently dropped or truncated.

use base64::{
    alphabet,
    engine::{general_purpose::STANDARD, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};

use crate::error::{Error, Result};

/// URL-safe engine: encodes without padding, accepts input with or without it.
const URL_SAFE_LENIENT_PADDING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as standard, padded base64
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64
///
/// Fails with `InvalidEncoding` on any character outside the alphabet.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| Error::InvalidEncoding(format!("base64: {}", e)))
}

/// Encode bytes as unpadded base64url
pub fn encode_base64url(bytes: &[u8]) -> String {
    URL_SAFE_LENIENT_PADDING.encode(bytes)
}

/// Decode base64url, with or without trailing padding
pub fn decode_base64url(encoded: &str) -> Result<Vec<u8>> {
    URL_SAFE_LENIENT_PADDING
        .decode(encoded)
        .map_err(|e| Error::InvalidEncoding(format!("base64url: {}", e)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_lossless_for_every_byte_value() {
        let all: Vec<u8> = (0..=255u8).collect();
        assert_eq!(decode_base64(&encode_base64(&all)).unwrap(), all);
        assert_eq!(decode_base64url(&encode_base64url(&all)).unwrap(), all);
    }

    #[test]
    fn test_base64url_is_url_safe_and_unpadded() {
        let encoded = encode_base64url(&[0xfb, 0xff, 0xfe, 0x01]);
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn test_base64url_accepts_padding() {
        assert_eq!(decode_base64url("AQI=").unwrap(), vec![1, 2]);
        assert_eq!(decode_base64url("AQI").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_invalid_alphabet_rejected() {
        assert!(matches!(
            decode_base64("abc$def="),
            Err(Error::InvalidEncoding(_))
        ));
        // URL-safe characters are not part of the standard alphabet
        assert!(decode_base64("ab-_").is_err());
        // and vice versa
        assert!(matches!(
            decode_base64url("ab+/"),
            Err(Error::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_whitespace_is_not_skipped() {
        assert!(decode_base64("AQID BAUG").is_err());
    }
}
