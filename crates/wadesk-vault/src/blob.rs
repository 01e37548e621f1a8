//! The encrypted blob and its text wire format.
//!
//! A blob is stored in a single text column as
//!
//! ```text
//! base64(iv) ":" base64(tag) ":" base64(ciphertext)
//! ```
//!
//! using the standard base64 alphabet with padding. The three parts always
//! appear in this order and there are exactly two delimiters.
//!
//! The [`SENTINEL`] has the same three-segment shape but is not a blob. It
//! marks a record whose credential was reset and must be reconnected, and is
//! never passed to decryption.

use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::crypto::{IV_LEN, TAG_LEN};
use crate::error::{Result, VaultError};

/// Separator between the IV, tag, and ciphertext segments.
pub const DELIMITER: char = ':';

/// One segment of the reset sentinel.
pub const SENTINEL_SEGMENT: &str = "LEGACY_RESET_REQUIRED";

/// Placeholder written over invalid or corrupt credentials.
pub const SENTINEL: &str = "LEGACY_RESET_REQUIRED:LEGACY_RESET_REQUIRED:LEGACY_RESET_REQUIRED";

/// Whether `value` is exactly the reset sentinel.
pub fn is_sentinel(value: &str) -> bool {
    value == SENTINEL
}

/// Output of one encryption call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    /// Random 96-bit IV, fresh for every encryption.
    pub iv: [u8; IV_LEN],

    /// 128-bit GCM authentication tag.
    pub tag: [u8; TAG_LEN],

    /// Encrypted payload, same length as the plaintext.
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    /// Encode as `IV:TAG:CIPHERTEXT`.
    pub fn to_wire(&self) -> String {
        format!(
            "{}{DELIMITER}{}{DELIMITER}{}",
            BASE64.encode(self.iv),
            BASE64.encode(self.tag),
            BASE64.encode(&self.ciphertext),
        )
    }

    /// Split a wire string into its three raw segments.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Format`] unless there are exactly 3 segments.
    pub fn split_wire(value: &str) -> Result<[&str; 3]> {
        let parts: Vec<&str> = value.split(DELIMITER).collect();
        match parts.as_slice() {
            [iv, tag, ct] => Ok([*iv, *tag, *ct]),
            _ => Err(VaultError::Format {
                reason: format!("expected 3 segments, got {}", parts.len()),
            }),
        }
    }

    /// Decode the three base64 segments into a blob.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Decryption`] if a segment is not valid base64 or
    /// the IV/tag have the wrong length.
    pub fn from_segments(iv_b64: &str, tag_b64: &str, ct_b64: &str) -> Result<Self> {
        let iv = decode_fixed::<IV_LEN>("iv", iv_b64)?;
        let tag = decode_fixed::<TAG_LEN>("tag", tag_b64)?;
        let ciphertext = BASE64
            .decode(ct_b64)
            .map_err(|e| VaultError::Decryption {
                reason: format!("invalid ciphertext encoding: {e}"),
            })?;

        Ok(Self {
            iv,
            tag,
            ciphertext,
        })
    }
}

fn decode_fixed<const N: usize>(field: &str, encoded: &str) -> Result<[u8; N]> {
    let bytes = BASE64.decode(encoded).map_err(|e| VaultError::Decryption {
        reason: format!("invalid {field} encoding: {e}"),
    })?;

    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| VaultError::Decryption {
        reason: format!("{field} must be {N} bytes, got {}", bytes.len()),
    })
}

impl FromStr for EncryptedBlob {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        let [iv, tag, ct] = Self::split_wire(s)?;
        Self::from_segments(iv, tag, ct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EncryptedBlob {
        EncryptedBlob {
            iv: [1u8; IV_LEN],
            tag: [2u8; TAG_LEN],
            ciphertext: b"payload".to_vec(),
        }
    }

    #[test]
    fn wire_layout_is_iv_tag_ciphertext() {
        let wire = sample().to_wire();
        let parts: Vec<&str> = wire.split(':').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], BASE64.encode([1u8; IV_LEN]));
        assert_eq!(parts[1], BASE64.encode([2u8; TAG_LEN]));
        assert_eq!(parts[2], BASE64.encode(b"payload"));
    }

    #[test]
    fn parse_accepts_own_output() {
        let blob = sample();
        let parsed: EncryptedBlob = blob.to_wire().parse().unwrap();
        assert_eq!(parsed, blob);
    }

    #[test]
    fn wrong_segment_counts_are_format_errors() {
        for value in ["", "abc", "a:b", "a:b:c:d", "a:b:c:d:e", ":::"] {
            let result = value.parse::<EncryptedBlob>();
            assert!(
                matches!(result, Err(VaultError::Format { .. })),
                "expected format error for {value:?}"
            );
        }
    }

    #[test]
    fn bad_encoding_is_decryption_error() {
        let result = "!!!:AAAA:AAAA".parse::<EncryptedBlob>();
        assert!(matches!(result, Err(VaultError::Decryption { .. })));
    }

    #[test]
    fn short_iv_is_decryption_error() {
        let wire = format!(
            "{}:{}:{}",
            BASE64.encode([0u8; 8]),
            BASE64.encode([0u8; TAG_LEN]),
            BASE64.encode(b"x")
        );
        let result = wire.parse::<EncryptedBlob>();
        assert!(matches!(result, Err(VaultError::Decryption { .. })));
    }

    #[test]
    fn sentinel_has_blob_shape_but_is_detected() {
        assert!(is_sentinel(SENTINEL));
        assert_eq!(EncryptedBlob::split_wire(SENTINEL).unwrap(), [SENTINEL_SEGMENT; 3]);
        assert!(!is_sentinel(&sample().to_wire()));
    }
}
