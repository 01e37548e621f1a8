//! Validity classification of stored credential values.
//!
//! Stored values have mixed provenance: current `IV:TAG:CIPHERTEXT` blobs,
//! a JSON envelope written by older releases
//! (`{"v":1,"ivB64":..,"tagB64":..,"ctB64":..}`), plaintext placeholders from
//! before encryption was introduced, and the reset [`SENTINEL`].
//! [`classify`] sorts a raw value into one of these buckets so the repair
//! pass can decide what to touch.
//!
//! Any JSON object that claims `v: 1` is treated as an envelope, even when
//! the rest of it is garbage. An envelope with a missing or empty field is
//! [`Classification::Malformed`], not [`Classification::NotBlob`].
//!
//! [`SENTINEL`]: crate::blob::SENTINEL

use serde_json::{Map, Value};

use crate::blob::{EncryptedBlob, is_sentinel};
use crate::codec::CredentialCodec;
use crate::error::{Result, VaultError};

/// Version marker carried by the JSON envelope.
pub const ENVELOPE_VERSION: u64 = 1;

/// Envelope fields, in IV, tag, ciphertext order.
pub const ENVELOPE_FIELDS: [&str; 3] = ["ivB64", "tagB64", "ctB64"];

/// What a stored credential value turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// No value, or only whitespace.
    Missing,

    /// The reset sentinel. Already repaired; never re-classified.
    Sentinel,

    /// Not a blob container at all: legacy plaintext or a placeholder.
    NotBlob,

    /// Looks like a blob container but a required part is missing or empty.
    Malformed { reason: String },

    /// Well-formed and decrypts with the configured key.
    Valid,

    /// Well-formed but fails decoding or tag verification.
    Corrupt { reason: String },
}

impl Classification {
    /// Short label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Sentinel => "sentinel",
            Self::NotBlob => "not_blob",
            Self::Malformed { .. } => "malformed",
            Self::Valid => "valid",
            Self::Corrupt { .. } => "corrupt",
        }
    }

    /// Malformed or corrupt: the value must be replaced by the sentinel.
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Malformed { .. } | Self::Corrupt { .. })
    }
}

/// Classify a raw stored value against `codec`'s key.
pub fn classify(raw: Option<&str>, codec: &CredentialCodec) -> Classification {
    let Some(raw) = raw else {
        return Classification::Missing;
    };

    if raw.trim().is_empty() {
        return Classification::Missing;
    }

    if is_sentinel(raw) {
        return Classification::Sentinel;
    }

    match shape_of(raw) {
        Shape::NotBlob => Classification::NotBlob,
        Shape::Malformed(reason) => Classification::Malformed { reason },
        Shape::Segments([iv, tag, ct]) => {
            let opened = EncryptedBlob::from_segments(&iv, &tag, &ct)
                .and_then(|blob| codec.open_blob(&blob));
            match opened {
                Ok(_) => Classification::Valid,
                Err(e) => Classification::Corrupt {
                    reason: e.to_string(),
                },
            }
        }
    }
}

/// Parse a stored value, current wire format or v1 envelope, into a blob.
///
/// Applies the same structural rules as [`classify`], so any value that
/// classifies as [`Classification::Valid`] parses here.
///
/// # Errors
///
/// Returns [`VaultError::Format`] for values that are not blobs or are
/// missing a part, and [`VaultError::Decryption`] for bad segment encodings.
pub fn parse_stored(raw: &str) -> Result<EncryptedBlob> {
    match shape_of(raw) {
        Shape::Segments([iv, tag, ct]) => EncryptedBlob::from_segments(&iv, &tag, &ct),
        Shape::Malformed(reason) => Err(VaultError::Format { reason }),
        Shape::NotBlob => Err(VaultError::Format {
            reason: "stored value is not an encrypted blob".into(),
        }),
    }
}

/// Structure of a stored value, before any decoding.
enum Shape {
    NotBlob,
    Malformed(String),
    /// Base64 IV, tag and ciphertext, all non-empty.
    Segments([String; 3]),
}

fn shape_of(raw: &str) -> Shape {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => envelope_shape(&map),
        _ => delimited_shape(raw),
    }
}

fn envelope_shape(map: &Map<String, Value>) -> Shape {
    if map.get("v").and_then(Value::as_u64) != Some(ENVELOPE_VERSION) {
        return Shape::NotBlob;
    }

    let segments: Vec<Option<&str>> = ENVELOPE_FIELDS
        .iter()
        .map(|field| map.get(*field).and_then(Value::as_str).filter(|s| !s.is_empty()))
        .collect();

    match segments.as_slice() {
        [Some(iv), Some(tag), Some(ct)] => {
            Shape::Segments([iv.to_string(), tag.to_string(), ct.to_string()])
        }
        _ => {
            let missing: Vec<&str> = ENVELOPE_FIELDS
                .iter()
                .zip(&segments)
                .filter(|(_, seg)| seg.is_none())
                .map(|(field, _)| *field)
                .collect();
            Shape::Malformed(format!(
                "envelope fields missing or empty: {}",
                missing.join(", ")
            ))
        }
    }
}

fn delimited_shape(raw: &str) -> Shape {
    let Ok([iv, tag, ct]) = EncryptedBlob::split_wire(raw) else {
        return Shape::NotBlob;
    };

    if iv.is_empty() || tag.is_empty() || ct.is_empty() {
        return Shape::Malformed("blob has an empty segment".into());
    }

    Shape::Segments([iv.to_string(), tag.to_string(), ct.to_string()])
}
