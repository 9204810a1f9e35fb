//! The signed metadata envelope.
//!
//! Every document travels as `{"signed": <payload>, "signatures": [...]}`.
//! Signatures are detached from the payload and cover the canonical JSON
//! encoding of `signed` exactly as it was received.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{KeyId, ParseError, canonical::to_canonical_json};

/// Wire form of a signed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// The signed payload, kept untyped so the canonical bytes match what
    /// the signers saw.
    pub signed: Value,
    /// Detached signatures over the canonical payload.
    pub signatures: Vec<SignatureRecord>,
}

/// Wire form of one signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureRecord {
    /// Id of the key that produced the signature
    pub keyid: String,
    /// Hex-encoded signature bytes
    pub sig: String,
}

/// A decoded signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Id of the key that claims to have produced this signature.
    pub key_id: KeyId,
    /// Raw signature bytes.
    pub bytes: Vec<u8>,
}

impl TryFrom<SignatureRecord> for Signature {
    type Error = ParseError;

    fn try_from(record: SignatureRecord) -> Result<Self, Self::Error> {
        let bytes = hex::decode(&record.sig).map_err(|e| ParseError::InvalidHex {
            field: "sig",
            reason: e.to_string(),
        })?;
        Ok(Self {
            key_id: KeyId::from_hex(&record.keyid)?,
            bytes,
        })
    }
}

/// A parsed document together with the material needed to verify it.
#[derive(Debug, Clone)]
pub struct Signed<T> {
    /// The typed payload.
    pub document: T,
    /// Signatures as they appeared in the envelope, duplicates included.
    pub signatures: Vec<Signature>,
    /// Canonical JSON of the payload; the message every signature covers.
    pub canonical: Vec<u8>,
}

/// Decode an envelope and deserialize its payload as `R`.
///
/// `kind` is the expected `_type` tag of the payload.
pub(crate) fn open<R: DeserializeOwned>(
    bytes: &[u8],
    kind: &'static str,
) -> Result<Signed<R>, ParseError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;

    match envelope.signed.get("_type").and_then(Value::as_str) {
        Some(found) if found == kind => {}
        Some(found) => {
            return Err(ParseError::WrongType {
                expected: kind,
                found: found.to_owned(),
            });
        }
        None => {
            return Err(ParseError::WrongType {
                expected: kind,
                found: String::new(),
            });
        }
    }

    let canonical = to_canonical_json(&envelope.signed)?;
    let signatures = envelope
        .signatures
        .into_iter()
        .map(Signature::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let document = serde_json::from_value(envelope.signed)?;

    Ok(Signed {
        document,
        signatures,
        canonical,
    })
}
