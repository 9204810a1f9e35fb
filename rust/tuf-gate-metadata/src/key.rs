//! Public keys and their content-derived identifiers.

use std::{collections::BTreeMap, fmt};

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{ParseError, canonical::to_canonical_json};

/// Identifier of a key: the lowercase hex SHA-256 digest of the canonical
/// JSON encoding of its [`KeyRecord`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Compute the id of a key record.
    ///
    /// # Errors
    ///
    /// Fails when the record has no canonical encoding.
    pub fn compute(record: &KeyRecord) -> Result<Self, ParseError> {
        let canonical = to_canonical_json(record)?;
        Ok(Self(hex::encode(Sha256::digest(&canonical))))
    }

    /// Accept a key id as it appears on the wire, checking only that it is hex.
    ///
    /// # Errors
    ///
    /// Fails when `value` is not a hex string.
    pub fn from_hex(value: &str) -> Result<Self, ParseError> {
        hex::decode(value).map_err(|e| ParseError::InvalidHex {
            field: "keyid",
            reason: e.to_string(),
        })?;
        Ok(Self(value.to_owned()))
    }

    /// The hex representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signature schemes accepted for metadata keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyScheme {
    /// Ed25519 over the canonical JSON of the signed payload.
    Ed25519,
}

impl KeyScheme {
    /// The wire tag used for both `keytype` and `scheme`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            KeyScheme::Ed25519 => "ed25519",
        }
    }
}

/// Key material as it appears in `keys` mappings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyRecord {
    /// Key type, e.g. `ed25519`
    pub keytype: String,
    /// Signature scheme, e.g. `ed25519`
    pub scheme: String,
    /// Public key value
    pub keyval: KeyValue,
    /// Legacy field emitted by older repository tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyid_hash_algorithms: Option<Vec<String>>,
}

/// The `keyval` member of a [`KeyRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyValue {
    /// Hex-encoded public key
    pub public: String,
}

/// A verified public key usable for signature checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    id: KeyId,
    scheme: KeyScheme,
    public: VerifyingKey,
    record: KeyRecord,
}

impl Key {
    /// Build a key from its wire record, checking that `declared` is the id
    /// derived from the record's content.
    ///
    /// # Errors
    ///
    /// Fails on unsupported key types, malformed key material, or an id that
    /// does not match the content.
    pub fn from_record(declared: &str, record: KeyRecord) -> Result<Self, ParseError> {
        let scheme = match (record.keytype.as_str(), record.scheme.as_str()) {
            ("ed25519", "ed25519") => KeyScheme::Ed25519,
            (keytype, scheme) => {
                return Err(ParseError::UnsupportedKey {
                    keytype: keytype.to_owned(),
                    scheme: scheme.to_owned(),
                });
            }
        };

        let computed = KeyId::compute(&record)?;
        if computed.as_str() != declared {
            return Err(ParseError::KeyIdMismatch {
                declared: declared.to_owned(),
                computed: computed.0,
            });
        }

        let invalid = |reason: String| ParseError::InvalidPublicKey {
            key_id: declared.to_owned(),
            reason,
        };
        let bytes = hex::decode(&record.keyval.public).map_err(|e| invalid(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| invalid(format!("expected 32 bytes, got {}", bytes.len())))?;
        let public = VerifyingKey::from_bytes(&bytes).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            id: computed,
            scheme,
            public,
            record,
        })
    }

    /// Wrap an ed25519 public key, deriving its id.
    #[must_use]
    pub fn from_verifying_key(public: VerifyingKey) -> Self {
        let record = KeyRecord {
            keytype: KeyScheme::Ed25519.as_str().to_owned(),
            scheme: KeyScheme::Ed25519.as_str().to_owned(),
            keyval: KeyValue {
                public: hex::encode(public.as_bytes()),
            },
            keyid_hash_algorithms: None,
        };
        // Canonical encoding of the record, members in sorted order.
        let canonical = format!(
            r#"{{"keytype":"{ed25519}","keyval":{{"public":"{public}"}},"scheme":"{ed25519}"}}"#,
            ed25519 = KeyScheme::Ed25519.as_str(),
            public = record.keyval.public,
        );
        let id = KeyId(hex::encode(Sha256::digest(canonical.as_bytes())));
        Self {
            id,
            scheme: KeyScheme::Ed25519,
            public,
            record,
        }
    }

    /// The content-derived key id.
    #[must_use]
    pub fn id(&self) -> &KeyId {
        &self.id
    }

    /// The signature scheme of this key.
    #[must_use]
    pub fn scheme(&self) -> KeyScheme {
        self.scheme
    }

    /// The wire record this key was built from.
    #[must_use]
    pub fn record(&self) -> &KeyRecord {
        &self.record
    }

    /// Check `signature` over `message`. Malformed signatures never verify.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        use signature::Verifier;

        let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
            return false;
        };
        self.public.verify(message, &signature).is_ok()
    }
}

/// Parse a wire `keys` mapping into verified keys.
pub(crate) fn parse_keys(
    records: BTreeMap<String, KeyRecord>,
) -> Result<BTreeMap<KeyId, Key>, ParseError> {
    records
        .into_iter()
        .map(|(declared, record)| {
            let key = Key::from_record(&declared, record)?;
            Ok((key.id().clone(), key))
        })
        .collect()
}

/// Render verified keys back into a wire `keys` mapping.
pub(crate) fn key_records(keys: &BTreeMap<KeyId, Key>) -> BTreeMap<String, KeyRecord> {
    keys.iter()
        .map(|(id, key)| (id.to_string(), key.record().clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(seed: u8) -> Key {
        let signing = ed25519_dalek::SigningKey::from_bytes(&[seed; 32]);
        Key::from_verifying_key(signing.verifying_key())
    }

    #[test]
    fn it_derives_the_same_id_from_the_record() {
        let key = test_key(1);
        let parsed = Key::from_record(key.id().as_str(), key.record().clone()).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn it_rejects_a_declared_id_that_does_not_match() {
        let key = test_key(1);
        let other = test_key(2);
        let result = Key::from_record(other.id().as_str(), key.record().clone());
        assert!(matches!(result, Err(ParseError::KeyIdMismatch { .. })));
    }

    #[test]
    fn it_rejects_unsupported_schemes() {
        let mut record = test_key(1).record().clone();
        record.keytype = "rsa".into();
        record.scheme = "rsassa-pss-sha256".into();
        let id = KeyId::compute(&record).unwrap();
        assert!(matches!(
            Key::from_record(id.as_str(), record),
            Err(ParseError::UnsupportedKey { .. })
        ));
    }

    #[test]
    fn it_rejects_short_public_keys() {
        let mut record = test_key(1).record().clone();
        record.keyval.public = "abcd".into();
        let id = KeyId::compute(&record).unwrap();
        assert!(matches!(
            Key::from_record(id.as_str(), record),
            Err(ParseError::InvalidPublicKey { .. })
        ));
    }

    #[test]
    fn it_verifies_signatures_by_the_matching_key_only() {
        use signature::Signer;

        let signing = ed25519_dalek::SigningKey::from_bytes(&[7; 32]);
        let key = Key::from_verifying_key(signing.verifying_key());
        let signature = signing.sign(b"payload").to_bytes();

        assert!(key.verify(b"payload", &signature));
        assert!(!key.verify(b"tampered", &signature));
        assert!(!test_key(8).verify(b"payload", &signature));
        assert!(!key.verify(b"payload", &signature[..10]));
    }
}
