//! Structural errors raised while parsing metadata documents.

use thiserror::Error;

/// A metadata document could not be turned into a typed document.
///
/// Parse errors are raised before any trust evaluation happens. A document
/// that fails to parse never reaches signature verification.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The bytes are not valid JSON, a required field is missing, a field has
    /// the wrong shape, or an unknown field is present.
    #[error("malformed metadata: {0}")]
    Json(#[from] serde_json::Error),

    /// The signed payload could not be encoded as canonical JSON.
    #[error("signed payload has no canonical form: {0}")]
    Canonical(String),

    /// The `_type` tag names a different kind of document.
    #[error("expected a `{expected}` document, found `{found}`")]
    WrongType {
        /// The document kind that was requested
        expected: &'static str,
        /// The `_type` value found in the payload
        found: String,
    },

    /// The document version is zero.
    #[error("version must be a positive integer")]
    InvalidVersion,

    /// A required top-level role is missing from a root document.
    #[error("root document does not define the `{0}` role")]
    MissingRole(&'static str),

    /// A role threshold is zero or larger than the number of its keys.
    #[error("role `{role}` has threshold {threshold} with {keys} key(s)")]
    InvalidThreshold {
        /// Name of the offending role
        role: String,
        /// Declared threshold
        threshold: u64,
        /// Number of key ids listed for the role
        keys: usize,
    },

    /// A role lists the same key id twice.
    #[error("role `{role}` lists key id {key_id} more than once")]
    DuplicateKeyId {
        /// Name of the offending role
        role: String,
        /// The repeated key id
        key_id: String,
    },

    /// A role references a key id that is absent from the key mapping.
    #[error("role `{role}` references unknown key id {key_id}")]
    UnresolvedKeyId {
        /// Name of the offending role
        role: String,
        /// The key id that could not be resolved
        key_id: String,
    },

    /// A key is declared under an id that is not derived from its content.
    #[error("key declared as {declared} hashes to {computed}")]
    KeyIdMismatch {
        /// The id under which the key was declared
        declared: String,
        /// The id computed from the key record
        computed: String,
    },

    /// A key uses a type or scheme other than ed25519.
    #[error("unsupported key type `{keytype}` with scheme `{scheme}`")]
    UnsupportedKey {
        /// Declared key type
        keytype: String,
        /// Declared signature scheme
        scheme: String,
    },

    /// Public key material is not a valid ed25519 point.
    #[error("invalid public key {key_id}: {reason}")]
    InvalidPublicKey {
        /// Id of the offending key
        key_id: String,
        /// Why the key was rejected
        reason: String,
    },

    /// A signature entry is not hex encoded, or a key id is not a hex digest.
    #[error("invalid hex in {field}: {reason}")]
    InvalidHex {
        /// Which field failed to decode
        field: &'static str,
        /// Decoder error
        reason: String,
    },

    /// A delegation path pattern is empty or uses `*` other than as a single
    /// trailing wildcard.
    #[error("invalid path pattern `{0}`")]
    InvalidPathPattern(String),

    /// A delegation set names the same role more than once.
    #[error("delegated role `{0}` is declared more than once")]
    DuplicateRole(String),

    /// A delegated role name is empty or collides with a top-level role name.
    #[error("invalid delegated role name `{0}`")]
    InvalidRoleName(String),
}
