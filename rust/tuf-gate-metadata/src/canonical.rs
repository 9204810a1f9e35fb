//! Canonical JSON encoding.
//!
//! Signatures and key ids are computed over the [OLPC canonical JSON] form of
//! a value: object keys sorted, no insignificant whitespace, no floats.
//!
//! [OLPC canonical JSON]: http://wiki.laptop.org/go/Canonical_JSON

use olpc_cjson::CanonicalFormatter;
use serde::Serialize;

use crate::ParseError;

/// Encode `value` as canonical JSON bytes.
///
/// # Errors
///
/// Fails when the value cannot be represented canonically (for example when
/// it contains a floating point number).
pub fn to_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, ParseError> {
    let mut data = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut data, CanonicalFormatter::new());
    value
        .serialize(&mut serializer)
        .map_err(|e| ParseError::Canonical(e.to_string()))?;
    Ok(data)
}
