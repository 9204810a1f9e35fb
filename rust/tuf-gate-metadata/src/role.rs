//! Role key sets and thresholds.

use std::{
    collections::{BTreeMap, BTreeSet},
    num::NonZeroU64,
};

use serde::{Deserialize, Serialize};

use crate::{Key, KeyId, ParseError};

/// Wire form of a role definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleRecord {
    /// Ids of the keys authorized to sign for the role
    pub keyids: Vec<String>,
    /// Minimum number of distinct valid signatures
    pub threshold: u64,
}

/// A set of authorized key ids and the number of them that must sign.
///
/// Invariant: `1 <= threshold <= key_ids.len()` and key ids are unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    key_ids: Vec<KeyId>,
    threshold: NonZeroU64,
}

impl Role {
    /// Validate a role definition against the key mapping it draws from.
    ///
    /// # Errors
    ///
    /// Fails when the threshold invariant is violated, a key id is repeated,
    /// or a key id is missing from `keys`.
    pub fn new(
        name: &str,
        key_ids: Vec<String>,
        threshold: u64,
        keys: &BTreeMap<KeyId, Key>,
    ) -> Result<Self, ParseError> {
        let invalid_threshold = || ParseError::InvalidThreshold {
            role: name.to_owned(),
            threshold,
            keys: key_ids.len(),
        };
        let threshold = NonZeroU64::new(threshold).ok_or_else(invalid_threshold)?;
        if threshold.get() > key_ids.len() as u64 {
            return Err(invalid_threshold());
        }

        let mut seen = BTreeSet::new();
        let mut resolved = Vec::with_capacity(key_ids.len());
        for key_id in &key_ids {
            let key_id = KeyId::from_hex(key_id)?;
            if !seen.insert(key_id.clone()) {
                return Err(ParseError::DuplicateKeyId {
                    role: name.to_owned(),
                    key_id: key_id.to_string(),
                });
            }
            if !keys.contains_key(&key_id) {
                return Err(ParseError::UnresolvedKeyId {
                    role: name.to_owned(),
                    key_id: key_id.to_string(),
                });
            }
            resolved.push(key_id);
        }

        Ok(Self {
            key_ids: resolved,
            threshold,
        })
    }

    /// The authorized key ids, in declared order.
    #[must_use]
    pub fn key_ids(&self) -> &[KeyId] {
        &self.key_ids
    }

    /// Minimum number of distinct valid signatures.
    #[must_use]
    pub fn threshold(&self) -> NonZeroU64 {
        self.threshold
    }

    /// Whether `key_id` is authorized for this role.
    #[must_use]
    pub fn authorizes(&self, key_id: &KeyId) -> bool {
        self.key_ids.contains(key_id)
    }

    /// The wire form of this role.
    #[must_use]
    pub fn to_record(&self) -> RoleRecord {
        RoleRecord {
            keyids: self.key_ids.iter().map(ToString::to_string).collect(),
            threshold: self.threshold.get(),
        }
    }
}
