//! Targets metadata and delegations.

use std::{
    collections::{BTreeMap, BTreeSet},
    num::NonZeroU64,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Key, KeyId, KeyRecord, PathPattern, ParseError, Role, Signed,
    envelope::open,
    key::{key_records, parse_keys},
    root::{ROOT_ROLE, TARGETS_ROLE},
};

const RESERVED_ROLE_NAMES: [&str; 4] = [ROOT_ROLE, TARGETS_ROLE, "snapshot", "timestamp"];

/// Integrity metadata recorded for one target path.
///
/// None of these fields take part in the authorization decision: presence of
/// the path is what grants access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetEntry {
    /// Length of the target in bytes
    pub length: u64,
    /// Digests by algorithm name
    pub hashes: BTreeMap<String, String>,
    /// Free-form data attached by the repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
}

/// Wire form of a delegated role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelegatedRoleRecord {
    /// Role name; also the name of its metadata file
    pub name: String,
    /// Ids of the keys authorized to sign for the role
    pub keyids: Vec<String>,
    /// Minimum number of distinct valid signatures
    pub threshold: u64,
    /// Whether a pattern match makes this role the final authority
    pub terminating: bool,
    /// Path patterns governed by the role
    pub paths: Vec<PathPattern>,
}

/// Wire form of a delegation set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelegationsRecord {
    /// Keys usable by the delegated roles
    pub keys: BTreeMap<String, KeyRecord>,
    /// Delegated roles in priority order
    pub roles: Vec<DelegatedRoleRecord>,
}

/// Wire form of a targets payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetsRecord {
    /// Always `targets`
    #[serde(rename = "_type")]
    pub kind: String,
    /// TUF specification version the repository follows
    pub spec_version: String,
    /// Document version
    pub version: u64,
    /// Expiration instant
    pub expires: DateTime<Utc>,
    /// Target entries by path
    pub targets: BTreeMap<String, TargetEntry>,
    /// Optional delegations to other roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegations: Option<DelegationsRecord>,
}

/// A role that some subset of paths has been delegated to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegatedRole {
    name: String,
    role: Role,
    terminating: bool,
    paths: Vec<PathPattern>,
}

impl DelegatedRole {
    /// Role name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Authorized keys and threshold.
    #[must_use]
    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Whether a pattern match makes this role the final authority.
    #[must_use]
    pub fn terminating(&self) -> bool {
        self.terminating
    }

    /// Path patterns governed by this role, in declared order.
    #[must_use]
    pub fn paths(&self) -> &[PathPattern] {
        &self.paths
    }
}

/// Keys and ordered roles delegated by a targets document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationSet {
    keys: BTreeMap<KeyId, Key>,
    roles: Vec<DelegatedRole>,
}

impl DelegationSet {
    /// Keys usable by the delegated roles.
    #[must_use]
    pub fn keys(&self) -> &BTreeMap<KeyId, Key> {
        &self.keys
    }

    /// Delegated roles, in the order they must be consulted.
    #[must_use]
    pub fn roles(&self) -> &[DelegatedRole] {
        &self.roles
    }

    fn to_record(&self) -> DelegationsRecord {
        DelegationsRecord {
            keys: key_records(&self.keys),
            roles: self
                .roles
                .iter()
                .map(|delegated| {
                    let role = delegated.role.to_record();
                    DelegatedRoleRecord {
                        name: delegated.name.clone(),
                        keyids: role.keyids,
                        threshold: role.threshold,
                        terminating: delegated.terminating,
                        paths: delegated.paths.clone(),
                    }
                })
                .collect(),
        }
    }
}

impl TryFrom<DelegationsRecord> for DelegationSet {
    type Error = ParseError;

    fn try_from(record: DelegationsRecord) -> Result<Self, Self::Error> {
        let keys = parse_keys(record.keys)?;
        let mut names = BTreeSet::new();
        let mut roles = Vec::with_capacity(record.roles.len());

        for delegated in record.roles {
            if delegated.name.is_empty() || RESERVED_ROLE_NAMES.contains(&delegated.name.as_str())
            {
                return Err(ParseError::InvalidRoleName(delegated.name));
            }
            if !names.insert(delegated.name.clone()) {
                return Err(ParseError::DuplicateRole(delegated.name));
            }
            let role = Role::new(
                &delegated.name,
                delegated.keyids,
                delegated.threshold,
                &keys,
            )?;
            roles.push(DelegatedRole {
                name: delegated.name,
                role,
                terminating: delegated.terminating,
                paths: delegated.paths,
            });
        }

        Ok(Self { keys, roles })
    }
}

/// A structurally valid targets document, top-level or delegated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetsDocument {
    spec_version: String,
    version: NonZeroU64,
    expires: DateTime<Utc>,
    targets: BTreeMap<String, TargetEntry>,
    delegations: Option<DelegationSet>,
}

impl TargetsDocument {
    /// Document version.
    #[must_use]
    pub fn version(&self) -> NonZeroU64 {
        self.version
    }

    /// Expiration instant.
    #[must_use]
    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    /// Target entries by path.
    #[must_use]
    pub fn targets(&self) -> &BTreeMap<String, TargetEntry> {
        &self.targets
    }

    /// Whether `path` has a target entry in this document.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.targets.contains_key(path)
    }

    /// Delegations declared by this document.
    #[must_use]
    pub fn delegations(&self) -> Option<&DelegationSet> {
        self.delegations.as_ref()
    }

    /// The wire form of this document.
    #[must_use]
    pub fn to_record(&self) -> TargetsRecord {
        TargetsRecord {
            kind: TARGETS_ROLE.to_owned(),
            spec_version: self.spec_version.clone(),
            version: self.version.get(),
            expires: self.expires,
            targets: self.targets.clone(),
            delegations: self.delegations.as_ref().map(DelegationSet::to_record),
        }
    }
}

impl TryFrom<TargetsRecord> for TargetsDocument {
    type Error = ParseError;

    fn try_from(record: TargetsRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            spec_version: record.spec_version,
            version: NonZeroU64::new(record.version).ok_or(ParseError::InvalidVersion)?,
            expires: record.expires,
            targets: record.targets,
            delegations: record.delegations.map(DelegationSet::try_from).transpose()?,
        })
    }
}

/// Parse a targets envelope (top-level or delegated; both use `_type: targets`).
///
/// # Errors
///
/// Fails when the bytes are not a well-formed targets envelope or the
/// document violates a structural invariant.
pub fn parse_targets(bytes: &[u8]) -> Result<Signed<TargetsDocument>, ParseError> {
    let signed = open::<TargetsRecord>(bytes, TARGETS_ROLE)?;
    Ok(Signed {
        document: TargetsDocument::try_from(signed.document)?,
        signatures: signed.signatures,
        canonical: signed.canonical,
    })
}
