//! Root metadata: the trust anchor naming the keys of every top-level role.

use std::{collections::BTreeMap, num::NonZeroU64};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Key, KeyId, KeyRecord, ParseError, Role, RoleRecord, Signed,
    envelope::open,
    key::{key_records, parse_keys},
};

/// Name of the root role.
pub const ROOT_ROLE: &str = "root";

/// Name of the top-level targets role.
pub const TARGETS_ROLE: &str = "targets";

/// Wire form of a root payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootRecord {
    /// Always `root`
    #[serde(rename = "_type")]
    pub kind: String,
    /// TUF specification version the repository follows
    pub spec_version: String,
    /// Carried for compatibility; consistent snapshots are not used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistent_snapshot: Option<bool>,
    /// Document version
    pub version: u64,
    /// Expiration instant
    pub expires: DateTime<Utc>,
    /// Keys by id
    pub keys: BTreeMap<String, KeyRecord>,
    /// Role definitions by name
    pub roles: BTreeMap<String, RoleRecord>,
}

/// A structurally valid root document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDocument {
    spec_version: String,
    consistent_snapshot: Option<bool>,
    version: NonZeroU64,
    expires: DateTime<Utc>,
    keys: BTreeMap<KeyId, Key>,
    root_role: Role,
    targets_role: Role,
    other_roles: BTreeMap<String, Role>,
}

impl RootDocument {
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

    /// Every key the root knows about.
    #[must_use]
    pub fn keys(&self) -> &BTreeMap<KeyId, Key> {
        &self.keys
    }

    /// Keys allowed to sign root metadata.
    #[must_use]
    pub fn root_role(&self) -> &Role {
        &self.root_role
    }

    /// Keys allowed to sign the top-level targets metadata.
    #[must_use]
    pub fn targets_role(&self) -> &Role {
        &self.targets_role
    }

    /// Look up any role by name.
    #[must_use]
    pub fn role(&self, name: &str) -> Option<&Role> {
        match name {
            ROOT_ROLE => Some(&self.root_role),
            TARGETS_ROLE => Some(&self.targets_role),
            other => self.other_roles.get(other),
        }
    }

    /// The wire form of this document.
    #[must_use]
    pub fn to_record(&self) -> RootRecord {
        let mut roles: BTreeMap<String, RoleRecord> = self
            .other_roles
            .iter()
            .map(|(name, role)| (name.clone(), role.to_record()))
            .collect();
        roles.insert(ROOT_ROLE.to_owned(), self.root_role.to_record());
        roles.insert(TARGETS_ROLE.to_owned(), self.targets_role.to_record());

        RootRecord {
            kind: ROOT_ROLE.to_owned(),
            spec_version: self.spec_version.clone(),
            consistent_snapshot: self.consistent_snapshot,
            version: self.version.get(),
            expires: self.expires,
            keys: key_records(&self.keys),
            roles,
        }
    }
}

impl TryFrom<RootRecord> for RootDocument {
    type Error = ParseError;

    fn try_from(record: RootRecord) -> Result<Self, Self::Error> {
        let version = NonZeroU64::new(record.version).ok_or(ParseError::InvalidVersion)?;
        let keys = parse_keys(record.keys)?;

        let mut roles = record
            .roles
            .into_iter()
            .map(|(name, role)| {
                let role = Role::new(&name, role.keyids, role.threshold, &keys)?;
                Ok((name, role))
            })
            .collect::<Result<BTreeMap<_, _>, ParseError>>()?;

        let root_role = roles
            .remove(ROOT_ROLE)
            .ok_or(ParseError::MissingRole(ROOT_ROLE))?;
        let targets_role = roles
            .remove(TARGETS_ROLE)
            .ok_or(ParseError::MissingRole(TARGETS_ROLE))?;

        Ok(Self {
            spec_version: record.spec_version,
            consistent_snapshot: record.consistent_snapshot,
            version,
            expires: record.expires,
            keys,
            root_role,
            targets_role,
            other_roles: roles,
        })
    }
}

/// Parse a root envelope.
///
/// # Errors
///
/// Fails when the bytes are not a well-formed root envelope or the document
/// violates a structural invariant.
pub fn parse_root(bytes: &[u8]) -> Result<Signed<RootDocument>, ParseError> {
    let signed = open::<RootRecord>(bytes, ROOT_ROLE)?;
    Ok(Signed {
        document: RootDocument::try_from(signed.document)?,
        signatures: signed.signatures,
        canonical: signed.canonical,
    })
}
