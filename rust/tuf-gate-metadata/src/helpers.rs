//! Key generation and document signing.
//!
//! These helpers manufacture signed repositories for tests and for the
//! repository generator. They build wire records, which callers may tamper
//! with before signing to produce malformed documents on purpose.
//!
//! # Example
//!
//! ```no_run
//! use tuf_gate_metadata::helpers::{KeyPair, RootBuilder, expires_in, sign};
//!
//! let key = KeyPair::from_seed([1; 32]);
//! let root = RootBuilder::new(expires_in(chrono::Duration::days(365)))
//!     .root_keys(&[&key], 1)
//!     .targets_keys(&[&key], 1)
//!     .build();
//! let bytes = sign(&root, &[&key]).unwrap();
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, DurationRound, Utc};
use ed25519_dalek::SigningKey;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{
    DelegatedRoleRecord, DelegationsRecord, Envelope, Key, KeyId, KeyRecord, ParseError,
    PathPattern, RoleRecord, RootRecord, SignatureRecord, TargetEntry, TargetsRecord,
    canonical::to_canonical_json,
    root::{ROOT_ROLE, TARGETS_ROLE},
};

/// Specification version written into generated documents.
pub const SPEC_VERSION: &str = "1.0.31";

/// An ed25519 signing key together with its public [`Key`].
#[derive(Debug, Clone)]
pub struct KeyPair {
    signing: SigningKey,
    key: Key,
}

impl KeyPair {
    /// Deterministic key pair from a 32 byte seed.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(&seed);
        let key = Key::from_verifying_key(signing.verifying_key());
        Self { signing, key }
    }

    /// Fresh key pair from the operating system RNG.
    ///
    /// # Errors
    ///
    /// Fails when the RNG is unavailable.
    pub fn generate() -> Result<Self, getrandom::Error> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed)?;
        Ok(Self::from_seed(seed))
    }

    /// The public key.
    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The public key id.
    #[must_use]
    pub fn id(&self) -> &KeyId {
        self.key.id()
    }

    /// Sign `message`, returning raw signature bytes.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        use signature::Signer;
        self.signing.sign(message).to_bytes().to_vec()
    }
}

/// An expiration instant `duration` from now, truncated to whole seconds.
#[must_use]
pub fn expires_in(duration: Duration) -> DateTime<Utc> {
    let instant = Utc::now() + duration;
    instant
        .duration_trunc(Duration::seconds(1))
        .unwrap_or(instant)
}

/// Wrap `payload` in an envelope signed by every key in `signers`.
///
/// # Errors
///
/// Fails when the payload cannot be encoded as canonical JSON.
pub fn sign<T: Serialize>(payload: &T, signers: &[&KeyPair]) -> Result<Vec<u8>, ParseError> {
    let signed = serde_json::to_value(payload)?;
    let canonical = to_canonical_json(&signed)?;
    let signatures = signers
        .iter()
        .map(|signer| SignatureRecord {
            keyid: signer.id().to_string(),
            sig: hex::encode(signer.sign(&canonical)),
        })
        .collect();
    Ok(serde_json::to_vec_pretty(&Envelope { signed, signatures })?)
}

fn records(keys: &[&KeyPair]) -> BTreeMap<String, KeyRecord> {
    keys.iter()
        .map(|pair| (pair.id().to_string(), pair.key().record().clone()))
        .collect()
}

fn role(keys: &[&KeyPair], threshold: u64) -> RoleRecord {
    RoleRecord {
        keyids: keys.iter().map(|pair| pair.id().to_string()).collect(),
        threshold,
    }
}

/// Builder for root payloads.
#[derive(Debug, Clone)]
pub struct RootBuilder {
    record: RootRecord,
}

impl RootBuilder {
    /// Start a version 1 root expiring at `expires`.
    #[must_use]
    pub fn new(expires: DateTime<Utc>) -> Self {
        Self {
            record: RootRecord {
                kind: ROOT_ROLE.to_owned(),
                spec_version: SPEC_VERSION.to_owned(),
                consistent_snapshot: Some(false),
                version: 1,
                expires,
                keys: BTreeMap::new(),
                roles: BTreeMap::new(),
            },
        }
    }

    /// Set the document version.
    #[must_use]
    pub fn version(mut self, version: u64) -> Self {
        self.record.version = version;
        self
    }

    /// Authorize `keys` for the root role.
    #[must_use]
    pub fn root_keys(self, keys: &[&KeyPair], threshold: u64) -> Self {
        self.role(ROOT_ROLE, keys, threshold)
    }

    /// Authorize `keys` for the top-level targets role.
    #[must_use]
    pub fn targets_keys(self, keys: &[&KeyPair], threshold: u64) -> Self {
        self.role(TARGETS_ROLE, keys, threshold)
    }

    /// Authorize `keys` for an arbitrary role name.
    #[must_use]
    pub fn role(mut self, name: &str, keys: &[&KeyPair], threshold: u64) -> Self {
        self.record.keys.extend(records(keys));
        self.record
            .roles
            .insert(name.to_owned(), role(keys, threshold));
        self
    }

    /// Finish the payload.
    #[must_use]
    pub fn build(self) -> RootRecord {
        self.record
    }
}

/// Builder for one delegated role entry.
#[derive(Debug, Clone)]
pub struct DelegationBuilder {
    name: String,
    keys: Vec<KeyPair>,
    threshold: u64,
    terminating: bool,
    paths: Vec<String>,
}

impl DelegationBuilder {
    /// Start a non-terminating delegation to `name` with threshold 1.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            keys: Vec::new(),
            threshold: 1,
            terminating: false,
            paths: Vec::new(),
        }
    }

    /// Authorize `key` for the delegated role.
    #[must_use]
    pub fn key(mut self, key: &KeyPair) -> Self {
        self.keys.push(key.clone());
        self
    }

    /// Set the signature threshold.
    #[must_use]
    pub fn threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Mark the delegation terminating or not.
    #[must_use]
    pub fn terminating(mut self, terminating: bool) -> Self {
        self.terminating = terminating;
        self
    }

    /// Add a governed path pattern.
    #[must_use]
    pub fn path(mut self, pattern: &str) -> Self {
        self.paths.push(pattern.to_owned());
        self
    }
}

/// Builder for targets payloads, top-level or delegated.
#[derive(Debug, Clone)]
pub struct TargetsBuilder {
    version: u64,
    expires: DateTime<Utc>,
    targets: BTreeMap<String, TargetEntry>,
    delegations: Vec<DelegationBuilder>,
}

impl TargetsBuilder {
    /// Start a version 1 document expiring at `expires`.
    #[must_use]
    pub fn new(expires: DateTime<Utc>) -> Self {
        Self {
            version: 1,
            expires,
            targets: BTreeMap::new(),
            delegations: Vec::new(),
        }
    }

    /// Set the document version.
    #[must_use]
    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Add a target entry describing `content` under `path`.
    #[must_use]
    pub fn target(mut self, path: &str, content: &[u8]) -> Self {
        let mut hashes = BTreeMap::new();
        hashes.insert("sha256".to_owned(), hex::encode(Sha256::digest(content)));
        self.targets.insert(
            path.to_owned(),
            TargetEntry {
                length: content.len() as u64,
                hashes,
                custom: None,
            },
        );
        self
    }

    /// Append a delegation; order of calls is the consultation order.
    #[must_use]
    pub fn delegate(mut self, delegation: DelegationBuilder) -> Self {
        self.delegations.push(delegation);
        self
    }

    /// Finish the payload.
    ///
    /// # Errors
    ///
    /// Fails when a delegation declares a malformed path pattern.
    pub fn build(self) -> Result<TargetsRecord, ParseError> {
        let delegations = if self.delegations.is_empty() {
            None
        } else {
            let mut keys = BTreeMap::new();
            let mut roles = Vec::with_capacity(self.delegations.len());
            for delegation in self.delegations {
                let signers: Vec<&KeyPair> = delegation.keys.iter().collect();
                keys.extend(records(&signers));
                let role = role(&signers, delegation.threshold);
                roles.push(DelegatedRoleRecord {
                    name: delegation.name,
                    keyids: role.keyids,
                    threshold: role.threshold,
                    terminating: delegation.terminating,
                    paths: delegation
                        .paths
                        .iter()
                        .map(|pattern| PathPattern::parse(pattern))
                        .collect::<Result<_, _>>()?,
                });
            }
            Some(DelegationsRecord { keys, roles })
        };

        Ok(TargetsRecord {
            kind: TARGETS_ROLE.to_owned(),
            spec_version: SPEC_VERSION.to_owned(),
            version: self.version,
            expires: self.expires,
            targets: self.targets,
            delegations,
        })
    }
}
