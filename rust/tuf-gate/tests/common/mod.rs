//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use testresult::TestResult;
use tuf_gate::{AuthorizationService, MetadataBundle, ServiceConfig};
use tuf_gate_metadata::helpers::{
    DelegationBuilder, KeyPair, RootBuilder, TargetsBuilder, expires_in, sign,
};

pub const REGISTRY_LIBRARY: &str = "registry-library";
pub const ALPINE: &str = "/v2/library/alpine/manifests/latest";
pub const REDIS: &str = "/v2/library/redis/manifests/latest";

/// No delegated documents.
pub const NONE: [(&str, Vec<u8>); 0] = [];

pub fn key(seed: u8) -> KeyPair {
    KeyPair::from_seed([seed; 32])
}

/// One expiry for the whole test binary, so rebuilt documents are
/// byte-identical.
static EXPIRES: LazyLock<DateTime<Utc>> = LazyLock::new(|| expires_in(Duration::days(30)));

pub fn expires() -> DateTime<Utc> {
    *EXPIRES
}

/// Keys of a repository whose root and top-level targets roles each have a
/// single key.
pub struct Keys {
    pub root: KeyPair,
    pub targets: KeyPair,
}

impl Default for Keys {
    fn default() -> Self {
        Self {
            root: key(1),
            targets: key(2),
        }
    }
}

impl Keys {
    pub fn root(&self, version: u64) -> TestResult<Vec<u8>> {
        let record = RootBuilder::new(expires())
            .version(version)
            .root_keys(&[&self.root], 1)
            .targets_keys(&[&self.targets], 1)
            .build();
        Ok(sign(&record, &[&self.root])?)
    }

    pub fn targets(&self, builder: TargetsBuilder) -> TestResult<Vec<u8>> {
        Ok(sign(&builder.build()?, &[&self.targets])?)
    }
}

/// Sign a delegated document with `signers`.
pub fn delegated(builder: TargetsBuilder, signers: &[&KeyPair]) -> TestResult<Vec<u8>> {
    Ok(sign(&builder.build()?, signers)?)
}

pub fn bundle<'a>(
    root: Vec<u8>,
    targets: Vec<u8>,
    delegated: impl IntoIterator<Item = (&'a str, Vec<u8>)>,
) -> MetadataBundle {
    MetadataBundle {
        root,
        targets,
        delegated: delegated
            .into_iter()
            .map(|(name, bytes)| (name.to_owned(), bytes))
            .collect(),
    }
}

/// The registry repository: an empty top-level targets document with one
/// terminating `registry-library` delegation listing the alpine manifest.
pub fn registry(keys: &Keys, library: &KeyPair, version: u64) -> TestResult<MetadataBundle> {
    let targets = keys.targets(
        TargetsBuilder::new(expires()).delegate(
            DelegationBuilder::new(REGISTRY_LIBRARY)
                .key(library)
                .terminating(true)
                .path("/v2/library/*"),
        ),
    )?;
    let library_doc = delegated(
        TargetsBuilder::new(expires())
            .version(version)
            .target(ALPINE, b"alpine"),
        &[library],
    )?;
    Ok(bundle(
        keys.root(1)?,
        targets,
        [(REGISTRY_LIBRARY, library_doc)],
    ))
}

pub fn service(bundle: &MetadataBundle) -> TestResult<AuthorizationService> {
    Ok(AuthorizationService::new(bundle, ServiceConfig::default())?)
}
