//! The authorization service facade.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::{
    AuthorizationError, Decision, MetadataBundle, ReloadError, SkipReason, SkippedRole,
    TrustValidator, TrustedSnapshot,
    resolver::{DEFAULT_MAX_DEPTH, resolve},
};

/// Tunables for an [`AuthorizationService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Delegation depth explored before a path is denied.
    pub max_depth: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Summary of a successful reload.
#[derive(Debug)]
pub struct ReloadReport {
    /// Version of the root now in force
    pub root_version: u64,
    /// Version of the top-level targets now in force
    pub targets_version: u64,
    /// Versions of admitted delegated documents, by role
    pub delegated: BTreeMap<String, u64>,
    /// Delegated roles whose offered document was refused
    pub skipped: Vec<SkippedRole>,
}

impl ReloadReport {
    fn new(snapshot: &TrustedSnapshot, skipped: Vec<SkippedRole>) -> Self {
        Self {
            root_version: snapshot.root().version().get(),
            targets_version: snapshot.targets().version().get(),
            delegated: snapshot
                .delegated()
                .map(|(name, trusted)| (name.to_owned(), trusted.document().version().get()))
                .collect(),
            skipped,
        }
    }
}

/// Read-only dump of the snapshot in force.
///
/// This is a debugging aid. A path listed here is only granted when
/// resolution actually reaches the role that lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Every target path in every admitted document
    pub allowed_paths: Vec<String>,
    /// Declared patterns of every delegated role
    pub delegations: BTreeMap<String, Vec<String>>,
}

/// Answers path queries against the current [`TrustedSnapshot`].
///
/// Queries clone the current snapshot pointer and never block on a reload.
/// Reloads are serialized and publish a new snapshot in one assignment.
#[derive(Debug)]
pub struct AuthorizationService {
    current: RwLock<Arc<TrustedSnapshot>>,
    reloading: Mutex<()>,
    config: ServiceConfig,
}

impl AuthorizationService {
    /// Bootstrap a service from `bundle`, trusting its root on its own
    /// signatures.
    pub fn new(bundle: &MetadataBundle, config: ServiceConfig) -> Result<Self, ReloadError> {
        let (service, _) = Self::bootstrap(bundle, config, &TrustValidator::new(Utc::now()))?;
        Ok(service)
    }

    /// Bootstrap as of the validator's instant, returning the initial report.
    pub fn bootstrap(
        bundle: &MetadataBundle,
        config: ServiceConfig,
        validator: &TrustValidator,
    ) -> Result<(Self, ReloadReport), ReloadError> {
        let (snapshot, skipped) = TrustedSnapshot::build(bundle, None, validator)?;
        let report = ReloadReport::new(&snapshot, skipped);
        log_report("loaded", &report);

        let service = Self {
            current: RwLock::new(Arc::new(snapshot)),
            reloading: Mutex::new(()),
            config,
        };
        Ok((service, report))
    }

    /// The service configuration.
    pub fn config(&self) -> ServiceConfig {
        self.config
    }

    /// The snapshot in force.
    pub fn snapshot(&self) -> Arc<TrustedSnapshot> {
        self.current.read().clone()
    }

    /// Decide whether `path` is granted. A missing leading `/` is added.
    pub fn verify_path(&self, path: &str) -> Result<Decision, AuthorizationError> {
        self.verify_path_at(path, Utc::now())
    }

    /// [`Self::verify_path`] as of `now`.
    pub fn verify_path_at(
        &self,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<Decision, AuthorizationError> {
        let snapshot = self.snapshot();
        let validator = TrustValidator::new(now);
        snapshot
            .check_freshness(&validator)
            .inspect_err(|error| tracing::error!(%error, "trusted metadata is stale"))?;

        Ok(resolve(
            &snapshot,
            &normalize(path),
            self.config.max_depth,
            &validator,
        ))
    }

    /// Sorted, de-duplicated target paths of every admitted document.
    pub fn allowed_paths(&self) -> Vec<String> {
        let snapshot = self.snapshot();
        let paths: BTreeSet<&String> = snapshot
            .targets()
            .targets()
            .keys()
            .chain(
                snapshot
                    .delegated()
                    .flat_map(|(_, trusted)| trusted.document().targets().keys()),
            )
            .collect();
        paths.into_iter().cloned().collect()
    }

    /// Declared patterns of every delegated role, as strings.
    ///
    /// Covers roles declared by the top-level document and by any admitted
    /// delegated document. A role declared by several parents is listed with
    /// the first declaration found.
    pub fn delegations(&self) -> BTreeMap<String, Vec<String>> {
        let snapshot = self.snapshot();
        let mut delegations = BTreeMap::new();
        let sets = snapshot.targets().delegations().into_iter().chain(
            snapshot
                .delegated()
                .filter_map(|(_, trusted)| trusted.document().delegations()),
        );
        for set in sets {
            for role in set.roles() {
                delegations
                    .entry(role.name().to_owned())
                    .or_insert_with(|| role.paths().iter().map(ToString::to_string).collect());
            }
        }
        delegations
    }

    /// Both introspection views together.
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            allowed_paths: self.allowed_paths(),
            delegations: self.delegations(),
        }
    }

    /// Replace the snapshot with one built from `bundle`.
    ///
    /// On error the snapshot in force is kept.
    pub fn reload(&self, bundle: &MetadataBundle) -> Result<ReloadReport, ReloadError> {
        self.reload_with(bundle, &TrustValidator::new(Utc::now()))
    }

    /// [`Self::reload`] as of the validator's instant.
    pub fn reload_with(
        &self,
        bundle: &MetadataBundle,
        validator: &TrustValidator,
    ) -> Result<ReloadReport, ReloadError> {
        let _guard = self.reloading.lock();
        let previous = self.snapshot();

        let (snapshot, skipped) = TrustedSnapshot::build(bundle, Some(&previous), validator)
            .inspect_err(|error| tracing::warn!(%error, "reload rejected"))?;
        let report = ReloadReport::new(&snapshot, skipped);

        *self.current.write() = Arc::new(snapshot);
        log_report("reloaded", &report);
        Ok(report)
    }
}

fn normalize(path: &str) -> Cow<'_, str> {
    if path.starts_with('/') {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(format!("/{path}"))
    }
}

fn log_report(action: &str, report: &ReloadReport) {
    tracing::info!(
        root_version = report.root_version,
        targets_version = report.targets_version,
        delegated = report.delegated.len(),
        skipped = report.skipped.len(),
        "{action} trusted metadata"
    );
    for skipped in &report.skipped {
        match skipped.reason {
            SkipReason::Missing => {
                tracing::debug!(role = %skipped.role, "no metadata for delegated role")
            }
            _ => tracing::warn!(
                role = %skipped.role,
                reason = %skipped.reason,
                retained = ?skipped.retained,
                "refused delegated metadata"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_prefixes_a_missing_leading_slash() {
        assert_eq!(normalize("v2/library"), "/v2/library");
        assert_eq!(normalize("/v2/library"), "/v2/library");
        assert_eq!(normalize(""), "/");
    }
}
