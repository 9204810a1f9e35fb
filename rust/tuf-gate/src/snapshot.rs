//! Immutable sets of admitted metadata.
//!
//! A [`TrustedSnapshot`] is built in one pass from a [`MetadataBundle`] and
//! never mutated afterwards. Failures of `root` or `targets` abort the build.
//! A delegated document that cannot be admitted is reported, and the role
//! keeps its previously trusted document when that one is still valid.
//! Otherwise the role is left out, which makes its paths unreachable rather
//! than the whole snapshot.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::num::NonZeroU64;

use tuf_gate_metadata::{
    DelegatedRole, DelegationSet, ParseError, ROOT_ROLE, RootDocument, TARGETS_ROLE,
    TargetsDocument, parse_root, parse_targets,
};

use crate::{
    AuthorizationError, ReloadError,
    trust::{Authority, Rejection, TrustValidator, Trusted, threshold_met},
};

/// Raw metadata documents offered for admission.
#[derive(Debug, Clone, Default)]
pub struct MetadataBundle {
    /// Envelope bytes of `root.json`.
    pub root: Vec<u8>,
    /// Envelope bytes of the top-level `targets.json`.
    pub targets: Vec<u8>,
    /// Envelope bytes of each delegated role, by role name.
    pub delegated: BTreeMap<String, Vec<u8>>,
}

/// Why a delegated role has no document in a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SkipReason {
    /// The bundle had no document for a declared role
    #[error("no metadata supplied")]
    Missing,
    /// The document could not be parsed
    #[error("{0}")]
    Parse(ParseError),
    /// No delegating role admitted the document
    #[error("{0}")]
    Rejected(Rejection),
}

/// A delegated role whose offered document was not admitted.
#[derive(Debug)]
pub struct SkippedRole {
    /// Role name
    pub role: String,
    /// Why the offered document was refused
    pub reason: SkipReason,
    /// Version of the previously trusted document kept in its place
    pub retained: Option<u64>,
}

impl fmt::Display for SkippedRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.reason)?;
        if let Some(version) = self.retained {
            write!(f, " (keeping version {version})")?;
        }
        Ok(())
    }
}

/// Admitted root, top-level targets, and delegated targets documents.
#[derive(Debug, Clone)]
pub struct TrustedSnapshot {
    root: Trusted<RootDocument>,
    targets: Trusted<TargetsDocument>,
    delegated: BTreeMap<String, Trusted<TargetsDocument>>,
    /// Highest version ever trusted per delegated role, carried from one
    /// snapshot to the next.
    floors: BTreeMap<String, NonZeroU64>,
}

impl TrustedSnapshot {
    /// Admit every document in `bundle`.
    ///
    /// `previous` is the snapshot currently in force, if any. Its root is the
    /// trust anchor for the new root, and its versions are the floor for
    /// rollback checks. A root byte-identical to the trusted one is kept
    /// as is. A delegated role whose new document is refused keeps the
    /// previous document if it is unexpired and still backed by a parent.
    pub fn build(
        bundle: &MetadataBundle,
        previous: Option<&TrustedSnapshot>,
        validator: &TrustValidator,
    ) -> Result<(Self, Vec<SkippedRole>), ReloadError> {
        let root = admit_root(bundle, previous, validator)?;

        let candidate = parse_targets(&bundle.targets).map_err(|source| ReloadError::Parse {
            document: TARGETS_ROLE,
            source,
        })?;
        let targets = validator
            .admit_targets(
                candidate,
                &Authority::targets(root.document()),
                previous.map(|snapshot| snapshot.targets().version()),
            )
            .map_err(|source| ReloadError::Rejected {
                document: TARGETS_ROLE,
                source,
            })?;

        let mut admission = Admission {
            bundle,
            previous,
            validator,
            delegated: BTreeMap::new(),
            failures: BTreeMap::new(),
        };
        admission.run(targets.document().delegations());
        let Admission {
            delegated,
            failures,
            ..
        } = admission;

        let mut floors = previous
            .map(|snapshot| snapshot.floors.clone())
            .unwrap_or_default();
        for (name, trusted) in &delegated {
            let version = trusted.document().version();
            floors
                .entry(name.clone())
                .and_modify(|floor| *floor = (*floor).max(version))
                .or_insert(version);
        }

        let skipped = failures
            .into_iter()
            .map(|(role, failure)| SkippedRole {
                role,
                reason: failure.reason,
                retained: failure.retained,
            })
            .collect();
        let snapshot = Self {
            root,
            targets,
            delegated,
            floors,
        };
        Ok((snapshot, skipped))
    }

    /// The admitted root document.
    pub fn root(&self) -> &RootDocument {
        self.root.document()
    }

    /// The admitted top-level targets document.
    pub fn targets(&self) -> &TargetsDocument {
        self.targets.document()
    }

    /// Admitted delegated documents by role name.
    pub fn delegated(&self) -> impl Iterator<Item = (&str, &Trusted<TargetsDocument>)> {
        self.delegated
            .iter()
            .map(|(name, trusted)| (name.as_str(), trusted))
    }

    /// The document for `delegation`, if one was admitted and enough of the
    /// delegation's own keys signed it.
    pub fn document_for(&self, delegation: &DelegatedRole) -> Option<&TargetsDocument> {
        self.delegated
            .get(delegation.name())
            .filter(|trusted| threshold_met(delegation.role(), trusted.signers()))
            .map(Trusted::document)
    }

    /// Highest version of `role` trusted by this snapshot or any it replaced.
    pub fn version_floor(&self, role: &str) -> Option<NonZeroU64> {
        self.floors.get(role).copied()
    }

    /// Fails when the root or top-level targets document has expired as of
    /// the validator's instant.
    ///
    /// Delegated documents are not checked here: resolution treats an
    /// expired one as absent.
    pub fn check_freshness(&self, validator: &TrustValidator) -> Result<(), AuthorizationError> {
        let top = [
            (ROOT_ROLE, self.root().expires()),
            (TARGETS_ROLE, self.targets().expires()),
        ];
        match top
            .into_iter()
            .find(|(_, expires)| !validator.is_fresh(*expires))
        {
            Some((role, expires)) => Err(AuthorizationError::Expired {
                role: role.to_owned(),
                expires,
            }),
            None => Ok(()),
        }
    }
}

fn admit_root(
    bundle: &MetadataBundle,
    previous: Option<&TrustedSnapshot>,
    validator: &TrustValidator,
) -> Result<Trusted<RootDocument>, ReloadError> {
    let rejected = |source| ReloadError::Rejected {
        document: ROOT_ROLE,
        source,
    };
    let candidate = parse_root(&bundle.root).map_err(|source| ReloadError::Parse {
        document: ROOT_ROLE,
        source,
    })?;

    match previous.map(|snapshot| &snapshot.root) {
        Some(current) if current.canonical() == candidate.canonical.as_slice() => {
            validator
                .check_expiry(ROOT_ROLE, current.document().expires())
                .map_err(rejected)?;
            Ok(current.clone())
        }
        current => validator
            .admit_root(candidate, current.map(Trusted::document))
            .map_err(rejected),
    }
}

struct Admission<'a> {
    bundle: &'a MetadataBundle,
    previous: Option<&'a TrustedSnapshot>,
    validator: &'a TrustValidator,
    delegated: BTreeMap<String, Trusted<TargetsDocument>>,
    failures: BTreeMap<String, Failure>,
}

/// A role none of whose parents admitted the offered document.
struct Failure {
    reason: SkipReason,
    parents: Vec<DelegationSet>,
    retained: Option<u64>,
}

impl Admission<'_> {
    /// Admit every role reachable from `top`, breadth first.
    ///
    /// Each role name is admitted at most once. When the name is reached again
    /// through another parent, its signatures are checked against that
    /// parent's keys as well, so [`TrustedSnapshot::document_for`] can tell
    /// which delegations the document satisfies.
    ///
    /// Once the queue drains, refused roles fall back to their previous
    /// documents and the delegations those declare are explored in turn.
    fn run(&mut self, top: Option<&DelegationSet>) {
        let mut pending: VecDeque<DelegationSet> = top.cloned().into_iter().collect();

        loop {
            while let Some(set) = pending.pop_front() {
                for delegation in set.roles() {
                    let name = delegation.name();
                    let authority = Authority {
                        role: name,
                        keys: set.keys(),
                        policy: delegation.role(),
                    };

                    if let Some(trusted) = self.delegated.get_mut(name) {
                        trusted.extend_signers(&authority);
                        continue;
                    }

                    match self.admit(name, &authority) {
                        Ok(trusted) => {
                            self.failures.remove(name);
                            if let Some(children) = trusted.document().delegations() {
                                pending.push_back(children.clone());
                            }
                            self.delegated.insert(name.to_owned(), trusted);
                        }
                        Err(reason) => {
                            let failure =
                                self.failures.entry(name.to_owned()).or_insert_with(|| Failure {
                                    reason: SkipReason::Missing,
                                    parents: Vec::new(),
                                    retained: None,
                                });
                            failure.reason = reason;
                            failure.parents.push(set.clone());
                        }
                    }
                }
            }

            let children = self.retain_previous();
            if children.is_empty() {
                break;
            }
            pending.extend(children);
        }
    }

    fn admit(
        &self,
        name: &str,
        authority: &Authority<'_>,
    ) -> Result<Trusted<TargetsDocument>, SkipReason> {
        let bytes = self.bundle.delegated.get(name).ok_or(SkipReason::Missing)?;
        let candidate = parse_targets(bytes).map_err(SkipReason::Parse)?;
        let floor = self
            .previous
            .and_then(|snapshot| snapshot.version_floor(name));

        self.validator
            .admit_targets(candidate, authority, floor)
            .map_err(SkipReason::Rejected)
    }

    /// Put back the previous document of every refused role, returning the
    /// delegations the retained documents declare.
    ///
    /// A role whose document is simply missing is not retained. A previous
    /// document must be unexpired and meet the threshold of at least one
    /// parent that reached the role in this build.
    fn retain_previous(&mut self) -> Vec<DelegationSet> {
        let Some(previous) = self.previous else {
            return Vec::new();
        };

        let mut children = Vec::new();
        for (name, failure) in &mut self.failures {
            if failure.retained.is_some() || matches!(failure.reason, SkipReason::Missing) {
                continue;
            }
            let Some(prior) = previous.delegated.get(name) else {
                continue;
            };
            if !self.validator.is_fresh(prior.document().expires()) {
                continue;
            }

            let authorities: Vec<Authority<'_>> = failure
                .parents
                .iter()
                .filter_map(|set| {
                    let delegation = set
                        .roles()
                        .iter()
                        .find(|role| role.name() == name.as_str())?;
                    Some(Authority {
                        role: name.as_str(),
                        keys: set.keys(),
                        policy: delegation.role(),
                    })
                })
                .collect();
            let kept = prior.reverified(authorities.iter().copied());
            if !authorities
                .iter()
                .any(|authority| authority.is_satisfied_by(kept.signers()))
            {
                continue;
            }

            failure.retained = Some(kept.document().version().get());
            if let Some(set) = kept.document().delegations() {
                children.push(set.clone());
            }
            self.delegated.insert(name.clone(), kept);
        }
        children
    }
}
