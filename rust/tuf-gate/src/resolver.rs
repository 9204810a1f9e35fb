//! Delegation resolution.
//!
//! Resolution is a depth-first, order-sensitive walk over the delegation
//! graph. Each matching role either lets the walk continue with its
//! siblings, or stops it with a final [`Decision`]. A terminating role that
//! matched always stops the walk, whether or not it granted the path.
//!
//! A delegated document that has expired by the time of the query counts as
//! absent, like one that was never admitted.

use std::fmt;

use tuf_gate_metadata::{DelegatedRole, DelegationSet, TARGETS_ROLE};

use crate::{TrustValidator, TrustedSnapshot, matcher::matches_any};

/// Delegation depth explored before a path is denied.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Outcome of resolving one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// A trusted document lists the path.
    Allow {
        /// Role whose document lists the path
        role: String,
    },
    /// No trusted document reachable for the path lists it.
    Deny {
        /// Why resolution ended without a grant
        reason: DenyReason,
    },
}

impl Decision {
    /// Whether access is granted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow { role } => write!(f, "allow:{role}"),
            Self::Deny { reason } => write!(f, "deny:{reason}"),
        }
    }
}

/// Why a path was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// No delegation granted the path and none terminated the walk.
    NotDelegated,
    /// A terminating role matched the path without granting it.
    Terminated {
        /// The terminating role
        role: String,
    },
    /// The delegation chain went deeper than allowed.
    DepthExceeded {
        /// First role beyond the limit
        role: String,
        /// The configured limit
        depth: usize,
    },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDelegated => f.write_str("not-delegated"),
            Self::Terminated { role } => write!(f, "terminated:{role}"),
            Self::DepthExceeded { role, .. } => write!(f, "depth-exceeded:{role}"),
        }
    }
}

enum Walk {
    Continue,
    Stop(Decision),
}

/// Decide whether `path` is granted by `snapshot` as of the validator's
/// instant.
///
/// Top-level target entries always win. Otherwise delegations are consulted
/// in declared order, descending at most `max_depth` levels.
pub fn resolve(
    snapshot: &TrustedSnapshot,
    path: &str,
    max_depth: usize,
    validator: &TrustValidator,
) -> Decision {
    let targets = snapshot.targets();
    let decision = if targets.contains(path) {
        Decision::Allow {
            role: TARGETS_ROLE.to_owned(),
        }
    } else {
        let resolver = Resolver {
            snapshot,
            path,
            max_depth,
            validator,
        };
        match targets.delegations().map(|set| resolver.walk(set, 1)) {
            Some(Walk::Stop(decision)) => decision,
            Some(Walk::Continue) | None => Decision::Deny {
                reason: DenyReason::NotDelegated,
            },
        }
    };

    tracing::debug!(path, %decision, "resolved path");
    decision
}

struct Resolver<'a> {
    snapshot: &'a TrustedSnapshot,
    path: &'a str,
    max_depth: usize,
    validator: &'a TrustValidator,
}

impl Resolver<'_> {
    fn walk(&self, set: &DelegationSet, depth: usize) -> Walk {
        for delegation in set.roles() {
            if !matches_any(self.path, delegation.paths()) {
                continue;
            }
            if let Walk::Stop(decision) = self.visit(delegation, depth) {
                return Walk::Stop(decision);
            }
            if delegation.terminating() {
                return Walk::Stop(Decision::Deny {
                    reason: DenyReason::Terminated {
                        role: delegation.name().to_owned(),
                    },
                });
            }
        }
        Walk::Continue
    }

    fn visit(&self, delegation: &DelegatedRole, depth: usize) -> Walk {
        if depth > self.max_depth {
            tracing::warn!(
                path = self.path,
                role = delegation.name(),
                max_depth = self.max_depth,
                "delegation depth exceeded"
            );
            return Walk::Stop(Decision::Deny {
                reason: DenyReason::DepthExceeded {
                    role: delegation.name().to_owned(),
                    depth: self.max_depth,
                },
            });
        }

        // A role without a live document trusted under this delegation
        // contributes nothing but still counts as matched.
        let Some(document) = self.snapshot.document_for(delegation) else {
            return Walk::Continue;
        };
        if !self.validator.is_fresh(document.expires()) {
            tracing::warn!(
                path = self.path,
                role = delegation.name(),
                expires = %document.expires(),
                "delegated metadata expired"
            );
            return Walk::Continue;
        }
        if document.contains(self.path) {
            return Walk::Stop(Decision::Allow {
                role: delegation.name().to_owned(),
            });
        }
        match document.delegations() {
            Some(children) => self.walk(children, depth + 1),
            None => Walk::Continue,
        }
    }
}
