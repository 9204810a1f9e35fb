//! Error types surfaced by the authorization service.
//!
//! Decisions and errors both map onto the status codes the HTTP front-end
//! returns: an allow is 200, a deny is 403, and any error is 500.

use chrono::{DateTime, Utc};
use tuf_gate_metadata::ParseError;

use crate::{Decision, Rejection};

/// A reload that left the current snapshot in force.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    /// A document could not be parsed
    #[error("failed to parse {document} metadata: {source}")]
    Parse {
        /// The offending document
        document: &'static str,
        /// Underlying parse failure
        #[source]
        source: ParseError,
    },

    /// A document parsed but was refused admission
    #[error("{document} metadata rejected: {source}")]
    Rejected {
        /// The offending document
        document: &'static str,
        /// Underlying trust failure
        #[source]
        source: Rejection,
    },
}

/// A query that could not be decided.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    /// Trusted metadata expired after it was admitted
    #[error("trusted {role} metadata expired at {expires}")]
    Expired {
        /// The expired role
        role: String,
        /// Its declared expiration
        expires: DateTime<Utc>,
    },

    /// The request could not be turned into a query, e.g. an original URI
    /// header that is not visible ASCII
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthorizationError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        500
    }
}

impl Decision {
    /// HTTP status code for this decision.
    pub fn status_code(&self) -> u16 {
        if self.is_allowed() { 200 } else { 403 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DenyReason;

    #[test]
    fn it_maps_outcomes_to_status_codes() {
        let allow = Decision::Allow {
            role: "targets".into(),
        };
        let deny = Decision::Deny {
            reason: DenyReason::NotDelegated,
        };

        assert_eq!(allow.status_code(), 200);
        assert_eq!(deny.status_code(), 403);
        assert_eq!(AuthorizationError::Internal("boom".into()).status_code(), 500);
    }
}
