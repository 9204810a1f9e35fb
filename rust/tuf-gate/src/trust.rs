//! Cryptographic admission of metadata documents.
//!
//! A document is admitted when enough distinct authorized keys signed its
//! canonical bytes, its version does not roll back, and it has not expired.
//! The verification instant is fixed when the [`TrustValidator`] is created.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroU64;

use chrono::{DateTime, Utc};
use tuf_gate_metadata::{
    Key, KeyId, ROOT_ROLE, Role, RootDocument, Signature, Signed, TARGETS_ROLE, TargetsDocument,
};

/// Why a document was refused admission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// Fewer valid distinct signatures than the role requires
    #[error("role `{role}` has {valid} valid signature(s) but requires {required}")]
    InsufficientSignatures {
        /// Role being admitted
        role: String,
        /// Threshold of the admitting authority
        required: u64,
        /// Distinct authorized keys whose signatures verified
        valid: u64,
    },

    /// The candidate is older than what is already trusted
    #[error("role `{role}` version {candidate} rolls back trusted version {trusted}")]
    VersionRollback {
        /// Role being admitted
        role: String,
        /// Currently trusted version
        trusted: u64,
        /// Version of the candidate
        candidate: u64,
    },

    /// The candidate's expiration is not after the verification instant
    #[error("role `{role}` expired at {expires}")]
    Expired {
        /// Role being admitted
        role: String,
        /// Declared expiration
        expires: DateTime<Utc>,
    },

    /// Signatures are present, but none names a key the role authorizes
    #[error("role `{role}` is only signed by keys it does not authorize")]
    UnknownKey {
        /// Role being admitted
        role: String,
    },
}

/// The keys and threshold a document must satisfy.
#[derive(Debug, Clone, Copy)]
pub struct Authority<'a> {
    /// Name of the role being admitted, used in rejections.
    pub role: &'a str,
    /// Key mapping the role's key ids resolve against.
    pub keys: &'a BTreeMap<KeyId, Key>,
    /// Authorized key ids and threshold.
    pub policy: &'a Role,
}

impl<'a> Authority<'a> {
    /// The top-level targets authority declared by `root`.
    pub fn targets(root: &'a RootDocument) -> Self {
        Self {
            role: TARGETS_ROLE,
            keys: root.keys(),
            policy: root.targets_role(),
        }
    }

    /// The root authority declared by `root`.
    pub fn root(root: &'a RootDocument) -> Self {
        Self {
            role: ROOT_ROLE,
            keys: root.keys(),
            policy: root.root_role(),
        }
    }

    /// Whether `signers` holds enough of this authority's keys.
    pub fn is_satisfied_by(&self, signers: &BTreeSet<KeyId>) -> bool {
        threshold_met(self.policy, signers)
    }

    /// Distinct authorized key ids whose signature over `message` verifies.
    ///
    /// A key that signed more than once is counted once.
    pub fn valid_signers(&self, message: &[u8], signatures: &[Signature]) -> BTreeSet<KeyId> {
        signatures
            .iter()
            .filter(|signature| self.policy.authorizes(&signature.key_id))
            .filter(|signature| {
                self.keys
                    .get(&signature.key_id)
                    .is_some_and(|key| key.verify(message, &signature.bytes))
            })
            .map(|signature| signature.key_id.clone())
            .collect()
    }

    fn check<T>(&self, candidate: &Signed<T>) -> Result<BTreeSet<KeyId>, Rejection> {
        let signers = self.valid_signers(&candidate.canonical, &candidate.signatures);
        let required = self.policy.threshold().get();
        if signers.len() as u64 >= required {
            return Ok(signers);
        }

        let attempted = candidate
            .signatures
            .iter()
            .any(|signature| self.policy.authorizes(&signature.key_id));
        if !candidate.signatures.is_empty() && !attempted {
            return Err(Rejection::UnknownKey {
                role: self.role.to_owned(),
            });
        }

        Err(Rejection::InsufficientSignatures {
            role: self.role.to_owned(),
            required,
            valid: signers.len() as u64,
        })
    }
}

/// Whether at least `policy.threshold()` of the policy's keys are in `signers`.
pub fn threshold_met(policy: &Role, signers: &BTreeSet<KeyId>) -> bool {
    let count = policy
        .key_ids()
        .iter()
        .filter(|key_id| signers.contains(*key_id))
        .count() as u64;
    count >= policy.threshold().get()
}

/// A document that passed admission.
#[derive(Debug, Clone)]
pub struct Trusted<T> {
    document: T,
    signers: BTreeSet<KeyId>,
    signatures: Vec<Signature>,
    canonical: Vec<u8>,
}

impl<T> Trusted<T> {
    fn admit(candidate: Signed<T>, signers: BTreeSet<KeyId>) -> Self {
        Self {
            document: candidate.document,
            signers,
            signatures: candidate.signatures,
            canonical: candidate.canonical,
        }
    }

    /// The admitted document.
    pub fn document(&self) -> &T {
        &self.document
    }

    /// Key ids whose signatures on this document verified.
    pub fn signers(&self) -> &BTreeSet<KeyId> {
        &self.signers
    }

    /// Canonical bytes the signatures cover.
    pub fn canonical(&self) -> &[u8] {
        &self.canonical
    }

    /// Verify the retained signatures against another authority and record
    /// any additional valid signers.
    pub fn extend_signers(&mut self, authority: &Authority<'_>) {
        let signers = authority.valid_signers(&self.canonical, &self.signatures);
        self.signers.extend(signers);
    }

    /// A copy whose signer set is rebuilt from `authorities` alone.
    ///
    /// Signers recorded under earlier authorities are dropped, so the copy
    /// only satisfies delegations the current keys still back.
    pub fn reverified<'a>(&self, authorities: impl IntoIterator<Item = Authority<'a>>) -> Self
    where
        T: Clone,
    {
        let mut copy = Self {
            document: self.document.clone(),
            signers: BTreeSet::new(),
            signatures: self.signatures.clone(),
            canonical: self.canonical.clone(),
        };
        for authority in authorities {
            copy.extend_signers(&authority);
        }
        copy
    }
}

/// Admits documents as of a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct TrustValidator {
    now: DateTime<Utc>,
}

impl TrustValidator {
    /// A validator that treats `now` as the current time.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Whether `expires` is strictly after the verification instant.
    pub fn is_fresh(&self, expires: DateTime<Utc>) -> bool {
        expires > self.now
    }

    /// Fails when `expires` is not strictly after the verification instant.
    pub fn check_expiry(&self, role: &str, expires: DateTime<Utc>) -> Result<(), Rejection> {
        if !self.is_fresh(expires) {
            return Err(Rejection::Expired {
                role: role.to_owned(),
                expires,
            });
        }
        Ok(())
    }

    /// Admit a root document.
    ///
    /// Without a `previous` root the candidate is trusted on its own
    /// signatures. Otherwise it must satisfy both the previous root role and
    /// its own, and carry a strictly greater version.
    pub fn admit_root(
        &self,
        candidate: Signed<RootDocument>,
        previous: Option<&RootDocument>,
    ) -> Result<Trusted<RootDocument>, Rejection> {
        let signers = match previous {
            Some(previous) => {
                let signers = Authority::root(previous).check(&candidate)?;
                Authority::root(&candidate.document).check(&candidate)?;

                let trusted = previous.version().get();
                let version = candidate.document.version().get();
                if version <= trusted {
                    return Err(Rejection::VersionRollback {
                        role: ROOT_ROLE.to_owned(),
                        trusted,
                        candidate: version,
                    });
                }
                signers
            }
            None => Authority::root(&candidate.document).check(&candidate)?,
        };

        self.check_expiry(ROOT_ROLE, candidate.document.expires())?;
        Ok(Trusted::admit(candidate, signers))
    }

    /// Admit a targets document, top-level or delegated, under `authority`.
    ///
    /// `previous_version` is the highest version of the same role trusted so
    /// far; the candidate may repeat it but not go below it.
    pub fn admit_targets(
        &self,
        candidate: Signed<TargetsDocument>,
        authority: &Authority<'_>,
        previous_version: Option<NonZeroU64>,
    ) -> Result<Trusted<TargetsDocument>, Rejection> {
        let signers = authority.check(&candidate)?;

        let version = candidate.document.version();
        if let Some(trusted) = previous_version
            && version < trusted
        {
            return Err(Rejection::VersionRollback {
                role: authority.role.to_owned(),
                trusted: trusted.get(),
                candidate: version.get(),
            });
        }

        self.check_expiry(authority.role, candidate.document.expires())?;
        Ok(Trusted::admit(candidate, signers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;
    use tuf_gate_metadata::{
        helpers::{KeyPair, RootBuilder, TargetsBuilder, expires_in, sign},
        parse_root, parse_targets,
    };

    fn key(seed: u8) -> KeyPair {
        KeyPair::from_seed([seed; 32])
    }

    fn root(
        version: u64,
        keys: &[&KeyPair],
        threshold: u64,
        signers: &[&KeyPair],
    ) -> TestResult<Signed<RootDocument>> {
        let record = RootBuilder::new(expires_in(Duration::days(30)))
            .version(version)
            .root_keys(keys, threshold)
            .targets_keys(keys, threshold)
            .build();
        Ok(parse_root(&sign(&record, signers)?)?)
    }

    fn validator() -> TrustValidator {
        TrustValidator::new(Utc::now())
    }

    #[test]
    fn it_bootstraps_a_root_on_its_own_signatures() -> TestResult {
        let a = key(1);
        let trusted = validator().admit_root(root(1, &[&a], 1, &[&a])?, None)?;

        assert_eq!(trusted.signers().len(), 1);
        assert!(trusted.signers().contains(a.id()));
        Ok(())
    }

    #[test]
    fn it_counts_a_repeated_signature_once() -> TestResult {
        let (a, b) = (key(1), key(2));
        let candidate = root(1, &[&a, &b], 2, &[&a, &a])?;

        assert_eq!(
            validator().admit_root(candidate, None).unwrap_err(),
            Rejection::InsufficientSignatures {
                role: ROOT_ROLE.into(),
                required: 2,
                valid: 1,
            }
        );
        Ok(())
    }

    #[test]
    fn it_reports_signatures_from_unauthorized_keys() -> TestResult {
        let (a, stranger) = (key(1), key(9));
        let candidate = root(1, &[&a], 1, &[&stranger])?;

        assert_eq!(
            validator().admit_root(candidate, None).unwrap_err(),
            Rejection::UnknownKey {
                role: ROOT_ROLE.into()
            }
        );
        Ok(())
    }

    #[test]
    fn it_reports_missing_signatures_as_insufficient() -> TestResult {
        let a = key(1);
        let candidate = root(1, &[&a], 1, &[])?;

        assert!(matches!(
            validator().admit_root(candidate, None),
            Err(Rejection::InsufficientSignatures { valid: 0, .. })
        ));
        Ok(())
    }

    #[test]
    fn it_ignores_a_signature_that_does_not_verify() -> TestResult {
        let a = key(1);
        let mut candidate = root(1, &[&a], 1, &[&a])?;
        candidate.signatures[0].bytes[0] ^= 0xff;

        assert!(matches!(
            validator().admit_root(candidate, None),
            Err(Rejection::InsufficientSignatures { valid: 0, .. })
        ));
        Ok(())
    }

    #[test]
    fn it_rotates_root_when_both_roots_sign() -> TestResult {
        let (old, new) = (key(1), key(2));
        let previous = validator().admit_root(root(1, &[&old], 1, &[&old])?, None)?;

        let rotated = root(2, &[&new], 1, &[&old, &new])?;
        let trusted = validator().admit_root(rotated, Some(previous.document()))?;
        assert_eq!(trusted.document().version().get(), 2);

        let unendorsed = root(3, &[&new], 1, &[&new])?;
        assert!(matches!(
            validator().admit_root(unendorsed, Some(previous.document())),
            Err(Rejection::UnknownKey { .. })
        ));
        Ok(())
    }

    #[test]
    fn it_requires_the_new_root_to_sign_its_own_rotation() -> TestResult {
        let (old, new) = (key(1), key(2));
        let previous = validator().admit_root(root(1, &[&old], 1, &[&old])?, None)?;
        let rotated = root(2, &[&new], 1, &[&old])?;

        assert!(matches!(
            validator().admit_root(rotated, Some(previous.document())),
            Err(Rejection::UnknownKey { .. })
        ));
        Ok(())
    }

    #[test]
    fn it_refuses_a_root_that_does_not_advance_the_version() -> TestResult {
        let a = key(1);
        let previous = validator().admit_root(root(2, &[&a], 1, &[&a])?, None)?;

        for version in [1, 2] {
            assert_eq!(
                validator()
                    .admit_root(root(version, &[&a], 1, &[&a])?, Some(previous.document()))
                    .unwrap_err(),
                Rejection::VersionRollback {
                    role: ROOT_ROLE.into(),
                    trusted: 2,
                    candidate: version,
                }
            );
        }
        Ok(())
    }

    #[test]
    fn it_treats_expiry_at_the_verification_instant_as_expired() -> TestResult {
        let a = key(1);
        let candidate = root(1, &[&a], 1, &[&a])?;
        let expires = candidate.document.expires();

        assert!(matches!(
            TrustValidator::new(expires).admit_root(candidate.clone(), None),
            Err(Rejection::Expired { .. })
        ));
        assert!(
            TrustValidator::new(expires - Duration::seconds(1))
                .admit_root(candidate, None)
                .is_ok()
        );
        Ok(())
    }

    #[test]
    fn it_admits_targets_at_or_above_the_trusted_version() -> TestResult {
        let a = key(1);
        let trusted_root = validator().admit_root(root(1, &[&a], 1, &[&a])?, None)?;
        let authority = Authority::targets(trusted_root.document());
        let targets = |version| -> TestResult<Signed<TargetsDocument>> {
            let record = TargetsBuilder::new(expires_in(Duration::days(1)))
                .version(version)
                .build()?;
            Ok(parse_targets(&sign(&record, &[&a])?)?)
        };

        let trusted = NonZeroU64::new(3);
        assert!(validator().admit_targets(targets(3)?, &authority, trusted).is_ok());
        assert!(validator().admit_targets(targets(4)?, &authority, trusted).is_ok());
        assert_eq!(
            validator()
                .admit_targets(targets(2)?, &authority, trusted)
                .unwrap_err(),
            Rejection::VersionRollback {
                role: TARGETS_ROLE.into(),
                trusted: 3,
                candidate: 2,
            }
        );
        Ok(())
    }

    #[test]
    fn it_records_signers_from_a_second_authority() -> TestResult {
        let (a, b) = (key(1), key(2));
        let first = validator().admit_root(root(1, &[&a], 1, &[&a])?, None)?;
        let second = root(1, &[&b], 1, &[&b])?.document;

        let record = TargetsBuilder::new(expires_in(Duration::days(1))).build()?;
        let candidate = parse_targets(&sign(&record, &[&a, &b])?)?;
        let mut trusted = validator().admit_targets(
            candidate,
            &Authority::targets(first.document()),
            None,
        )?;
        assert_eq!(trusted.signers().len(), 1);

        trusted.extend_signers(&Authority::targets(&second));
        assert!(trusted.signers().contains(b.id()));
        assert!(Authority::targets(&second).is_satisfied_by(trusted.signers()));

        let narrowed = trusted.reverified([Authority::targets(first.document())]);
        assert_eq!(narrowed.signers().len(), 1);
        assert!(narrowed.signers().contains(a.id()));
        assert!(!Authority::targets(&second).is_satisfied_by(narrowed.signers()));
        Ok(())
    }

    #[test]
    fn it_treats_metadata_as_fresh_strictly_before_expiry() {
        let now = Utc::now();
        let validator = TrustValidator::new(now);

        assert!(validator.is_fresh(now + Duration::seconds(1)));
        assert!(!validator.is_fresh(now));
        assert!(!validator.is_fresh(now - Duration::seconds(1)));
    }
}
