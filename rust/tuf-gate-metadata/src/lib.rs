#![warn(missing_docs)]

//! Typed TUF metadata.
//!
//! This crate turns raw metadata envelopes into strongly typed documents and
//! rejects structurally invalid input before any trust decision is made:
//!
//! - [`parse_root`] produces a [`RootDocument`] naming the keys and thresholds
//!   of the top-level roles.
//! - [`parse_targets`] produces a [`TargetsDocument`] (top-level or
//!   delegated) with its target entries and an optional [`DelegationSet`].
//!
//! Both return a [`Signed`] wrapper holding the detached signatures and the
//! canonical bytes they cover. Verifying those signatures is left to the
//! caller; see the `tuf-gate` crate.
//!
//! Unknown fields, missing fields, invalid thresholds, unresolved key ids,
//! key ids that are not derived from their key, and malformed delegation path
//! patterns are all parse errors.

pub mod canonical;

mod envelope;
pub use envelope::*;

mod error;
pub use error::*;

mod key;
pub use key::{Key, KeyId, KeyRecord, KeyScheme, KeyValue};

mod pattern;
pub use pattern::*;

mod role;
pub use role::*;

mod root;
pub use root::*;

mod targets;
pub use targets::*;

pub mod helpers;
