#![warn(missing_docs)]

//! Delegated path authorization over TUF targets metadata.
//!
//! An [`AuthorizationService`] holds one [`TrustedSnapshot`]: a root, a
//! top-level targets document, and any delegated targets documents, all
//! admitted by a [`TrustValidator`]. A path is allowed when a trusted
//! document reached by delegation resolution lists it.
//!
//! ```no_run
//! use tuf_gate::{AuthorizationService, MetadataBundle, ServiceConfig};
//!
//! # fn example(bundle: MetadataBundle) -> Result<(), Box<dyn std::error::Error>> {
//! let service = AuthorizationService::new(&bundle, ServiceConfig::default())?;
//! let decision = service.verify_path("/v2/library/nginx/manifests/latest")?;
//! println!("{decision}");
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::*;

pub mod matcher;

mod resolver;
pub use resolver::*;

mod service;
pub use service::*;

mod snapshot;
pub use snapshot::*;

pub mod trust;
pub use trust::{Authority, Rejection, TrustValidator, Trusted};
