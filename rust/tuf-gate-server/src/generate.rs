//! Sample repository generation.
//!
//! Produces a freshly keyed repository whose top-level targets document is
//! empty and delegates `/v2/library/*` to a terminating `registry-library`
//! role listing a few image manifests.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use chrono::{Duration, SecondsFormat, Utc};
use tuf_gate::MetadataBundle;
use tuf_gate_metadata::helpers::{
    DelegationBuilder, KeyPair, RootBuilder, TargetsBuilder, expires_in, sign,
};

use crate::repository;

/// Name of the delegated role.
pub const REGISTRY_LIBRARY: &str = "registry-library";

/// Paths delegated to [`REGISTRY_LIBRARY`].
pub const LIBRARY_PATTERN: &str = "/v2/library/*";

/// Paths listed by [`REGISTRY_LIBRARY`].
pub const LIBRARY_TARGETS: [&str; 3] = [
    "/v2/library/alpine/manifests/latest",
    "/v2/library/ubuntu/manifests/20.04",
    "/v2/library/nginx/manifests/latest",
];

const TARGETS_DIRECTORY: &str = "targets";

/// Signed metadata plus the target files it describes.
#[derive(Debug, Clone)]
pub struct SampleRepository {
    /// Signed metadata documents
    pub metadata: MetadataBundle,
    /// Target file contents by file name
    pub files: BTreeMap<String, Vec<u8>>,
}

impl SampleRepository {
    /// Generate keys and sign every document.
    pub fn generate() -> anyhow::Result<Self> {
        let root_key = KeyPair::generate().context("failed to generate root key")?;
        let targets_key = KeyPair::generate().context("failed to generate targets key")?;
        let snapshot_key = KeyPair::generate().context("failed to generate snapshot key")?;
        let timestamp_key = KeyPair::generate().context("failed to generate timestamp key")?;
        let library_key = KeyPair::generate().context("failed to generate delegated key")?;

        let root = RootBuilder::new(expires_in(Duration::days(365)))
            .root_keys(&[&root_key], 1)
            .targets_keys(&[&targets_key], 1)
            .role("snapshot", &[&snapshot_key], 1)
            .role("timestamp", &[&timestamp_key], 1)
            .build();

        let targets = TargetsBuilder::new(expires_in(Duration::days(30)))
            .delegate(
                DelegationBuilder::new(REGISTRY_LIBRARY)
                    .key(&library_key)
                    .terminating(true)
                    .path(LIBRARY_PATTERN),
            )
            .build()?;

        let created = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut files = BTreeMap::new();
        let mut library = TargetsBuilder::new(expires_in(Duration::days(30)));
        for path in LIBRARY_TARGETS {
            let content = serde_json::to_vec(&serde_json::json!({
                "path": path,
                "created": created,
            }))?;
            library = library.target(path, &content);
            files.insert(file_name(path), content);
        }

        let metadata = MetadataBundle {
            root: sign(&root, &[&root_key])?,
            targets: sign(&targets, &[&targets_key])?,
            delegated: BTreeMap::from([(
                REGISTRY_LIBRARY.to_owned(),
                sign(&library.build()?, &[&library_key])?,
            )]),
        };
        Ok(Self { metadata, files })
    }

    /// Write metadata into `directory` and target files into its `targets`
    /// subdirectory.
    pub fn store(&self, directory: &Path) -> anyhow::Result<()> {
        repository::store(directory, &self.metadata)?;

        let targets = directory.join(TARGETS_DIRECTORY);
        std::fs::create_dir_all(&targets)
            .with_context(|| format!("failed to create {}", targets.display()))?;
        for (name, content) in &self.files {
            let path = targets.join(name);
            std::fs::write(&path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        Ok(())
    }
}

fn file_name(path: &str) -> String {
    format!("{}.json", path.trim_start_matches('/').replace('/', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;
    use tuf_gate::{AuthorizationService, ServiceConfig};

    #[test]
    fn it_generates_a_repository_the_service_admits() -> TestResult {
        let sample = SampleRepository::generate()?;
        let service = AuthorizationService::new(&sample.metadata, ServiceConfig::default())?;

        for path in LIBRARY_TARGETS {
            assert!(service.verify_path(path)?.is_allowed());
        }
        assert!(!service.verify_path("/v2/library/redis/manifests/latest")?.is_allowed());
        assert_eq!(sample.files.len(), LIBRARY_TARGETS.len());
        Ok(())
    }

    #[test]
    fn it_names_target_files_after_their_path() {
        assert_eq!(
            file_name("/v2/library/ubuntu/manifests/20.04"),
            "v2-library-ubuntu-manifests-20.04.json"
        );
    }
}
