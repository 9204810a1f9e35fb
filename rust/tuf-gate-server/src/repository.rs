//! Metadata repositories on the local filesystem.
//!
//! A repository directory holds `root.json`, `targets.json`, and one
//! `<role>.json` per delegated role. `snapshot.json` and `timestamp.json` are
//! ignored. Any other `.json` file is offered to the core as a delegated role
//! named after its file stem; roles nothing delegates to are never admitted.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tuf_gate::MetadataBundle;

pub const ROOT_FILE: &str = "root.json";
pub const TARGETS_FILE: &str = "targets.json";

const IGNORED_FILES: [&str; 2] = ["snapshot.json", "timestamp.json"];
const EXTENSION: &str = "json";

#[derive(Debug, thiserror::Error)]
#[error("failed to {action} {}: {source}", path.display())]
pub struct RepositoryError {
    action: &'static str,
    path: PathBuf,
    #[source]
    source: io::Error,
}

impl RepositoryError {
    fn new(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> Self {
        let path = path.to_owned();
        move |source| Self {
            action,
            path,
            source,
        }
    }
}

/// Read every metadata document in `directory`.
pub fn load(directory: &Path) -> Result<MetadataBundle, RepositoryError> {
    let read = |name: &str| {
        let path = directory.join(name);
        fs::read(&path).map_err(RepositoryError::new("read", &path))
    };
    let mut bundle = MetadataBundle {
        root: read(ROOT_FILE)?,
        targets: read(TARGETS_FILE)?,
        ..MetadataBundle::default()
    };

    let entries = fs::read_dir(directory).map_err(RepositoryError::new("list", directory))?;
    for entry in entries {
        let path = entry.map_err(RepositoryError::new("list", directory))?.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !path.is_file()
            || path.extension().and_then(|extension| extension.to_str()) != Some(EXTENSION)
            || [ROOT_FILE, TARGETS_FILE].contains(&name)
            || IGNORED_FILES.contains(&name)
        {
            continue;
        }
        let Some(role) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let bytes = fs::read(&path).map_err(RepositoryError::new("read", &path))?;
        bundle.delegated.insert(role.to_owned(), bytes);
    }

    tracing::debug!(
        directory = %directory.display(),
        delegated = bundle.delegated.len(),
        "read metadata repository"
    );
    Ok(bundle)
}

/// Write `bundle` into `directory` in the layout [`load`] reads.
pub fn store(directory: &Path, bundle: &MetadataBundle) -> Result<(), RepositoryError> {
    fs::create_dir_all(directory).map_err(RepositoryError::new("create", directory))?;

    let documents = [(ROOT_FILE.to_owned(), &bundle.root), (TARGETS_FILE.to_owned(), &bundle.targets)]
        .into_iter()
        .chain(
            bundle
                .delegated
                .iter()
                .map(|(role, bytes)| (format!("{role}.{EXTENSION}"), bytes)),
        );
    for (name, bytes) in documents {
        let path = directory.join(name);
        fs::write(&path, bytes).map_err(RepositoryError::new("write", &path))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    #[test]
    fn it_loads_delegated_roles_by_file_stem() -> TestResult {
        let directory = tempfile::tempdir()?;
        let bundle = MetadataBundle {
            root: b"root".to_vec(),
            targets: b"targets".to_vec(),
            delegated: [("registry-library".to_owned(), b"library".to_vec())].into(),
        };
        store(directory.path(), &bundle)?;
        fs::write(directory.path().join("snapshot.json"), b"snapshot")?;
        fs::write(directory.path().join("notes.txt"), b"notes")?;
        fs::create_dir(directory.path().join("targets"))?;

        let loaded = load(directory.path())?;
        assert_eq!(loaded.root, b"root");
        assert_eq!(loaded.targets, b"targets");
        assert_eq!(
            loaded.delegated.keys().collect::<Vec<_>>(),
            ["registry-library"]
        );
        Ok(())
    }

    #[test]
    fn it_names_the_missing_file() -> TestResult {
        let directory = tempfile::tempdir()?;
        fs::write(directory.path().join(ROOT_FILE), b"root")?;

        let error = load(directory.path()).unwrap_err();
        assert!(error.to_string().contains(TARGETS_FILE));
        Ok(())
    }
}
