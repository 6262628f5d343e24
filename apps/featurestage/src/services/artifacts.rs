//! # Filesystem Artifact Store
//!
//! Versioned artifacts on the local filesystem with a redb catalog.
//!
//! ## Layout
//!
//! ```text
//! <root>/catalog.redb
//! <root>/<name>/v1/<file>
//! <root>/<name>/v2/<file>
//! ```
//!
//! Versions are append-only: logging an artifact always creates version
//! `latest + 1` and never touches an existing directory. The kind recorded
//! by the first version of a name is fixed for every later version.

use super::{
    ArtifactFile, ArtifactHandle, ArtifactKind, ArtifactRef, ArtifactStore, ArtifactVersion,
    RunHandle, RunId, VersionTag, validate_artifact_name,
};
use featurestage_core::{StageError, content_digest};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Table: "name:vN" -> serialized ArtifactVersion.
const VERSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("versions");

/// Table: name -> latest version number.
const LATEST: TableDefinition<&str, u32> = TableDefinition::new("latest");

/// Catalog file name inside the store root.
pub const CATALOG_FILE: &str = "catalog.redb";

/// Artifact store rooted at a local directory.
pub struct FsArtifactStore {
    root: PathBuf,
    db: Database,
}

impl std::fmt::Debug for FsArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsArtifactStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

fn version_key(name: &str, version: u32) -> String {
    format!("{}:v{}", name, version)
}

fn decode_version(bytes: &[u8]) -> Result<ArtifactVersion, StageError> {
    postcard::from_bytes(bytes).map_err(|e| StageError::SerializationError(e.to_string()))
}

impl FsArtifactStore {
    /// Open or create a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| StageError::IoError(e.to_string()))?;

        let db = Database::create(root.join(CATALOG_FILE))
            .map_err(|e| StageError::IoError(e.to_string()))?;

        {
            let write_txn = db
                .begin_write()
                .map_err(|e| StageError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(VERSIONS)
                .map_err(|e| StageError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(LATEST)
                .map_err(|e| StageError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| StageError::IoError(e.to_string()))?;
        }

        Ok(Self { root, db })
    }

    fn version_dir(&self, name: &str, version: u32) -> PathBuf {
        self.root.join(name).join(format!("v{}", version))
    }

    /// Look up the catalog entry a reference points at.
    fn lookup(&self, reference: &ArtifactRef) -> Result<ArtifactVersion, StageError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StageError::IoError(e.to_string()))?;

        let version = match reference.version {
            VersionTag::Version(n) => n,
            VersionTag::Latest => {
                let latest = read_txn
                    .open_table(LATEST)
                    .map_err(|e| StageError::IoError(e.to_string()))?;
                latest
                    .get(reference.name.as_str())
                    .map_err(|e| StageError::IoError(e.to_string()))?
                    .map(|v| v.value())
                    .ok_or_else(|| StageError::ArtifactNotFound(reference.to_string()))?
            }
        };

        let versions = read_txn
            .open_table(VERSIONS)
            .map_err(|e| StageError::IoError(e.to_string()))?;
        let key = version_key(&reference.name, version);
        match versions
            .get(key.as_str())
            .map_err(|e| StageError::IoError(e.to_string()))?
        {
            Some(data) => decode_version(data.value()),
            None => Err(StageError::ArtifactNotFound(reference.to_string())),
        }
    }

    /// Catalog entries ordered by name then version.
    pub fn list_versions(&self, name: Option<&str>) -> Result<Vec<ArtifactVersion>, StageError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StageError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(VERSIONS)
            .map_err(|e| StageError::IoError(e.to_string()))?;

        let mut versions = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| StageError::IoError(e.to_string()))?
        {
            let (_, data) = entry.map_err(|e| StageError::IoError(e.to_string()))?;
            let version = decode_version(data.value())?;
            if name.is_none_or(|n| n == version.name) {
                versions.push(version);
            }
        }
        versions.sort_by(|a, b| a.name.cmp(&b.name).then(a.version.cmp(&b.version)));
        Ok(versions)
    }

    /// Import an external file as the next version of `name`, outside any run.
    pub fn register_file(
        &self,
        name: &str,
        kind: ArtifactKind,
        path: &Path,
    ) -> Result<ArtifactVersion, StageError> {
        let mut handle = self.create_artifact(name, kind)?;
        self.add_file(&mut handle, path)?;
        self.store(handle, None)
    }

    fn check_kind(&self, name: &str, kind: ArtifactKind) -> Result<(), StageError> {
        match self.lookup(&ArtifactRef::latest(name)) {
            Ok(existing) if existing.kind != kind => Err(StageError::PublishError(format!(
                "artifact '{}' is a {}, not a {}",
                name, existing.kind, kind
            ))),
            Ok(_) | Err(StageError::ArtifactNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Copy the staged files into a fresh version directory and catalog it.
    fn store(
        &self,
        handle: ArtifactHandle,
        run: Option<RunId>,
    ) -> Result<ArtifactVersion, StageError> {
        if handle.files.is_empty() {
            return Err(StageError::PublishError(format!(
                "artifact '{}' has no files",
                handle.name
            )));
        }
        self.check_kind(&handle.name, handle.kind)?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StageError::IoError(e.to_string()))?;

        let version = {
            let latest = write_txn
                .open_table(LATEST)
                .map_err(|e| StageError::IoError(e.to_string()))?;
            latest
                .get(handle.name.as_str())
                .map_err(|e| StageError::IoError(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(0)
                .saturating_add(1)
        };

        let dir = self.version_dir(&handle.name, version);
        if dir.exists() {
            // Leftover of a version whose catalog commit never happened.
            fs::remove_dir_all(&dir).map_err(|e| StageError::IoError(e.to_string()))?;
        }
        fs::create_dir_all(&dir).map_err(|e| StageError::IoError(e.to_string()))?;

        let mut files = Vec::with_capacity(handle.files.len());
        let mut seen = BTreeSet::new();
        for source in &handle.files {
            let file_name = source
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    StageError::IoError(format!("invalid file name '{}'", source.display()))
                })?
                .to_string();
            if !seen.insert(file_name.clone()) {
                return Err(StageError::PublishError(format!(
                    "artifact '{}' has two files named '{}'",
                    handle.name, file_name
                )));
            }

            let data = fs::read(source).map_err(|e| {
                StageError::IoError(format!("cannot read '{}': {}", source.display(), e))
            })?;
            fs::write(dir.join(&file_name), &data)
                .map_err(|e| StageError::IoError(e.to_string()))?;
            files.push(ArtifactFile {
                name: file_name,
                bytes: data.len() as u64,
                digest: content_digest(&data),
            });
        }

        let entry = ArtifactVersion {
            name: handle.name.clone(),
            version,
            kind: handle.kind,
            files,
            run,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let bytes =
            postcard::to_allocvec(&entry).map_err(|e| StageError::SerializationError(e.to_string()))?;

        {
            let mut versions = write_txn
                .open_table(VERSIONS)
                .map_err(|e| StageError::IoError(e.to_string()))?;
            versions
                .insert(version_key(&handle.name, version).as_str(), bytes.as_slice())
                .map_err(|e| StageError::IoError(e.to_string()))?;
        }
        {
            let mut latest = write_txn
                .open_table(LATEST)
                .map_err(|e| StageError::IoError(e.to_string()))?;
            latest
                .insert(handle.name.as_str(), version)
                .map_err(|e| StageError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StageError::IoError(e.to_string()))?;

        Ok(entry)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn resolve(&self, reference: &ArtifactRef) -> Result<ArtifactVersion, StageError> {
        self.lookup(reference)
    }

    fn use_artifact(&self, reference: &ArtifactRef) -> Result<PathBuf, StageError> {
        let version = self.lookup(reference)?;
        let dir = self.version_dir(&version.name, version.version);
        if !dir.is_dir() {
            return Err(StageError::ArtifactNotFound(format!(
                "{} (missing directory {})",
                version.reference(),
                dir.display()
            )));
        }
        Ok(dir)
    }

    fn create_artifact(
        &self,
        name: &str,
        kind: ArtifactKind,
    ) -> Result<ArtifactHandle, StageError> {
        validate_artifact_name(name)?;
        self.check_kind(name, kind)?;
        Ok(ArtifactHandle {
            name: name.to_string(),
            kind,
            files: Vec::new(),
        })
    }

    fn add_file(&self, handle: &mut ArtifactHandle, path: &Path) -> Result<(), StageError> {
        if !path.is_file() {
            return Err(StageError::IoError(format!(
                "'{}' is not a regular file",
                path.display()
            )));
        }
        handle.files.push(path.to_path_buf());
        Ok(())
    }

    fn log_artifact(
        &self,
        run: &RunHandle,
        handle: ArtifactHandle,
    ) -> Result<ArtifactVersion, StageError> {
        self.store(handle, Some(run.id))
    }
}
