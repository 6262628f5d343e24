//! Dataset loader: artifact reference to parsed `Dataset`.

use crate::services::{ArtifactRef, ArtifactStore, ArtifactVersion};
use featurestage_core::primitives::MAX_TABULAR_SIZE;
use featurestage_core::{Dataset, StageError, read_csv};
use std::path::Path;

/// Read a file after checking its size.
pub(crate) fn read_bounded(path: &Path, max_size: usize) -> Result<Vec<u8>, StageError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| StageError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size as u64 {
        return Err(StageError::ParseError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    std::fs::read(path)
        .map_err(|e| StageError::IoError(format!("Cannot read '{}': {}", path.display(), e)))
}

/// Resolve `reference` to an exact version and parse the CSV file named
/// after the artifact inside its directory.
///
/// Returns the exact version read alongside the dataset.
///
/// # Errors
///
/// - `StageError::ArtifactNotFound` if the artifact, version or file is missing
/// - `StageError::ParseError` if the file is not a well-formed CSV
pub fn load_data(
    store: &dyn ArtifactStore,
    reference: &ArtifactRef,
) -> Result<(ArtifactVersion, Dataset), StageError> {
    let version = store.resolve(reference)?;
    let dir = store.use_artifact(&version.reference())?;
    let path = dir.join(&version.name);
    if !path.is_file() {
        return Err(StageError::ArtifactNotFound(format!(
            "{}: no file '{}'",
            version.reference(),
            version.name
        )));
    }

    let bytes = read_bounded(&path, MAX_TABULAR_SIZE)?;
    let dataset = read_csv(&bytes)?;
    Ok((version, dataset))
}
