//! # Transform Persistence Format
//!
//! Binary serialization for fitted transforms.
//!
//! Format: Header (5 bytes) + postcard-serialized `FittedTransform`.
//! - 4 bytes: Magic ("FSTX")
//! - 1 byte: Version
//!
//! The blob is self-describing enough to be reloaded without the dataset that
//! produced it. File I/O operations are in the app layer.
//!
//! ## Validation
//!
//! Size limits and the header are checked before the payload is parsed, so
//! corrupted or foreign files are rejected without allocating for them.

use crate::primitives::{self, MAX_TRANSFORM_PAYLOAD_SIZE};
use crate::{FittedTransform, StageError};

/// Minimum valid blob size (header only).
const MIN_BLOB_SIZE: usize = 5;

// =============================================================================
// BLOB HEADER
// =============================================================================

/// The header precedes all transform data.
#[derive(Debug, Clone, Copy)]
pub struct TransformHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl TransformHeader {
    /// Create a new header with current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> Result<(), StageError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(StageError::SerializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(StageError::SerializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    pub fn to_bytes(&self) -> [u8; 5] {
        let mut bytes = [0u8; 5];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StageError> {
        if bytes.len() < MIN_BLOB_SIZE {
            return Err(StageError::SerializationError(
                "Header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for TransformHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a fitted transform to bytes (header + payload).
pub fn transform_to_bytes(transform: &FittedTransform) -> Result<Vec<u8>, StageError> {
    let header = TransformHeader::new();

    let payload = postcard::to_stdvec(transform)
        .map_err(|e| StageError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(MIN_BLOB_SIZE + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);

    Ok(result)
}

/// Deserialize a fitted transform from bytes.
///
/// Validates, in order: minimum size, maximum size, header magic and version.
/// Only then is the payload parsed.
pub fn transform_from_bytes(bytes: &[u8]) -> Result<FittedTransform, StageError> {
    if bytes.len() < MIN_BLOB_SIZE {
        return Err(StageError::SerializationError(
            "Data too short: minimum 5 bytes required".to_string(),
        ));
    }

    if bytes.len() > MAX_TRANSFORM_PAYLOAD_SIZE {
        return Err(StageError::SerializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_TRANSFORM_PAYLOAD_SIZE
        )));
    }

    let header = TransformHeader::from_bytes(bytes)?;
    header.validate()?;

    let payload = &bytes[MIN_BLOB_SIZE..];
    postcard::from_bytes(payload).map_err(|e| {
        StageError::SerializationError(format!("Failed to deserialize transform: {}", e))
    })
}

/// Compute a BLAKE3 hash of raw artifact bytes.
///
/// This function is only available with the `crypto-hash` feature enabled.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn content_digest(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================
