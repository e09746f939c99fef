//! Checkpoint error types.

use crate::blueprint::ClassId;
use crate::core::NodeGuid;
use thiserror::Error;

/// Errors that can occur during checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Serialization to JSON or binary format failed
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Deserialization from JSON or binary format failed
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Checkpoint version is not supported by this version
    #[error("Unsupported checkpoint version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Checkpoint was taken from class '{found}' but the instance is of class '{expected}'")]
    ClassMismatch { expected: ClassId, found: ClassId },

    #[error("Checkpoint refers to state {guid} which does not exist in this instance")]
    UnknownState { guid: NodeGuid },

    #[error("Checkpoints can only be restored into an initialized instance that is not running")]
    NotRestorable,
}
