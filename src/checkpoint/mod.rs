//! Checkpoint and resume functionality for state machine instances.
//!
//! A checkpoint records which states were active (by path GUID) and for how
//! long, plus the transition history. Path GUIDs are stable for a given class,
//! so a checkpoint taken from one process can be restored into a freshly
//! initialized instance of the same class in another.

use crate::blueprint::ClassId;
use crate::core::{NodeGuid, StateHistory};
use crate::runtime::StateMachineInstance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub mod error;

pub use error::CheckpointError;

/// Version identifier for checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// One active state at checkpoint time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveState {
    pub guid: NodeGuid,
    pub name: String,
    pub time_in_state: f32,
}

/// Serializable snapshot of an instance's active states.
/// Node instances themselves are not captured.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint format version
    pub version: u32,

    /// Unique checkpoint identifier
    pub id: String,

    /// When checkpoint was created
    pub timestamp: DateTime<Utc>,

    pub class: ClassId,

    /// Active states, outermost first
    pub active_states: Vec<ActiveState>,

    /// Complete transition history
    pub history: StateHistory,
}

impl Checkpoint {
    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let checkpoint: Self = serde_json::from_str(json)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        checkpoint.check_version()?;
        Ok(checkpoint)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        bincode::serialize(self).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let checkpoint: Self = bincode::deserialize(bytes)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        checkpoint.check_version()?;
        Ok(checkpoint)
    }

    fn check_version(&self) -> Result<(), CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        Ok(())
    }
}

impl StateMachineInstance {
    /// Capture the active states of every instance graph.
    pub fn checkpoint(&self) -> Checkpoint {
        let active_states = self
            .graphs()
            .iter()
            .flat_map(|graph| graph.nodes().iter())
            .filter(|node| node.kind().is_state() && node.base().is_active())
            .map(|node| ActiveState {
                guid: node.path_guid(),
                name: node.name().to_string(),
                time_in_state: node.base().time_in_state(),
            })
            .collect();

        Checkpoint {
            version: CHECKPOINT_VERSION,
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            class: self.class().clone(),
            active_states,
            history: self.history().clone(),
        }
    }

    /// Resume from a checkpoint.
    ///
    /// The instance must be initialized and not running. The recorded states
    /// are activated directly, without entering initial states, and the
    /// instance is running afterwards.
    pub fn restore(&mut self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        checkpoint.check_version()?;
        if !self.is_initialized() || self.is_running() {
            return Err(CheckpointError::NotRestorable);
        }
        if checkpoint.class != *self.class() {
            return Err(CheckpointError::ClassMismatch {
                expected: self.class().clone(),
                found: checkpoint.class.clone(),
            });
        }

        let states = checkpoint
            .active_states
            .iter()
            .map(|state| {
                self.locate(&state.guid)
                    .map(|at| (at, state.time_in_state))
                    .ok_or(CheckpointError::UnknownState { guid: state.guid })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.activate_exactly(&states);
        self.replace_history(checkpoint.history.clone());
        debug!(
            class = %checkpoint.class,
            checkpoint = %checkpoint.id,
            states = states.len(),
            "restored checkpoint"
        );
        Ok(())
    }
}
