//! Assembly errors.

use crate::blueprint::ClassId;
use crate::core::NodeGuid;
use thiserror::Error;

/// Errors that abort the assembly of a state machine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssemblyError {
    #[error("Unknown state machine class '{class}'")]
    UnknownClass { class: ClassId },

    #[error("State machine '{machine}' in class '{class}': node '{node}' uses guid {guid} which has already been added")]
    DuplicateGuid {
        class: ClassId,
        machine: String,
        node: String,
        guid: NodeGuid,
    },

    #[error("Critical error creating state machine '{machine}' for class '{class}': transition '{transition}' could not locate its from state {guid}")]
    MissingFromState {
        class: ClassId,
        machine: String,
        transition: String,
        guid: NodeGuid,
    },

    #[error("Critical error creating state machine '{machine}' for class '{class}': transition '{transition}' could not locate its to state {guid}")]
    MissingToState {
        class: ClassId,
        machine: String,
        transition: String,
        guid: NodeGuid,
    },

    #[error("Circular reference to class '{class}' from node '{node}'. Enable reuse on the reference node to share one instance instead")]
    CircularReference { class: ClassId, node: String },

    #[error("Assembly invariant violated: {0}")]
    InvariantViolation(String),
}

impl AssemblyError {
    pub fn is_circular_reference(&self) -> bool {
        matches!(self, Self::CircularReference { .. })
    }
}
