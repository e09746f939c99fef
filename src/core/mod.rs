//! Core runtime types: node identity, the node model and node behavior.
//!
//! - Structural and path GUIDs via [`NodeGuid`] and [`PathRegistry`]
//! - The node table entries ([`Node`]) for states, conduits, state machines
//!   and transitions
//! - Node behavior through the [`NodeInstance`] hooks and [`NodeClass`]
//!   factories
//! - Instance graphs ([`MachineGraph`]) owning the node tables
//! - Transition history

mod graph;
mod guard;
mod guid;
mod history;
mod instance;
mod node;

pub use graph::MachineGraph;
pub(crate) use graph::{instance_ids, node_at, node_at_mut};
pub use guard::Guard;
pub use guid::{guid_path, NodeGuid, PathRegistry};
pub use history::{StateHistory, TransitionEvent};
pub use instance::{
    EmptyState, GuardedCondition, NoTemplates, NodeClass, NodeContext, NodeInstance,
    NodeInstanceClone, PassThroughConduit, TemplateLookup,
};
pub use node::{
    InstanceId, MachineNode, Node, NodeBase, NodeBody, NodeId, NodeKind, NodeRef, Reference,
    StateNode, TransitionNode,
};
