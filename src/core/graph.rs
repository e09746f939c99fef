//! Instance graphs: the node table of one instantiated machine class.

use super::node::{InstanceId, Node, NodeId, NodeRef};
use crate::blueprint::ClassId;
use serde_json::{Map, Value};

/// Every node of one state machine instance, rooted at [`NodeId::ROOT`].
#[derive(Debug)]
pub struct MachineGraph {
    class: ClassId,
    nodes: Vec<Node>,
    variables: Map<String, Value>,
    reference_owner: Option<NodeRef>,
}

impl MachineGraph {
    pub fn new(class: ClassId, root: Node, variables: Map<String, Value>) -> Self {
        Self {
            class,
            nodes: vec![root],
            variables,
            reference_owner: None,
        }
    }

    pub fn class(&self) -> &ClassId {
        &self.class
    }

    pub fn root(&self) -> &Node {
        &self.nodes[NodeId::ROOT.0]
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    /// Ids of every node, root first.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub(crate) fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.variables
    }

    /// A node together with the instance variables its hooks may read.
    pub(crate) fn node_with_variables(&mut self, id: NodeId) -> Option<(&mut Node, &Map<String, Value>)> {
        let Self {
            nodes, variables, ..
        } = self;
        nodes.get_mut(id.0).map(|node| (node, &*variables))
    }

    /// The reference node this instance was first resolved from.
    pub fn reference_owner(&self) -> Option<NodeRef> {
        self.reference_owner
    }

    pub(crate) fn set_reference_owner(&mut self, owner: Option<NodeRef>) {
        self.reference_owner = owner;
    }
}

/// Locate a node across a set of instance graphs.
pub(crate) fn node_at(graphs: &[MachineGraph], at: NodeRef) -> Option<&Node> {
    graphs.get(at.instance.0).and_then(|graph| graph.node(at.node))
}

pub(crate) fn node_at_mut(graphs: &mut [MachineGraph], at: NodeRef) -> Option<&mut Node> {
    graphs
        .get_mut(at.instance.0)
        .and_then(|graph| graph.node_mut(at.node))
}

pub(crate) fn instance_ids(graphs: &[MachineGraph]) -> impl Iterator<Item = InstanceId> {
    (0..graphs.len()).map(InstanceId)
}
