//! Runtime node model: states, conduits, state machines and transitions.
//!
//! Nodes live by value in the node table of the instance graph that owns
//! them. Every link between nodes (owner, from/to state, incoming/outgoing
//! transitions, contained states) is a non-owning [`NodeId`] or [`NodeRef`]
//! into those tables, never shared ownership.

use super::guid::NodeGuid;
use super::instance::{NodeClass, NodeContext, NodeInstance, TemplateLookup};
use crate::blueprint::{ClassId, NodeRecord, RecordKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::{error, warn};

/// What a node is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    State,
    Conduit,
    StateMachine,
    Transition,
}

impl NodeKind {
    /// States, conduits and state machines are all states.
    pub fn is_state(&self) -> bool {
        !matches!(self, Self::Transition)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::State => "state",
            Self::Conduit => "conduit",
            Self::StateMachine => "state machine",
            Self::Transition => "transition",
        };
        f.write_str(name)
    }
}

/// Index of a node inside its instance graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Root state machine of every instance graph.
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(&self) -> usize {
        self.0
    }
}

/// Index of an instance graph inside a top-level instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub(crate) usize);

impl InstanceId {
    /// The top-level instance graph.
    pub const TOP: InstanceId = InstanceId(0);

    pub fn index(&self) -> usize {
        self.0
    }
}

/// A node anywhere in a top-level instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub instance: InstanceId,
    pub node: NodeId,
}

impl NodeRef {
    pub fn new(instance: InstanceId, node: NodeId) -> Self {
        Self { instance, node }
    }
}

/// Fields shared by every node.
pub struct NodeBase {
    name: String,
    guid: NodeGuid,
    owner_guid: NodeGuid,
    path_guid: NodeGuid,
    owner: Option<NodeRef>,
    instance_class: Option<NodeClass>,
    class_name: Option<String>,
    template_name: Option<String>,
    instance: Option<Box<dyn NodeInstance>>,
    initialized: bool,
    pub(crate) active: bool,
    pub(crate) time_in_state: f32,
    pub(crate) has_updated: bool,
    pub(crate) in_end_state: bool,
}

impl NodeBase {
    pub fn new(name: impl Into<String>, guid: NodeGuid, owner_guid: NodeGuid) -> Self {
        Self {
            name: name.into(),
            guid,
            owner_guid,
            path_guid: NodeGuid::NIL,
            owner: None,
            instance_class: None,
            class_name: None,
            template_name: None,
            instance: None,
            initialized: false,
            active: false,
            time_in_state: 0.0,
            has_updated: false,
            in_end_state: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Structural GUID, unique within the defining template.
    pub fn guid(&self) -> NodeGuid {
        self.guid
    }

    pub fn set_guid(&mut self, guid: NodeGuid) {
        self.guid = guid;
    }

    /// Structural GUID of the enclosing state machine node.
    pub fn owner_guid(&self) -> NodeGuid {
        self.owner_guid
    }

    pub fn set_owner_guid(&mut self, guid: NodeGuid) {
        self.owner_guid = guid;
    }

    /// Path GUID, unique across the assembled top-level instance.
    pub fn path_guid(&self) -> NodeGuid {
        self.path_guid
    }

    pub(crate) fn set_path_guid(&mut self, guid: NodeGuid) {
        self.path_guid = guid;
    }

    pub fn owner(&self) -> Option<NodeRef> {
        self.owner
    }

    pub fn set_owner(&mut self, owner: Option<NodeRef>) {
        self.owner = owner;
    }

    pub fn instance_class(&self) -> Option<&NodeClass> {
        self.instance_class.as_ref()
    }

    /// Name of the node class requested by the node record, if any.
    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub fn template_name(&self) -> Option<&str> {
        self.template_name.as_deref()
    }

    pub fn set_template_name(&mut self, name: Option<String>) {
        self.template_name = name;
    }

    pub fn node_instance(&self) -> Option<&dyn NodeInstance> {
        self.instance.as_deref()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn time_in_state(&self) -> f32 {
        self.time_in_state
    }

    pub fn has_updated(&self) -> bool {
        self.has_updated
    }

    pub fn is_in_end_state(&self) -> bool {
        self.in_end_state
    }
}

/// A reference from a state machine node to another machine class.
#[derive(Clone, Debug)]
pub struct Reference {
    pub class: ClassId,
    pub template: Option<String>,
    pub reuse: bool,
    pub(crate) instance: Option<InstanceId>,
}

impl Reference {
    /// The instance graph this reference delegates to, once resolved.
    pub fn instance(&self) -> Option<InstanceId> {
        self.instance
    }
}

/// Data specific to state machine nodes.
#[derive(Debug, Default)]
pub struct MachineNode {
    pub(crate) states: Vec<NodeId>,
    pub(crate) initial_states: Vec<NodeId>,
    pub(crate) transitions: Vec<NodeId>,
    pub(crate) state_map: HashMap<NodeGuid, NodeId>,
    pub(crate) transition_map: HashMap<NodeGuid, NodeId>,
    pub(crate) active_states: Vec<NodeId>,
    pub(crate) reference: Option<Reference>,
    pub(crate) wait_for_end_state: bool,
}

impl MachineNode {
    pub fn states(&self) -> &[NodeId] {
        &self.states
    }

    pub fn initial_states(&self) -> &[NodeId] {
        &self.initial_states
    }

    pub fn transitions(&self) -> &[NodeId] {
        &self.transitions
    }

    pub fn active_states(&self) -> &[NodeId] {
        &self.active_states
    }

    pub fn reference(&self) -> Option<&Reference> {
        self.reference.as_ref()
    }

    pub fn state_by_guid(&self, guid: &NodeGuid) -> Option<NodeId> {
        self.state_map.get(guid).copied()
    }

    pub fn transition_by_guid(&self, guid: &NodeGuid) -> Option<NodeId> {
        self.transition_map.get(guid).copied()
    }

    pub fn waits_for_end_state(&self) -> bool {
        self.wait_for_end_state
    }
}

/// Data shared by states, conduits and state machines.
#[derive(Debug, Default)]
pub struct StateNode {
    pub(crate) incoming: Vec<NodeId>,
    pub(crate) outgoing: Vec<NodeId>,
    pub(crate) is_initial: bool,
    pub(crate) is_end_state: bool,
    pub(crate) eval_transitions_on_start: bool,
    pub(crate) machine: Option<MachineNode>,
}

impl StateNode {
    pub fn incoming(&self) -> &[NodeId] {
        &self.incoming
    }

    /// Outgoing transitions, sorted by ascending priority once assembled.
    pub fn outgoing(&self) -> &[NodeId] {
        &self.outgoing
    }

    pub fn is_initial(&self) -> bool {
        self.is_initial
    }

    /// Structural end state: nothing but self-transitions or always-false
    /// transitions leave it.
    pub fn is_end_state(&self) -> bool {
        self.is_end_state
    }

    pub fn machine(&self) -> Option<&MachineNode> {
        self.machine.as_ref()
    }
}

/// Data specific to transitions.
#[derive(Debug)]
pub struct TransitionNode {
    pub(crate) from_guid: NodeGuid,
    pub(crate) to_guid: NodeGuid,
    pub(crate) from: Option<NodeId>,
    pub(crate) to: Option<NodeId>,
    pub(crate) priority: i32,
    pub(crate) can_evaluate: bool,
    pub(crate) always_false: bool,
}

impl TransitionNode {
    pub fn from_guid(&self) -> NodeGuid {
        self.from_guid
    }

    pub fn to_guid(&self) -> NodeGuid {
        self.to_guid
    }

    pub fn from_state(&self) -> Option<NodeId> {
        self.from
    }

    pub fn to_state(&self) -> Option<NodeId> {
        self.to
    }

    /// Lower values are evaluated first.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn can_evaluate(&self) -> bool {
        self.can_evaluate
    }

    pub fn set_can_evaluate(&mut self, value: bool) {
        self.can_evaluate = value;
    }

    pub fn is_always_false(&self) -> bool {
        self.always_false
    }

    pub fn is_self_transition(&self) -> bool {
        self.from_guid == self.to_guid
    }
}

#[derive(Debug)]
pub enum NodeBody {
    State(StateNode),
    Transition(TransitionNode),
}

/// A node in an instance graph.
pub struct Node {
    base: NodeBase,
    kind: NodeKind,
    body: NodeBody,
}

impl Node {
    /// Build the root state machine node of an instance graph.
    pub fn root(name: impl Into<String>, guid: NodeGuid) -> Self {
        let state = StateNode {
            is_initial: true,
            machine: Some(MachineNode::default()),
            ..StateNode::default()
        };
        Self {
            base: NodeBase::new(name, guid, NodeGuid::NIL),
            kind: NodeKind::StateMachine,
            body: NodeBody::State(state),
        }
    }

    /// Value-initialize a node from its flattened record.
    pub fn from_record(record: &NodeRecord) -> Self {
        let mut base = NodeBase::new(record.name.clone(), record.guid, record.owner_guid);
        base.class_name = record.node_class.clone();
        base.template_name = record.template.clone();

        let (kind, body) = match &record.kind {
            RecordKind::State {
                initial,
                eval_transitions_on_start,
            } => (
                NodeKind::State,
                NodeBody::State(StateNode {
                    is_initial: *initial,
                    eval_transitions_on_start: *eval_transitions_on_start,
                    ..StateNode::default()
                }),
            ),
            RecordKind::Conduit { initial } => (
                NodeKind::Conduit,
                NodeBody::State(StateNode {
                    is_initial: *initial,
                    ..StateNode::default()
                }),
            ),
            RecordKind::StateMachine {
                initial,
                reference,
                wait_for_end_state,
            } => (
                NodeKind::StateMachine,
                NodeBody::State(StateNode {
                    is_initial: *initial,
                    machine: Some(MachineNode {
                        reference: reference.as_ref().map(|r| Reference {
                            class: r.class.clone(),
                            template: r.template.clone(),
                            reuse: r.reuse,
                            instance: None,
                        }),
                        wait_for_end_state: *wait_for_end_state,
                        ..MachineNode::default()
                    }),
                    ..StateNode::default()
                }),
            ),
            RecordKind::Transition {
                from,
                to,
                priority,
                can_evaluate,
                always_false,
            } => (
                NodeKind::Transition,
                NodeBody::Transition(TransitionNode {
                    from_guid: *from,
                    to_guid: *to,
                    from: None,
                    to: None,
                    priority: *priority,
                    can_evaluate: *can_evaluate,
                    always_false: *always_false,
                }),
            ),
        };

        Self { base, kind, body }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn base(&self) -> &NodeBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub fn guid(&self) -> NodeGuid {
        self.base.guid()
    }

    pub fn path_guid(&self) -> NodeGuid {
        self.base.path_guid()
    }

    pub fn as_state(&self) -> Option<&StateNode> {
        match &self.body {
            NodeBody::State(state) => Some(state),
            NodeBody::Transition(_) => None,
        }
    }

    pub(crate) fn as_state_mut(&mut self) -> Option<&mut StateNode> {
        match &mut self.body {
            NodeBody::State(state) => Some(state),
            NodeBody::Transition(_) => None,
        }
    }

    pub fn as_transition(&self) -> Option<&TransitionNode> {
        match &self.body {
            NodeBody::Transition(transition) => Some(transition),
            NodeBody::State(_) => None,
        }
    }

    pub fn as_transition_mut(&mut self) -> Option<&mut TransitionNode> {
        match &mut self.body {
            NodeBody::Transition(transition) => Some(transition),
            NodeBody::State(_) => None,
        }
    }

    pub fn as_machine(&self) -> Option<&MachineNode> {
        self.as_state().and_then(|state| state.machine.as_ref())
    }

    pub(crate) fn as_machine_mut(&mut self) -> Option<&mut MachineNode> {
        self.as_state_mut().and_then(|state| state.machine.as_mut())
    }

    /// The referenced class, if this is a reference node.
    pub fn reference(&self) -> Option<&Reference> {
        self.as_machine().and_then(|machine| machine.reference.as_ref())
    }

    pub(crate) fn reference_mut(&mut self) -> Option<&mut Reference> {
        self.as_machine_mut()
            .and_then(|machine| machine.reference.as_mut())
    }

    /// Assign the node instance class.
    ///
    /// An incompatible class is rejected with an error log and the current
    /// class is kept. Returns whether the class was assigned.
    pub fn set_node_instance_class(&mut self, class: NodeClass) -> bool {
        if !class.is_compatible_with(self.kind) {
            error!(
                node = %self.base.name,
                class = class.name(),
                expected = %self.kind,
                "could not set node instance class: the types are not compatible"
            );
            return false;
        }
        self.base.instance_class = Some(class);
        true
    }

    /// Create the node instance, copying from a named template if one is set.
    pub fn create_node_instance(&mut self, templates: &dyn TemplateLookup) {
        let class = match &self.base.instance_class {
            Some(class) => class.clone(),
            None => {
                let class = NodeClass::default_for(self.kind);
                self.base.instance_class = Some(class.clone());
                class
            }
        };

        let template = self
            .base
            .template_name
            .as_deref()
            .and_then(|name| match templates.find_node_template(name) {
                Some(template) => Some(template.clone_instance()),
                None => {
                    error!(
                        template = name,
                        node = %self.base.name,
                        "could not find node template, loading defaults"
                    );
                    None
                }
            });

        self.base.instance = Some(template.unwrap_or_else(|| class.instantiate()));
    }

    pub fn destroy_node_instance(&mut self) {
        self.base.instance = None;
    }

    /// Mark the node initialized and create its node instance.
    pub fn initialize(&mut self, templates: &dyn TemplateLookup) {
        self.base.initialized = true;
        self.create_node_instance(templates);
    }

    /// Clear per-run transient state.
    pub fn reset(&mut self) {
        self.base.active = false;
        self.base.time_in_state = 0.0;
        self.base.has_updated = false;
        self.base.in_end_state = false;
        if let Some(machine) = self.as_machine_mut() {
            machine.active_states.clear();
        }
    }

    /// Run `f` against the node instance with a context describing this node.
    pub(crate) fn with_instance<R>(
        &mut self,
        variables: Option<&Map<String, Value>>,
        f: impl FnOnce(&mut (dyn NodeInstance + 'static), &NodeContext<'_>) -> R,
    ) -> Option<R> {
        let kind = self.kind;
        let NodeBase {
            name,
            path_guid,
            instance,
            active,
            time_in_state,
            has_updated,
            in_end_state,
            ..
        } = &mut self.base;
        let ctx = NodeContext {
            name: name.as_str(),
            kind,
            guid: *path_guid,
            time_in_state: *time_in_state,
            is_active: *active,
            is_in_end_state: *in_end_state,
            has_updated: *has_updated,
            variables,
        };
        instance.as_deref_mut().map(|instance| f(instance, &ctx))
    }

    /// Activate the node and run its enter behavior.
    pub(crate) fn enter(&mut self, variables: Option<&Map<String, Value>>) {
        if !self.base.initialized {
            return;
        }
        self.base.active = true;
        self.base.time_in_state = 0.0;
        self.base.has_updated = false;
        self.with_instance(variables, |instance, ctx| instance.on_enter(ctx));
    }

    /// Run the node's update behavior after advancing its time in state.
    ///
    /// Does nothing if the node was never initialized.
    pub fn execute(&mut self, variables: Option<&Map<String, Value>>, delta_seconds: f32) {
        if !self.base.initialized {
            return;
        }
        self.base.time_in_state += delta_seconds;
        self.with_instance(variables, |instance, ctx| {
            instance.on_update(ctx, delta_seconds)
        });
        self.base.has_updated = true;
    }

    /// Run the node's exit behavior and deactivate it.
    pub(crate) fn exit(&mut self, variables: Option<&Map<String, Value>>) {
        if !self.base.initialized {
            return;
        }
        self.with_instance(variables, |instance, ctx| instance.on_exit(ctx));
        self.base.active = false;
    }

    /// Ask the node instance whether this transition or conduit may pass.
    pub(crate) fn evaluate_condition(&mut self, variables: Option<&Map<String, Value>>) -> bool {
        if !self.base.initialized {
            warn!(node = %self.base.name, "evaluating a node that was never initialized");
            return false;
        }
        self.with_instance(variables, |instance, ctx| instance.evaluate_condition(ctx))
            .unwrap_or(false)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.base.name)
            .field("kind", &self.kind)
            .field("guid", &self.base.guid)
            .field("path_guid", &self.base.path_guid)
            .field("active", &self.base.active)
            .finish()
    }
}
