//! Node instances: the user-facing behavior attached to every node.
//!
//! The runtime only ever talks to node behavior through the fixed hook set of
//! [`NodeInstance`]. Which concrete behavior a node gets is decided by its
//! [`NodeClass`], optionally seeded from a named prototype (template).

use super::guard::Guard;
use super::guid::NodeGuid;
use super::node::NodeKind;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Read-only view of a node handed to behavior hooks.
#[derive(Clone, Debug)]
pub struct NodeContext<'a> {
    pub name: &'a str,
    pub kind: NodeKind,
    /// Path GUID of the node.
    pub guid: NodeGuid,
    pub time_in_state: f32,
    pub is_active: bool,
    pub is_in_end_state: bool,
    pub has_updated: bool,
    /// Variables of the state machine instance the node belongs to.
    pub variables: Option<&'a Map<String, Value>>,
}

impl<'a> NodeContext<'a> {
    /// A context that is not attached to any instance; mostly useful in tests.
    pub fn detached(name: &'a str, kind: NodeKind, guid: NodeGuid) -> Self {
        Self {
            name,
            kind,
            guid,
            time_in_state: 0.0,
            is_active: false,
            is_in_end_state: false,
            has_updated: false,
            variables: None,
        }
    }

    pub fn variable(&self, name: &str) -> Option<&'a Value> {
        self.variables.and_then(|vars| vars.get(name))
    }
}

/// Cloning support for boxed node instances.
///
/// Implemented automatically for every `NodeInstance + Clone`.
pub trait NodeInstanceClone {
    fn clone_instance(&self) -> Box<dyn NodeInstance>;
}

impl<T> NodeInstanceClone for T
where
    T: NodeInstance + Clone + 'static,
{
    fn clone_instance(&self) -> Box<dyn NodeInstance> {
        Box::new(self.clone())
    }
}

/// Behavior hooks of a node.
///
/// State-like nodes use `on_enter`, `on_update` and `on_exit`. Transitions and
/// conduits answer `evaluate_condition`; transitions also receive `on_enter`
/// when they are taken.
pub trait NodeInstance: NodeInstanceClone + Send + Sync {
    fn on_enter(&mut self, _ctx: &NodeContext<'_>) {}

    fn on_update(&mut self, _ctx: &NodeContext<'_>, _delta_seconds: f32) {}

    fn on_exit(&mut self, _ctx: &NodeContext<'_>) {}

    fn evaluate_condition(&mut self, _ctx: &NodeContext<'_>) -> bool {
        false
    }
}

/// Default behavior for states and state machine nodes: does nothing.
#[derive(Clone, Debug, Default)]
pub struct EmptyState;

impl NodeInstance for EmptyState {}

/// Default conduit behavior: always lets evaluation pass through.
#[derive(Clone, Debug, Default)]
pub struct PassThroughConduit;

impl NodeInstance for PassThroughConduit {
    fn evaluate_condition(&mut self, _ctx: &NodeContext<'_>) -> bool {
        true
    }
}

/// Transition or conduit behavior backed by a [`Guard`].
#[derive(Clone, Debug)]
pub struct GuardedCondition {
    guard: Guard,
}

impl GuardedCondition {
    pub fn new(guard: Guard) -> Self {
        Self { guard }
    }
}

impl Default for GuardedCondition {
    fn default() -> Self {
        Self::new(Guard::never())
    }
}

impl NodeInstance for GuardedCondition {
    fn evaluate_condition(&mut self, ctx: &NodeContext<'_>) -> bool {
        self.guard.check(ctx)
    }
}

type InstanceFactory = Arc<dyn Fn() -> Box<dyn NodeInstance> + Send + Sync>;

/// A named factory for node instances, compatible with one node kind.
#[derive(Clone)]
pub struct NodeClass {
    name: Arc<str>,
    kind: NodeKind,
    factory: InstanceFactory,
}

impl NodeClass {
    pub const DEFAULT_STATE: &'static str = "DefaultState";
    pub const DEFAULT_CONDUIT: &'static str = "DefaultConduit";
    pub const DEFAULT_STATE_MACHINE: &'static str = "DefaultStateMachine";
    pub const DEFAULT_TRANSITION: &'static str = "DefaultTransition";

    pub fn new<F>(name: impl Into<Arc<str>>, kind: NodeKind, factory: F) -> Self
    where
        F: Fn() -> Box<dyn NodeInstance> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind,
            factory: Arc::new(factory),
        }
    }

    /// Node class for a `Default + Clone` behavior type.
    pub fn of<T>(name: impl Into<Arc<str>>, kind: NodeKind) -> Self
    where
        T: NodeInstance + Default + Clone + 'static,
    {
        Self::new(name, kind, || Box::new(T::default()))
    }

    /// Transition class whose condition is the given guard.
    ///
    /// # Example
    ///
    /// ```rust
    /// use statewright::core::{Guard, NodeClass, NodeKind};
    ///
    /// let always = NodeClass::transition("Always", Guard::always());
    /// assert_eq!(always.name(), "Always");
    /// assert!(always.is_compatible_with(NodeKind::Transition));
    /// assert!(!always.is_compatible_with(NodeKind::State));
    /// ```
    pub fn transition(name: impl Into<Arc<str>>, guard: Guard) -> Self {
        Self::new(name, NodeKind::Transition, move || {
            Box::new(GuardedCondition::new(guard.clone()))
        })
    }

    /// Conduit class whose condition is the given guard.
    pub fn conduit(name: impl Into<Arc<str>>, guard: Guard) -> Self {
        Self::new(name, NodeKind::Conduit, move || {
            Box::new(GuardedCondition::new(guard.clone()))
        })
    }

    /// The class used when a node has none assigned.
    pub fn default_for(kind: NodeKind) -> Self {
        match kind {
            NodeKind::State => Self::of::<EmptyState>(Self::DEFAULT_STATE, kind),
            NodeKind::Conduit => Self::of::<PassThroughConduit>(Self::DEFAULT_CONDUIT, kind),
            NodeKind::StateMachine => Self::of::<EmptyState>(Self::DEFAULT_STATE_MACHINE, kind),
            NodeKind::Transition => Self::of::<GuardedCondition>(Self::DEFAULT_TRANSITION, kind),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_compatible_with(&self, kind: NodeKind) -> bool {
        self.kind == kind
    }

    pub fn instantiate(&self) -> Box<dyn NodeInstance> {
        (self.factory)()
    }
}

impl fmt::Debug for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeClass")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Source of named node prototypes, searched nearest scope first.
pub trait TemplateLookup {
    fn find_node_template(&self, name: &str) -> Option<&dyn NodeInstance>;
}

/// A lookup with no templates.
pub struct NoTemplates;

impl TemplateLookup for NoTemplates {
    fn find_node_template(&self, _name: &str) -> Option<&dyn NodeInstance> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Counter {
        entered: usize,
    }

    impl NodeInstance for Counter {
        fn on_enter(&mut self, _ctx: &NodeContext<'_>) {
            self.entered += 1;
        }

        fn evaluate_condition(&mut self, _ctx: &NodeContext<'_>) -> bool {
            self.entered > 0
        }
    }

    fn ctx() -> NodeContext<'static> {
        NodeContext::detached("Node", NodeKind::State, NodeGuid::NIL)
    }

    #[test]
    fn default_transition_never_passes() {
        let mut instance = NodeClass::default_for(NodeKind::Transition).instantiate();
        assert!(!instance.evaluate_condition(&ctx()));
    }

    #[test]
    fn default_conduit_passes() {
        let mut instance = NodeClass::default_for(NodeKind::Conduit).instantiate();
        assert!(instance.evaluate_condition(&ctx()));
    }

    #[test]
    fn default_classes_match_their_kind() {
        for kind in [
            NodeKind::State,
            NodeKind::Conduit,
            NodeKind::StateMachine,
            NodeKind::Transition,
        ] {
            assert!(NodeClass::default_for(kind).is_compatible_with(kind));
        }
    }

    #[test]
    fn clone_instance_copies_fields() {
        let mut original = Counter::default();
        original.on_enter(&ctx());

        let mut copy = original.clone_instance();
        assert!(copy.evaluate_condition(&ctx()));
    }

    #[test]
    fn context_variables_are_optional() {
        let mut vars = Map::new();
        vars.insert("speed".to_string(), Value::from(3));

        let mut with_vars = NodeContext::detached("Node", NodeKind::State, NodeGuid::NIL);
        with_vars.variables = Some(&vars);

        assert_eq!(with_vars.variable("speed"), Some(&Value::from(3)));
        assert_eq!(ctx().variable("speed"), None);
    }
}
