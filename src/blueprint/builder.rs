//! Fluent authoring API for machine classes.
//!
//! The builder addresses nodes by name and hands out fresh structural GUIDs,
//! flattening nested state machines into the single ordered record list a
//! [`MachineClass`] carries. Errors are collected while chaining and surface
//! from [`ClassBuilder::build`].

use super::{ClassId, InstanceTemplate, MachineClass, NodeRecord, RecordKind, ReferenceRecord};
use crate::core::{NodeGuid, NodeInstance, NodeKind};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur when authoring a machine class.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("State machine '{machine}' has states but no initial state. Use .initial_state(name) or StateSpec::initial()")]
    MissingInitialState { machine: String },

    #[error("Transition source state not specified. Call .from(state)")]
    MissingFromState,

    #[error("Transition target state not specified. Call .to(state)")]
    MissingToState,

    #[error("No state named '{name}' in this state machine")]
    UnknownState { name: String },

    #[error("A state named '{name}' already exists in this state machine")]
    DuplicateState { name: String },

    #[error("Node names must not be empty")]
    EmptyName,

    #[error("No states given to collapse")]
    NothingToCollapse,

    #[error("Node {guid} is not a state of this class")]
    NotAState { guid: NodeGuid },

    #[error("States to collapse must share one owner; {guid} belongs to another state machine")]
    MixedOwners { guid: NodeGuid },
}

/// Description of a state, conduit or state machine node.
#[derive(Clone, Debug)]
pub struct StateSpec {
    name: String,
    kind: NodeKind,
    guid: Option<NodeGuid>,
    initial: bool,
    class: Option<String>,
    template: Option<String>,
    eval_transitions_on_start: bool,
    wait_for_end_state: bool,
}

impl StateSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::State,
            guid: None,
            initial: false,
            class: None,
            template: None,
            eval_transitions_on_start: false,
            wait_for_end_state: false,
        }
    }

    pub fn conduit(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Conduit,
            ..Self::new(name)
        }
    }

    pub fn state_machine(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::StateMachine,
            ..Self::new(name)
        }
    }

    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    /// Use a fixed structural GUID instead of a generated one.
    pub fn guid(mut self, guid: NodeGuid) -> Self {
        self.guid = Some(guid);
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn eval_transitions_on_start(mut self) -> Self {
        self.eval_transitions_on_start = true;
        self
    }

    pub fn wait_for_end_state(mut self) -> Self {
        self.wait_for_end_state = true;
        self
    }

    fn into_record(self, owner: NodeGuid, reference: Option<ReferenceRecord>) -> NodeRecord {
        let guid = self.guid.unwrap_or_else(NodeGuid::new);
        let kind = match (self.kind, reference) {
            (_, Some(reference)) => RecordKind::StateMachine {
                initial: self.initial,
                reference: Some(reference),
                wait_for_end_state: self.wait_for_end_state,
            },
            (NodeKind::Conduit, None) => RecordKind::Conduit {
                initial: self.initial,
            },
            (NodeKind::StateMachine, None) => RecordKind::StateMachine {
                initial: self.initial,
                reference: None,
                wait_for_end_state: self.wait_for_end_state,
            },
            _ => RecordKind::State {
                initial: self.initial,
                eval_transitions_on_start: self.eval_transitions_on_start,
            },
        };
        NodeRecord {
            guid,
            owner_guid: owner,
            name: self.name,
            kind,
            node_class: self.class,
            template: self.template,
        }
    }
}

/// Target of a reference node.
#[derive(Clone, Debug)]
pub struct ReferenceSpec {
    class: ClassId,
    template: Option<String>,
    reuse: bool,
}

impl ReferenceSpec {
    pub fn new(class: impl Into<ClassId>) -> Self {
        Self {
            class: class.into(),
            template: None,
            reuse: false,
        }
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Share one instance between every reference to the class.
    pub fn reuse(mut self) -> Self {
        self.reuse = true;
        self
    }
}

/// Builder for a transition between two named states.
#[derive(Clone, Debug, Default)]
pub struct TransitionSpec {
    from: Option<String>,
    to: Option<String>,
    name: Option<String>,
    guid: Option<NodeGuid>,
    priority: i32,
    class: Option<String>,
    template: Option<String>,
    can_evaluate: Option<bool>,
    always_false: bool,
}

impl TransitionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source state (required).
    pub fn from(mut self, state: impl Into<String>) -> Self {
        self.from = Some(state.into());
        self
    }

    /// Set the target state (required).
    pub fn to(mut self, state: impl Into<String>) -> Self {
        self.to = Some(state.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn guid(mut self, guid: NodeGuid) -> Self {
        self.guid = Some(guid);
        self
    }

    /// Lower priorities are evaluated first.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Start with evaluation disabled.
    pub fn disabled(mut self) -> Self {
        self.can_evaluate = Some(false);
        self
    }

    /// Mark the transition as one that can never pass.
    pub fn always_false(mut self) -> Self {
        self.always_false = true;
        self
    }

    fn into_record(self, owner: NodeGuid, names: &HashMap<String, NodeGuid>) -> Result<NodeRecord, BuildError> {
        let from = self.from.ok_or(BuildError::MissingFromState)?;
        let to = self.to.ok_or(BuildError::MissingToState)?;
        let lookup = |name: &str| {
            names
                .get(name)
                .copied()
                .ok_or_else(|| BuildError::UnknownState {
                    name: name.to_string(),
                })
        };
        let (from_guid, to_guid) = (lookup(&from)?, lookup(&to)?);

        Ok(NodeRecord {
            guid: self.guid.unwrap_or_else(NodeGuid::new),
            owner_guid: owner,
            name: self.name.unwrap_or_else(|| format!("{from} -> {to}")),
            kind: RecordKind::Transition {
                from: from_guid,
                to: to_guid,
                priority: self.priority,
                can_evaluate: self.can_evaluate.unwrap_or(true),
                always_false: self.always_false,
            },
            node_class: self.class,
            template: self.template,
        })
    }
}

/// Contents of one state machine: its states, transitions and nested
/// machines.
pub struct ScopeBuilder {
    machine: String,
    owner: NodeGuid,
    names: HashMap<String, NodeGuid>,
    records: Vec<NodeRecord>,
    has_states: bool,
    has_initial: bool,
    error: Option<BuildError>,
}

impl ScopeBuilder {
    fn new(machine: impl Into<String>, owner: NodeGuid) -> Self {
        Self {
            machine: machine.into(),
            owner,
            names: HashMap::new(),
            records: Vec::new(),
            has_states: false,
            has_initial: false,
            error: None,
        }
    }

    fn fail(&mut self, error: BuildError) {
        self.error.get_or_insert(error);
    }

    fn push_state(&mut self, record: NodeRecord) -> bool {
        if record.name.is_empty() {
            self.fail(BuildError::EmptyName);
            return false;
        }
        if self.names.contains_key(&record.name) {
            self.fail(BuildError::DuplicateState {
                name: record.name.clone(),
            });
            return false;
        }
        self.has_states = true;
        self.has_initial |= record.is_initial();
        self.names.insert(record.name.clone(), record.guid);
        self.records.push(record);
        true
    }

    /// Structural GUID of the state machine this scope fills.
    pub fn owner(&self) -> NodeGuid {
        self.owner
    }

    /// Structural GUID of a state added to this scope.
    pub fn guid_of(&self, name: &str) -> Option<NodeGuid> {
        self.names.get(name).copied()
    }

    pub fn state(self, name: impl Into<String>) -> Self {
        self.add(StateSpec::new(name))
    }

    pub fn initial_state(self, name: impl Into<String>) -> Self {
        self.add(StateSpec::new(name).initial())
    }

    pub fn conduit(self, name: impl Into<String>) -> Self {
        self.add(StateSpec::conduit(name))
    }

    /// Add a state, conduit or empty state machine node.
    pub fn add(mut self, spec: StateSpec) -> Self {
        let record = spec.into_record(self.owner, None);
        self.push_state(record);
        self
    }

    /// Add a nested state machine and fill it with `contents`.
    pub fn nested<F>(mut self, spec: StateSpec, contents: F) -> Self
    where
        F: FnOnce(ScopeBuilder) -> ScopeBuilder,
    {
        let record = StateSpec {
            kind: NodeKind::StateMachine,
            ..spec
        }
        .into_record(self.owner, None);
        let (name, guid) = (record.name.clone(), record.guid);
        if !self.push_state(record) {
            return self;
        }

        let inner = contents(ScopeBuilder::new(name, guid));
        match inner.finish() {
            Ok(records) => self.records.extend(records),
            Err(error) => self.fail(error),
        }
        self
    }

    /// Add a reference node delegating to another machine class.
    pub fn reference(mut self, spec: StateSpec, target: ReferenceSpec) -> Self {
        let reference = ReferenceRecord {
            class: target.class,
            template: target.template,
            reuse: target.reuse,
        };
        let record = spec.into_record(self.owner, Some(reference));
        self.push_state(record);
        self
    }

    /// Add a transition using the default transition class.
    pub fn link(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.transition(TransitionSpec::new().from(from).to(to))
    }

    pub fn transition(mut self, spec: TransitionSpec) -> Self {
        match spec.into_record(self.owner, &self.names) {
            Ok(record) => self.records.push(record),
            Err(error) => self.fail(error),
        }
        self
    }

    /// Add a raw record owned by this scope.
    pub fn record(mut self, mut record: NodeRecord) -> Self {
        record.owner_guid = self.owner;
        if record.is_state() {
            self.push_state(record);
        } else {
            self.records.push(record);
        }
        self
    }

    fn finish(self) -> Result<Vec<NodeRecord>, BuildError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.has_states && !self.has_initial {
            return Err(BuildError::MissingInitialState {
                machine: self.machine,
            });
        }
        Ok(self.records)
    }
}

/// Builder for a [`MachineClass`].
///
/// # Example
///
/// ```rust
/// use statewright::blueprint::{ClassBuilder, TransitionSpec};
///
/// let class = ClassBuilder::new("Door")
///     .graph(|g| {
///         g.initial_state("Closed")
///             .state("Open")
///             .transition(TransitionSpec::new().from("Closed").to("Open").class("Push"))
///             .link("Open", "Closed")
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(class.records().len(), 4);
/// ```
pub struct ClassBuilder {
    class: MachineClass,
    root: Option<ScopeBuilder>,
}

impl ClassBuilder {
    pub fn new(id: impl Into<ClassId>) -> Self {
        Self {
            class: MachineClass::new(id),
            root: None,
        }
    }

    pub fn parent(mut self, parent: impl Into<ClassId>) -> Self {
        self.class = self.class.with_parent(parent);
        self
    }

    /// Fix the root structural GUID. Call before [`graph`](Self::graph).
    pub fn root_guid(mut self, guid: NodeGuid) -> Self {
        self.class = self.class.with_root_guid(guid);
        self
    }

    /// Node class of the root state machine node.
    pub fn root_class(mut self, class: impl Into<String>) -> Self {
        self.class = self.class.with_root_node_class(class);
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.class = self.class.with_variable(name, value);
        self
    }

    pub fn node_template<T>(mut self, name: impl Into<String>, template: T) -> Self
    where
        T: NodeInstance + 'static,
    {
        self.class = self.class.with_node_template(name, template);
        self
    }

    pub fn instance_template(mut self, name: impl Into<String>, template: InstanceTemplate) -> Self {
        self.class = self.class.with_instance_template(name, template);
        self
    }

    /// Describe the root state machine.
    pub fn graph<F>(mut self, contents: F) -> Self
    where
        F: FnOnce(ScopeBuilder) -> ScopeBuilder,
    {
        let scope = ScopeBuilder::new(self.class.id().to_string(), self.class.root_guid());
        self.root = Some(contents(scope));
        self
    }

    /// Build the class.
    /// Returns the first authoring error encountered.
    pub fn build(self) -> Result<MachineClass, BuildError> {
        let records = match self.root {
            Some(scope) => scope.finish()?,
            None => Vec::new(),
        };
        Ok(self.class.with_records(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_spec_validates_required_fields() {
        let result = ClassBuilder::new("M")
            .graph(|g| g.initial_state("A").transition(TransitionSpec::new().from("A")))
            .build();

        assert!(matches!(result, Err(BuildError::MissingToState)));

        let result = ClassBuilder::new("M")
            .graph(|g| g.initial_state("A").transition(TransitionSpec::new().to("A")))
            .build();

        assert!(matches!(result, Err(BuildError::MissingFromState)));
    }

    #[test]
    fn unknown_state_is_reported() {
        let result = ClassBuilder::new("M")
            .graph(|g| g.initial_state("A").link("A", "Nowhere"))
            .build();

        assert_eq!(
            result.unwrap_err(),
            BuildError::UnknownState {
                name: "Nowhere".to_string()
            }
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = ClassBuilder::new("M")
            .graph(|g| g.initial_state("A").state("A"))
            .build();

        assert!(matches!(result, Err(BuildError::DuplicateState { .. })));
    }

    #[test]
    fn initial_state_is_required() {
        let result = ClassBuilder::new("M").graph(|g| g.state("A")).build();

        assert!(matches!(result, Err(BuildError::MissingInitialState { .. })));
    }

    #[test]
    fn empty_class_builds() {
        let class = ClassBuilder::new("Empty").build().unwrap();
        assert!(class.records().is_empty());
    }

    #[test]
    fn first_error_wins() {
        let result = ClassBuilder::new("M")
            .graph(|g| g.initial_state("A").link("A", "X").state(""))
            .build();

        assert!(matches!(result, Err(BuildError::UnknownState { .. })));
    }

    #[test]
    fn nested_records_are_owned_by_the_nested_machine() {
        let class = ClassBuilder::new("M")
            .graph(|g| {
                g.initial_state("A")
                    .nested(StateSpec::new("Inner"), |inner| {
                        inner.initial_state("X").state("Y").link("X", "Y")
                    })
                    .link("A", "Inner")
            })
            .build()
            .unwrap();

        let inner = class
            .records()
            .iter()
            .find(|record| record.name == "Inner")
            .unwrap();
        assert_eq!(inner.node_kind(), NodeKind::StateMachine);
        assert_eq!(inner.owner_guid, class.root_guid());

        let owned_by_inner: Vec<_> = class
            .records()
            .iter()
            .filter(|record| record.owner_guid == inner.guid)
            .map(|record| record.name.as_str())
            .collect();
        assert_eq!(owned_by_inner, vec!["X", "Y", "X -> Y"]);
    }

    #[test]
    fn nested_errors_propagate() {
        let result = ClassBuilder::new("M")
            .graph(|g| g.initial_state("A").nested(StateSpec::new("Inner"), |inner| inner.state("X")))
            .build();

        assert_eq!(
            result.unwrap_err(),
            BuildError::MissingInitialState {
                machine: "Inner".to_string()
            }
        );
    }

    #[test]
    fn transition_fields_are_recorded() {
        let class = ClassBuilder::new("M")
            .graph(|g| {
                g.initial_state("A").state("B").transition(
                    TransitionSpec::new()
                        .from("A")
                        .to("B")
                        .priority(3)
                        .class("Always")
                        .disabled(),
                )
            })
            .build()
            .unwrap();

        let transition = class.records().last().unwrap();
        assert_eq!(transition.node_class.as_deref(), Some("Always"));
        match &transition.kind {
            RecordKind::Transition {
                priority,
                can_evaluate,
                always_false,
                ..
            } => {
                assert_eq!(*priority, 3);
                assert!(!can_evaluate);
                assert!(!always_false);
            }
            other => panic!("expected a transition, got {other:?}"),
        }
    }

    #[test]
    fn reference_nodes_carry_their_target() {
        let class = ClassBuilder::new("M")
            .graph(|g| {
                g.reference(
                    StateSpec::new("Ref").initial(),
                    ReferenceSpec::new("Other").template("Fast").reuse(),
                )
            })
            .build()
            .unwrap();

        let target = class.records()[0].reference_target().unwrap();
        assert_eq!(target.class, ClassId::from("Other"));
        assert_eq!(target.template.as_deref(), Some("Fast"));
        assert!(target.reuse);
    }
}
