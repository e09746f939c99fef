//! Top-level state machine instances.

use super::engine::Engine;
use crate::assembly::{Assembler, AssemblyError, AssemblyReport};
use crate::blueprint::{ClassId, ClassRegistry};
use crate::config::InstanceConfig;
use crate::core::{
    node_at, node_at_mut, InstanceId, MachineGraph, Node, NodeGuid, NodeId, NodeKind, NodeRef,
    StateHistory,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// A running instance of a machine class, together with every instance it
/// references.
///
/// # Example
///
/// ```rust
/// use statewright::blueprint::{ClassBuilder, ClassId, ClassRegistry, TransitionSpec};
/// use statewright::config::InstanceConfig;
/// use statewright::core::{Guard, NodeClass};
/// use statewright::runtime::StateMachineInstance;
///
/// let mut registry = ClassRegistry::new();
/// registry.register_node_class(NodeClass::transition("Always", Guard::always()));
/// registry.register(
///     ClassBuilder::new("Door")
///         .graph(|g| {
///             g.initial_state("Closed")
///                 .state("Open")
///                 .transition(TransitionSpec::new().from("Closed").to("Open").class("Always"))
///         })
///         .build()
///         .unwrap(),
/// );
///
/// let mut door = StateMachineInstance::new("Door", InstanceConfig::default());
/// door.initialize(&registry).unwrap();
/// door.start();
/// door.update(0.1);
///
/// let active: Vec<_> = door.active_states().iter().map(|s| s.name().to_string()).collect();
/// assert_eq!(active, vec!["Open"]);
/// assert!(door.is_in_end_state());
/// ```
#[derive(Debug)]
pub struct StateMachineInstance {
    class: ClassId,
    config: InstanceConfig,
    graphs: Vec<MachineGraph>,
    by_path: HashMap<NodeGuid, NodeRef>,
    history: StateHistory,
    report: AssemblyReport,
    initialized: bool,
    running: bool,
}

impl StateMachineInstance {
    /// Create an uninitialized instance of `class`.
    pub fn new(class: impl Into<ClassId>, config: InstanceConfig) -> Self {
        Self {
            class: class.into(),
            config,
            graphs: Vec::new(),
            by_path: HashMap::new(),
            history: StateHistory::new(),
            report: AssemblyReport::default(),
            initialized: false,
            running: false,
        }
    }

    /// Assemble the instance graph, create node instances and assign path
    /// GUIDs.
    ///
    /// Failures of nested state machines are returned in the report unless
    /// the assembly options are strict; a failure of the root always fails.
    pub fn initialize(&mut self, registry: &ClassRegistry) -> Result<&AssemblyReport, AssemblyError> {
        if self.initialized {
            warn!(class = %self.class, "instance is already initialized");
            return Ok(&self.report);
        }

        let assembly = Assembler::new(registry, self.config.assembly).assemble(&self.class)?;
        self.graphs = assembly.graphs;
        self.report = assembly.report;
        self.by_path = self
            .graphs
            .iter()
            .enumerate()
            .flat_map(|(instance, graph)| {
                graph.node_ids().filter_map(move |id| {
                    let path = graph.node(id)?.path_guid();
                    path.is_valid()
                        .then(|| (path, NodeRef::new(InstanceId(instance), id)))
                })
            })
            .collect();
        self.initialized = true;

        info!(
            class = %self.class,
            instances = self.report.instances,
            nodes = self.report.nodes,
            "state machine initialized"
        );
        Ok(&self.report)
    }

    /// Return every node to its freshly initialized state and clear history.
    pub fn reset(&mut self) {
        if !self.initialized {
            return;
        }
        for graph in &mut self.graphs {
            for node in graph.nodes_mut() {
                node.reset();
            }
        }
        self.history.clear();
        self.running = false;
    }

    /// Enter the root state machine and its initial states.
    pub fn start(&mut self) {
        if !self.initialized {
            warn!(class = %self.class, "cannot start an instance that is not initialized");
            return;
        }
        if self.running {
            return;
        }
        self.running = true;
        self.engine().start();
        debug!(class = %self.class, "state machine started");
    }

    /// Evaluate transitions and update active states.
    pub fn update(&mut self, delta_seconds: f32) {
        if !self.running {
            return;
        }
        self.engine().update(delta_seconds);
    }

    /// Evaluate transitions once without running update behavior.
    pub fn execute(&mut self) {
        if !self.running {
            return;
        }
        self.engine().execute();
    }

    /// Exit every active state.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.engine().stop();
        self.running = false;
        debug!(class = %self.class, "state machine stopped");
    }

    /// Move the active state `from` along its transition to `to`.
    ///
    /// With `require_pass` the transition's condition must hold. Returns
    /// whether the switch happened.
    pub fn switch_to_linked_state(&mut self, from: NodeGuid, to: NodeGuid, require_pass: bool) -> bool {
        if !self.running {
            return false;
        }
        let (Some(&from_at), Some(&to_at)) = (self.by_path.get(&from), self.by_path.get(&to)) else {
            return false;
        };
        let Some(from_node) = node_at(&self.graphs, from_at) else {
            return false;
        };
        let (Some(owner), Some(state)) = (from_node.base().owner(), from_node.as_state()) else {
            return false;
        };
        if !from_node.base().is_active() || from_at.instance != to_at.instance {
            return false;
        }
        let transition = state.outgoing().iter().copied().find(|id| {
            node_at(&self.graphs, NodeRef::new(from_at.instance, *id))
                .and_then(Node::as_transition)
                .is_some_and(|t| t.to_state() == Some(to_at.node))
        });
        let Some(transition) = transition else {
            return false;
        };

        if require_pass {
            let edge = NodeRef::new(from_at.instance, transition);
            let passes = self
                .graphs
                .get_mut(edge.instance.index())
                .and_then(|graph| graph.node_with_variables(edge.node))
                .is_some_and(|(node, variables)| node.evaluate_condition(Some(variables)));
            if !passes {
                return false;
            }
        }

        let mut engine = self.engine();
        engine.take_transition(owner, transition);
        engine.refresh_end_states();
        true
    }

    fn engine(&mut self) -> Engine<'_> {
        Engine::new(
            &mut self.graphs,
            &mut self.history,
            self.config.runtime.max_transition_chain,
        )
    }

    pub fn class(&self) -> &ClassId {
        &self.class
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Report of the assembly performed by [`initialize`](Self::initialize).
    pub fn report(&self) -> &AssemblyReport {
        &self.report
    }

    pub fn history(&self) -> &StateHistory {
        &self.history
    }

    /// The top-level instance graph followed by every referenced one.
    pub fn graphs(&self) -> &[MachineGraph] {
        &self.graphs
    }

    /// The top-level root state machine node.
    pub fn root(&self) -> Option<&Node> {
        self.graphs.first().map(MachineGraph::root)
    }

    pub fn variables(&self) -> Option<&Map<String, Value>> {
        self.graphs.first().map(MachineGraph::variables)
    }

    pub fn variables_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.graphs.first_mut().map(MachineGraph::variables_mut)
    }

    /// Any node by path GUID.
    pub fn node(&self, path: &NodeGuid) -> Option<&Node> {
        self.by_path
            .get(path)
            .and_then(|at| node_at(&self.graphs, *at))
    }

    pub fn state(&self, path: &NodeGuid) -> Option<&Node> {
        self.node(path).filter(|node| node.kind().is_state())
    }

    pub fn transition(&self, path: &NodeGuid) -> Option<&Node> {
        self.node(path)
            .filter(|node| node.kind() == NodeKind::Transition)
    }

    /// Every state of every instance graph, excluding instance roots.
    pub fn states(&self) -> impl Iterator<Item = &Node> {
        self.graphs
            .iter()
            .flat_map(|graph| graph.nodes().iter().skip(1))
            .filter(|node| node.kind().is_state())
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Node> {
        self.graphs
            .iter()
            .flat_map(|graph| graph.nodes().iter())
            .filter(|node| node.kind() == NodeKind::Transition)
    }

    /// Every active state, outermost first.
    pub fn active_states(&self) -> Vec<&Node> {
        self.states().filter(|node| node.base().is_active()).collect()
    }

    pub fn active_state_guids(&self) -> Vec<NodeGuid> {
        self.active_states().iter().map(|node| node.path_guid()).collect()
    }

    /// Whether the top-level state machine has reached an end state.
    pub fn is_in_end_state(&self) -> bool {
        self.root().is_some_and(|root| root.base().is_in_end_state())
    }

    /// Seconds the node with this path GUID has been active.
    pub fn time_in_state(&self, path: &NodeGuid) -> Option<f32> {
        self.node(path).map(|node| node.base().time_in_state())
    }

    /// Re-activate the given states without entering their initial states.
    pub(crate) fn activate_exactly(&mut self, states: &[(NodeRef, f32)]) {
        let top = NodeRef::new(InstanceId::TOP, NodeId::ROOT);
        let mut ordered: Vec<(NodeRef, f32)> = states.to_vec();
        ordered.sort_by_key(|(at, _)| (at.instance, at.node));

        if let Some(graph) = self.graphs.first_mut() {
            if let Some((root, variables)) = graph.node_with_variables(NodeId::ROOT) {
                root.enter(Some(variables));
            }
        }
        for (at, time) in ordered {
            if at == top {
                continue;
            }
            let Some(graph) = self.graphs.get_mut(at.instance.index()) else {
                continue;
            };
            let Some((node, variables)) = graph.node_with_variables(at.node) else {
                continue;
            };
            node.enter(Some(variables));
            node.base_mut().time_in_state = time;
            let owner = node.base().owner();
            if let Some(owner) = owner.filter(|owner| owner.instance == at.instance) {
                if let Some(machine) = node_at_mut(&mut self.graphs, owner).and_then(Node::as_machine_mut) {
                    if !machine.active_states.contains(&at.node) {
                        machine.active_states.push(at.node);
                    }
                }
            }
        }
        self.running = true;
        self.engine().refresh_end_states();
    }

    pub(crate) fn replace_history(&mut self, history: StateHistory) {
        self.history = history;
    }

    pub(crate) fn locate(&self, path: &NodeGuid) -> Option<NodeRef> {
        self.by_path.get(path).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{ClassBuilder, StateSpec, TransitionSpec};
    use crate::core::{Guard, NodeClass};

    fn registry() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry.register_node_class(NodeClass::transition("Always", Guard::always()));
        registry.register(
            ClassBuilder::new("Pair")
                .graph(|g| {
                    g.initial_state("A")
                        .state("B")
                        .transition(TransitionSpec::new().from("A").to("B").class("Always"))
                })
                .build()
                .unwrap(),
        );
        registry
    }

    fn started(registry: &ClassRegistry, class: &str) -> StateMachineInstance {
        let mut instance = StateMachineInstance::new(class, InstanceConfig::default());
        instance.initialize(registry).unwrap();
        instance.start();
        instance
    }

    fn active_names(instance: &StateMachineInstance) -> Vec<String> {
        instance
            .active_states()
            .iter()
            .map(|node| node.name().to_string())
            .collect()
    }

    #[test]
    fn uninitialized_instance_ignores_operations() {
        let mut instance = StateMachineInstance::new("Pair", InstanceConfig::default());
        instance.start();
        instance.update(1.0);
        instance.execute();
        instance.stop();
        instance.reset();

        assert!(!instance.is_running());
        assert!(instance.active_states().is_empty());
        assert!(!instance.is_in_end_state());
    }

    #[test]
    fn start_enters_initial_state() {
        let registry = registry();
        let instance = started(&registry, "Pair");

        assert_eq!(active_names(&instance), vec!["A"]);
        assert!(!instance.is_in_end_state());
    }

    #[test]
    fn update_takes_transition_and_accumulates_time() {
        let registry = registry();
        let mut instance = started(&registry, "Pair");

        instance.update(0.5);
        assert_eq!(active_names(&instance), vec!["B"]);
        assert!(instance.is_in_end_state());

        instance.update(0.25);
        let b = instance.active_state_guids()[0];
        assert_eq!(instance.time_in_state(&b), Some(0.25));
        assert_eq!(instance.history().transitions().len(), 1);
    }

    #[test]
    fn execute_evaluates_without_updating() {
        let registry = registry();
        let mut instance = started(&registry, "Pair");

        instance.execute();

        let b = instance.active_state_guids()[0];
        assert_eq!(instance.state(&b).unwrap().name(), "B");
        assert_eq!(instance.time_in_state(&b), Some(0.0));
    }

    #[test]
    fn stop_and_reset_clear_everything() {
        let registry = registry();
        let mut instance = started(&registry, "Pair");
        instance.update(0.1);

        instance.stop();
        assert!(instance.active_states().is_empty());
        assert!(!instance.root().unwrap().base().is_active());

        instance.reset();
        assert!(instance.history().transitions().is_empty());
        instance.start();
        assert_eq!(active_names(&instance), vec!["A"]);
    }

    #[test]
    fn lookup_by_path_guid() {
        let registry = registry();
        let instance = started(&registry, "Pair");

        for state in instance.states() {
            let found = instance.state(&state.path_guid()).unwrap();
            assert_eq!(found.name(), state.name());
            assert!(instance.transition(&state.path_guid()).is_none());
        }
        let transition = instance.transitions().next().unwrap();
        assert_eq!(
            instance.transition(&transition.path_guid()).unwrap().name(),
            "A -> B"
        );
        assert_eq!(instance.states().count(), 2);
    }

    #[test]
    fn switch_to_linked_state_respects_conditions() {
        let mut registry = ClassRegistry::new();
        registry.register(
            ClassBuilder::new("Gate")
                .graph(|g| g.initial_state("A").state("B").link("A", "B"))
                .build()
                .unwrap(),
        );
        let mut instance = started(&registry, "Gate");
        let guid = |instance: &StateMachineInstance, name: &str| {
            instance
                .states()
                .find(|node| node.name() == name)
                .unwrap()
                .path_guid()
        };
        let (a, b) = (guid(&instance, "A"), guid(&instance, "B"));

        assert!(!instance.switch_to_linked_state(a, b, true));
        assert!(instance.switch_to_linked_state(a, b, false));
        assert_eq!(active_names(&instance), vec!["B"]);
        assert!(!instance.switch_to_linked_state(b, a, false));
    }

    #[test]
    fn nested_machine_enters_its_initial_state() {
        let mut registry = registry();
        registry.register(
            ClassBuilder::new("Outer")
                .graph(|g| {
                    g.nested(StateSpec::new("Inner").initial(), |inner| {
                        inner
                            .initial_state("X")
                            .state("Y")
                            .transition(TransitionSpec::new().from("X").to("Y").class("Always"))
                    })
                })
                .build()
                .unwrap(),
        );
        let mut instance = started(&registry, "Outer");
        assert_eq!(active_names(&instance), vec!["Inner", "X"]);

        instance.update(0.1);
        assert_eq!(active_names(&instance), vec!["Inner", "Y"]);
        assert!(instance.is_in_end_state());
    }

    #[test]
    fn double_initialize_is_harmless() {
        let registry = registry();
        let mut instance = StateMachineInstance::new("Pair", InstanceConfig::default());
        instance.initialize(&registry).unwrap();
        let nodes = instance.report().nodes;

        instance.initialize(&registry).unwrap();
        assert_eq!(instance.report().nodes, nodes);
    }
}
