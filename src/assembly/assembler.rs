//! Graph assembly: turning flattened records into instance graphs.

use super::error::AssemblyError;
use super::resolver::{Generation, Resolution};
use crate::blueprint::{ClassId, ClassRegistry, NodeRecord};
use crate::config::AssemblyOptions;
use crate::core::{
    node_at, node_at_mut, InstanceId, MachineGraph, MachineNode, Node, NodeGuid, NodeId, NodeKind,
    NodeRef, PathRegistry,
};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, error, warn};

/// What happened during a top-level assembly besides the result itself.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssemblyReport {
    /// Nested state machines that failed to assemble and were skipped.
    pub failures: Vec<AssemblyError>,
    /// Number of instance graphs created, the top-level one included.
    pub instances: usize,
    pub nodes: usize,
}

impl AssemblyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn has_circular_reference(&self) -> bool {
        self.failures.iter().any(AssemblyError::is_circular_reference)
    }
}

/// The result of a successful top-level assembly.
#[derive(Debug)]
pub struct Assembly {
    pub graphs: Vec<MachineGraph>,
    pub report: AssemblyReport,
}

/// Builds the instance graphs of one top-level state machine instance.
///
/// # Example
///
/// ```rust
/// use statewright::assembly::Assembler;
/// use statewright::blueprint::{ClassBuilder, ClassId, ClassRegistry};
/// use statewright::config::AssemblyOptions;
///
/// let mut registry = ClassRegistry::new();
/// registry.register(
///     ClassBuilder::new("Door")
///         .graph(|g| g.initial_state("Closed").state("Open").link("Closed", "Open"))
///         .build()
///         .unwrap(),
/// );
///
/// let assembly = Assembler::new(&registry, AssemblyOptions::default())
///     .assemble(&ClassId::from("Door"))
///     .unwrap();
///
/// assert_eq!(assembly.graphs.len(), 1);
/// assert_eq!(assembly.graphs[0].nodes().len(), 4);
/// assert!(assembly.report.is_clean());
/// ```
pub struct Assembler<'r> {
    registry: &'r ClassRegistry,
    options: AssemblyOptions,
    generation: Generation,
    graphs: Vec<MachineGraph>,
    /// Structural GUIDs accepted so far, one set per instance being built.
    accepted: Vec<HashSet<NodeGuid>>,
    report: AssemblyReport,
}

impl<'r> Assembler<'r> {
    pub fn new(registry: &'r ClassRegistry, options: AssemblyOptions) -> Self {
        Self {
            registry,
            options,
            generation: if options.dry_run {
                Generation::dry_run()
            } else {
                Generation::new()
            },
            graphs: Vec::new(),
            accepted: Vec::new(),
            report: AssemblyReport::default(),
        }
    }

    /// Assemble a top-level instance of `class`.
    ///
    /// Path GUIDs are assigned once the whole graph exists; node instances
    /// are created unless this is a dry run.
    pub fn assemble(mut self, class: &ClassId) -> Result<Assembly, AssemblyError> {
        let top = self.instantiate(class, None, None);
        let finished = std::mem::take(&mut self.generation).finish();
        top?;
        finished?;

        assign_path_guids(&mut self.graphs);
        if !self.options.dry_run {
            self.initialize_nodes();
        }

        self.report.instances = self.graphs.len();
        self.report.nodes = self.graphs.iter().map(|graph| graph.nodes().len()).sum();
        debug!(
            class = %class,
            instances = self.report.instances,
            nodes = self.report.nodes,
            failures = self.report.failures.len(),
            dry_run = self.options.dry_run,
            "assembled state machine"
        );

        Ok(Assembly {
            graphs: self.graphs,
            report: self.report,
        })
    }

    /// Create the instance graph of `class` and assemble its root machine.
    ///
    /// On failure every graph created for this instance is discarded again.
    fn instantiate(
        &mut self,
        class_id: &ClassId,
        overrides: Option<&Map<String, Value>>,
        owner: Option<NodeRef>,
    ) -> Result<InstanceId, AssemblyError> {
        let registry = self.registry;
        let unknown = || AssemblyError::UnknownClass {
            class: class_id.clone(),
        };
        let class = registry.class(class_id).ok_or_else(unknown)?;
        let (root_guid, records) = registry.runtime_records(class_id).ok_or_else(unknown)?;

        let mut variables = Map::new();
        for ancestor in registry.lineage(class_id).iter().rev() {
            variables.extend(ancestor.variables().clone());
        }
        if let Some(overrides) = overrides {
            variables.extend(overrides.clone());
        }

        let mut root = Node::root(class_id.to_string(), root_guid);
        root.base_mut().set_owner(owner);
        if let Some(name) = class.root_node_class() {
            self.assign_class(&mut root, name);
        }

        let instance = InstanceId(self.graphs.len());
        let mut graph = MachineGraph::new(class_id.clone(), root, variables);
        graph.set_reference_owner(owner);
        self.graphs.push(graph);
        self.accepted.push(HashSet::from([root_guid]));

        self.generation.begin(class_id);
        let result = self.assemble_machine(instance, NodeId::ROOT, records);
        self.generation.end(class_id);
        self.accepted.pop();

        if result.is_err() {
            self.graphs.truncate(instance.0);
            self.generation.discard_from(instance);
        }
        result.map(|()| instance)
    }

    fn assign_class(&self, node: &mut Node, name: &str) {
        match self.registry.node_class(name) {
            Some(class) => {
                node.set_node_instance_class(class.clone());
            }
            None => warn!(
                node = node.name(),
                class = name,
                "unknown node class, the default class will be used"
            ),
        }
    }

    /// Claim `guid` for the instance being built; false if already taken.
    fn accept(&mut self, guid: NodeGuid) -> bool {
        self.accepted.last_mut().map_or(true, |seen| seen.insert(guid))
    }

    fn graph_mut(&mut self, instance: InstanceId) -> Result<&mut MachineGraph, AssemblyError> {
        self.graphs
            .get_mut(instance.0)
            .ok_or_else(|| AssemblyError::InvariantViolation(format!("missing instance {instance:?}")))
    }

    fn machine_mut(&mut self, at: NodeRef) -> Result<&mut MachineNode, AssemblyError> {
        node_at_mut(&mut self.graphs, at)
            .and_then(Node::as_machine_mut)
            .ok_or_else(|| AssemblyError::InvariantViolation(format!("{at:?} is not a state machine")))
    }

    /// Populate the state machine node at `machine` from `records`.
    fn assemble_machine(
        &mut self,
        instance: InstanceId,
        machine: NodeId,
        records: &'r [NodeRecord],
    ) -> Result<(), AssemblyError> {
        let at = NodeRef::new(instance, machine);
        let node = node_at(&self.graphs, at)
            .ok_or_else(|| AssemblyError::InvariantViolation(format!("missing node {at:?}")))?;
        if node.reference().is_some() {
            return self.resolve_reference(at);
        }

        let machine_guid = node.guid();
        let machine_name = node.name().to_string();
        let class = self.graphs[instance.0].class().clone();

        for record in records
            .iter()
            .filter(|record| record.owner_guid == machine_guid && record.is_state())
        {
            if !self.accept(record.guid) {
                return Err(self.duplicate(&class, &machine_name, record));
            }

            let mut node = Node::from_record(record);
            if let Some(name) = &record.node_class {
                self.assign_class(&mut node, name);
            }
            node.base_mut().set_owner(Some(at));
            let is_machine = node.kind() == NodeKind::StateMachine;

            let id = self.graph_mut(instance)?.push(node);
            let contents = self.machine_mut(at)?;
            contents.states.push(id);
            contents.state_map.insert(record.guid, id);
            if record.is_initial() {
                contents.initial_states.push(id);
            }

            if is_machine {
                self.assemble_nested(instance, id, records)?;
            }
        }

        for record in records
            .iter()
            .filter(|record| record.owner_guid == machine_guid)
        {
            let Some((from_guid, to_guid)) = record.endpoints() else {
                continue;
            };
            if !self.accept(record.guid) {
                return Err(self.duplicate(&class, &machine_name, record));
            }
            let contents = self.machine_mut(at)?;
            let from = contents.state_by_guid(&from_guid);
            let to = contents.state_by_guid(&to_guid);
            let (from, to) = match (from, to) {
                (Some(from), Some(to)) => (from, to),
                (None, _) => {
                    error!(
                        class = %class,
                        machine = %machine_name,
                        transition = %record.name,
                        guid = %from_guid,
                        "transition could not locate its from state"
                    );
                    return Err(AssemblyError::MissingFromState {
                        class,
                        machine: machine_name,
                        transition: record.name.clone(),
                        guid: from_guid,
                    });
                }
                (_, None) => {
                    error!(
                        class = %class,
                        machine = %machine_name,
                        transition = %record.name,
                        guid = %to_guid,
                        "transition could not locate its to state"
                    );
                    return Err(AssemblyError::MissingToState {
                        class,
                        machine: machine_name,
                        transition: record.name.clone(),
                        guid: to_guid,
                    });
                }
            };

            let mut node = Node::from_record(record);
            if let Some(name) = &record.node_class {
                self.assign_class(&mut node, name);
            }
            node.base_mut().set_owner(Some(at));
            if let Some(transition) = node.as_transition_mut() {
                transition.from = Some(from);
                transition.to = Some(to);
            }

            let graph = self.graph_mut(instance)?;
            let id = graph.push(node);
            if let Some(state) = graph.node_mut(from).and_then(Node::as_state_mut) {
                state.outgoing.push(id);
            }
            if let Some(state) = graph.node_mut(to).and_then(Node::as_state_mut) {
                state.incoming.push(id);
            }
            let contents = self.machine_mut(at)?;
            contents.transitions.push(id);
            contents.transition_map.insert(record.guid, id);
        }

        let states = self.machine_mut(at)?.states.clone();
        finalize_states(self.graph_mut(instance)?, &states);
        Ok(())
    }

    /// Assemble a nested machine, applying the nested failure policy.
    fn assemble_nested(
        &mut self,
        instance: InstanceId,
        machine: NodeId,
        records: &'r [NodeRecord],
    ) -> Result<(), AssemblyError> {
        match self.assemble_machine(instance, machine, records) {
            Ok(()) => Ok(()),
            Err(err) if self.options.strict => Err(err),
            Err(err) => {
                error!(error = %err, "nested state machine failed to assemble and was skipped");
                self.report.failures.push(err);
                Ok(())
            }
        }
    }

    fn duplicate(&self, class: &ClassId, machine: &str, record: &NodeRecord) -> AssemblyError {
        error!(
            class = %class,
            machine,
            node = %record.name,
            guid = %record.guid,
            "found a node whose guid has already been added"
        );
        AssemblyError::DuplicateGuid {
            class: class.clone(),
            machine: machine.to_string(),
            node: record.name.clone(),
            guid: record.guid,
        }
    }

    /// Point the reference node at `site` to an instance of its target class.
    fn resolve_reference(&mut self, site: NodeRef) -> Result<(), AssemblyError> {
        let registry = self.registry;
        let (reference, site_name) = match node_at(&self.graphs, site) {
            Some(node) => match node.reference() {
                Some(reference) => (reference.clone(), node.name().to_string()),
                None => return Ok(()),
            },
            None => return Ok(()),
        };

        let mut target = reference.class.clone();
        let mut overrides = None;
        if let (false, Some(template_name)) = (self.options.dry_run, &reference.template) {
            let owner_class = self.graphs[site.instance.0].class().clone();
            match registry.find_instance_template(&owner_class, template_name) {
                None => error!(
                    template = %template_name,
                    node = %site_name,
                    class = %owner_class,
                    "could not find reference template, loading defaults"
                ),
                Some(template) => {
                    if template.class != target {
                        warn!(
                            node = %site_name,
                            template = %template_name,
                            template_class = %template.class,
                            expected = %target,
                            "reference template class differs from the referenced class, using the template's class"
                        );
                        target = template.class.clone();
                    }
                    overrides = Some(&template.variables);
                }
            }
        }

        if !registry.contains(&target) {
            error!(node = %site_name, class = %target, "could not create reference");
            return Err(AssemblyError::UnknownClass { class: target });
        }

        match self
            .generation
            .resolve(&target, reference.reuse, site, &site_name)?
        {
            Resolution::Shared(instance) => self.point_reference(site, instance),
            Resolution::Pending => {}
            Resolution::Instantiate if self.options.dry_run => {}
            Resolution::Instantiate => match self.instantiate(&target, overrides, Some(site)) {
                Ok(instance) => {
                    if reference.reuse {
                        for waiter in self.generation.complete_shared(&target, instance) {
                            self.point_reference(waiter, instance);
                        }
                    }
                    self.point_reference(site, instance);
                }
                Err(err) => {
                    if reference.reuse {
                        self.generation.abandon_shared(&target);
                    }
                    return Err(err);
                }
            },
        }
        Ok(())
    }

    fn point_reference(&mut self, site: NodeRef, instance: InstanceId) {
        if let Some(reference) = node_at_mut(&mut self.graphs, site).and_then(Node::reference_mut) {
            reference.instance = Some(instance);
        }
    }

    fn initialize_nodes(&mut self) {
        let registry = self.registry;
        for graph in &mut self.graphs {
            let class = graph.class().clone();
            let templates = registry.template_scope(&class);
            for node in graph.nodes_mut() {
                node.initialize(&templates);
            }
        }
    }
}

/// Sort outgoing transitions by priority and flag structural end states.
fn finalize_states(graph: &mut MachineGraph, states: &[NodeId]) {
    for &state in states {
        let Some(mut outgoing) = graph
            .node(state)
            .and_then(Node::as_state)
            .map(|s| s.outgoing.clone())
        else {
            continue;
        };
        outgoing.sort_by_key(|id| {
            graph
                .node(*id)
                .and_then(Node::as_transition)
                .map_or(0, |transition| transition.priority)
        });
        let is_end_state = outgoing.iter().all(|id| {
            graph
                .node(*id)
                .and_then(Node::as_transition)
                .map_or(true, |t| t.is_self_transition() || t.always_false)
        });
        if let Some(node) = graph.node_mut(state).and_then(Node::as_state_mut) {
            node.outgoing = outgoing;
            node.is_end_state = is_end_state;
        }
    }
}

/// Assign every reachable node its path GUID.
///
/// The walk is depth first from the top-level root: a machine node, then its
/// states in order (descending into nested and referenced machines), then its
/// transitions. A shared instance is walked once, from the first reference
/// that reaches it.
fn assign_path_guids(graphs: &mut [MachineGraph]) {
    if graphs.is_empty() {
        return;
    }
    let mut paths = PathRegistry::new();
    let mut visited = HashSet::from([InstanceId::TOP]);
    let mut chain = Vec::new();
    visit_machine(
        graphs,
        NodeRef::new(InstanceId::TOP, NodeId::ROOT),
        &mut chain,
        &mut paths,
        &mut visited,
    );
}

fn visit_machine(
    graphs: &mut [MachineGraph],
    at: NodeRef,
    chain: &mut Vec<NodeGuid>,
    paths: &mut PathRegistry,
    visited: &mut HashSet<InstanceId>,
) {
    let Some(node) = node_at_mut(graphs, at) else {
        return;
    };
    chain.push(node.guid());
    node.base_mut().set_path_guid(paths.path_guid(chain.iter()));

    let (states, transitions, referenced) = match node.as_machine() {
        Some(machine) => (
            machine.states.clone(),
            machine.transitions.clone(),
            machine.reference.as_ref().and_then(|r| r.instance),
        ),
        None => (Vec::new(), Vec::new(), None),
    };

    if let Some(target) = referenced {
        if visited.insert(target) {
            visit_machine(graphs, NodeRef::new(target, NodeId::ROOT), chain, paths, visited);
        }
    }
    for state in states {
        let child = NodeRef::new(at.instance, state);
        if node_at(graphs, child).is_some_and(|node| node.as_machine().is_some()) {
            visit_machine(graphs, child, chain, paths, visited);
        } else {
            visit_leaf(graphs, child, chain, paths);
        }
    }
    for transition in transitions {
        visit_leaf(graphs, NodeRef::new(at.instance, transition), chain, paths);
    }
    chain.pop();
}

fn visit_leaf(graphs: &mut [MachineGraph], at: NodeRef, chain: &mut Vec<NodeGuid>, paths: &mut PathRegistry) {
    if let Some(node) = node_at_mut(graphs, at) {
        chain.push(node.guid());
        node.base_mut().set_path_guid(paths.path_guid(chain.iter()));
        chain.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{ClassBuilder, MachineClass, ReferenceSpec, StateSpec, TransitionSpec};
    use crate::core::{guid_path, Guard, NodeClass};

    fn registry_with(classes: Vec<MachineClass>) -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry.register_node_class(NodeClass::transition("Always", Guard::always()));
        for class in classes {
            registry.register(class);
        }
        registry
    }

    fn assemble(registry: &ClassRegistry, class: &str) -> Result<Assembly, AssemblyError> {
        Assembler::new(registry, AssemblyOptions::default()).assemble(&ClassId::from(class))
    }

    fn find<'a>(graph: &'a MachineGraph, name: &str) -> &'a Node {
        graph.nodes().iter().find(|node| node.name() == name).unwrap()
    }

    #[test]
    fn states_and_transitions_are_wired() {
        let registry = registry_with(vec![ClassBuilder::new("M")
            .graph(|g| g.initial_state("A").state("B").link("A", "B"))
            .build()
            .unwrap()]);

        let assembly = assemble(&registry, "M").unwrap();
        let graph = &assembly.graphs[0];
        let root = graph.root().as_machine().unwrap();

        assert_eq!(root.states().len(), 2);
        assert_eq!(root.initial_states().len(), 1);
        assert_eq!(root.transitions().len(), 1);

        let a = find(graph, "A").as_state().unwrap();
        let b = find(graph, "B").as_state().unwrap();
        assert_eq!(a.outgoing().len(), 1);
        assert_eq!(b.incoming().len(), 1);
        assert!(!a.is_end_state());
        assert!(b.is_end_state());
    }

    #[test]
    fn outgoing_transitions_are_sorted_by_priority() {
        let registry = registry_with(vec![ClassBuilder::new("M")
            .graph(|g| {
                g.initial_state("A")
                    .state("B")
                    .state("C")
                    .state("D")
                    .transition(TransitionSpec::new().from("A").to("B").priority(3))
                    .transition(TransitionSpec::new().from("A").to("C").priority(1))
                    .transition(TransitionSpec::new().from("A").to("D").priority(2))
            })
            .build()
            .unwrap()]);

        let assembly = assemble(&registry, "M").unwrap();
        let graph = &assembly.graphs[0];
        let priorities: Vec<i32> = find(graph, "A")
            .as_state()
            .unwrap()
            .outgoing()
            .iter()
            .map(|id| graph.node(*id).unwrap().as_transition().unwrap().priority())
            .collect();

        assert_eq!(priorities, vec![1, 2, 3]);
    }

    #[test]
    fn self_transitions_do_not_prevent_end_state() {
        let registry = registry_with(vec![ClassBuilder::new("M")
            .graph(|g| {
                g.initial_state("A")
                    .state("B")
                    .link("A", "B")
                    .link("B", "B")
                    .transition(TransitionSpec::new().from("A").to("A").always_false())
            })
            .build()
            .unwrap()]);

        let assembly = assemble(&registry, "M").unwrap();
        let graph = &assembly.graphs[0];

        assert!(find(graph, "B").as_state().unwrap().is_end_state());
        assert!(!find(graph, "A").as_state().unwrap().is_end_state());
    }

    #[test]
    fn dangling_transition_fails_the_root() {
        let root = NodeGuid::new();
        let a = NodeGuid::new();
        let class = MachineClass::new("M").with_root_guid(root).with_records(vec![
            NodeRecord::state("A", a, root).initial(),
            NodeRecord::transition("T", NodeGuid::new(), root, a, NodeGuid::new()),
        ]);
        let registry = registry_with(vec![class]);

        let result = assemble(&registry, "M");

        assert!(matches!(result, Err(AssemblyError::MissingToState { .. })));
    }

    #[test]
    fn dangling_transition_in_nested_machine_is_reported() {
        let root = NodeGuid::new();
        let nested = NodeGuid::new();
        let x = NodeGuid::new();
        let class = MachineClass::new("M").with_root_guid(root).with_records(vec![
            NodeRecord::state_machine("Nested", nested, root).initial(),
            NodeRecord::state("X", x, nested).initial(),
            NodeRecord::transition("T", NodeGuid::new(), nested, NodeGuid::new(), x),
        ]);
        let registry = registry_with(vec![class]);

        let lenient = assemble(&registry, "M").unwrap();
        assert_eq!(lenient.report.failures.len(), 1);
        assert!(matches!(
            lenient.report.failures[0],
            AssemblyError::MissingFromState { .. }
        ));

        let strict = Assembler::new(&registry, AssemblyOptions::new().strict(true))
            .assemble(&ClassId::from("M"));
        assert!(matches!(strict, Err(AssemblyError::MissingFromState { .. })));
    }

    #[test]
    fn duplicate_state_guid_is_rejected() {
        let root = NodeGuid::new();
        let a = NodeGuid::new();
        let class = MachineClass::new("M").with_root_guid(root).with_records(vec![
            NodeRecord::state("A", a, root).initial(),
            NodeRecord::state("A again", a, root),
        ]);
        let registry = registry_with(vec![class]);

        assert!(matches!(
            assemble(&registry, "M"),
            Err(AssemblyError::DuplicateGuid { .. })
        ));
    }

    #[test]
    fn unknown_class_is_an_error() {
        let registry = registry_with(vec![]);
        assert!(matches!(
            assemble(&registry, "Missing"),
            Err(AssemblyError::UnknownClass { .. })
        ));
    }

    #[test]
    fn path_guids_follow_the_owner_chain() {
        let class = ClassBuilder::new("M")
            .graph(|g| {
                g.initial_state("A")
                    .nested(StateSpec::new("Inner"), |inner| inner.initial_state("X"))
            })
            .build()
            .unwrap();
        let root = class.root_guid();
        let registry = registry_with(vec![class]);

        let assembly = assemble(&registry, "M").unwrap();
        let graph = &assembly.graphs[0];
        let inner = find(graph, "Inner");
        let x = find(graph, "X");

        assert_eq!(graph.root().path_guid(), NodeGuid::from_path(&guid_path([&root])));
        assert_eq!(
            x.path_guid(),
            NodeGuid::from_path(&guid_path([&root, &inner.guid(), &x.guid()]))
        );
    }

    #[test]
    fn sibling_references_get_distinct_paths() {
        let child = ClassBuilder::new("Child")
            .graph(|g| g.initial_state("Leaf"))
            .build()
            .unwrap();
        let parent = ClassBuilder::new("Parent")
            .graph(|g| {
                g.reference(StateSpec::new("R1").initial(), ReferenceSpec::new("Child"))
                    .reference(StateSpec::new("R2"), ReferenceSpec::new("Child"))
            })
            .build()
            .unwrap();
        let registry = registry_with(vec![child, parent]);

        let assembly = assemble(&registry, "Parent").unwrap();

        assert_eq!(assembly.graphs.len(), 3);
        let leaves: HashSet<NodeGuid> = assembly.graphs[1..]
            .iter()
            .map(|graph| find(graph, "Leaf").path_guid())
            .collect();
        assert_eq!(leaves.len(), 2);
    }

    #[test]
    fn template_variables_override_class_defaults() {
        let child = ClassBuilder::new("Child")
            .variable("speed", 1)
            .variable("color", "red")
            .graph(|g| g.initial_state("Leaf"))
            .build()
            .unwrap();
        let parent = ClassBuilder::new("Parent")
            .instance_template(
                "Fast",
                crate::blueprint::InstanceTemplate::new("Child").with_variable("speed", 9),
            )
            .graph(|g| {
                g.reference(
                    StateSpec::new("R").initial(),
                    ReferenceSpec::new("Child").template("Fast"),
                )
            })
            .build()
            .unwrap();
        let registry = registry_with(vec![child, parent]);

        let assembly = assemble(&registry, "Parent").unwrap();
        let variables = assembly.graphs[1].variables();

        assert_eq!(variables.get("speed"), Some(&Value::from(9)));
        assert_eq!(variables.get("color"), Some(&Value::from("red")));
    }

    #[test]
    fn dry_run_skips_references_and_instances() {
        let child = ClassBuilder::new("Child")
            .graph(|g| g.initial_state("Leaf"))
            .build()
            .unwrap();
        let parent = ClassBuilder::new("Parent")
            .graph(|g| g.reference(StateSpec::new("R").initial(), ReferenceSpec::new("Child")))
            .build()
            .unwrap();
        let registry = registry_with(vec![child, parent]);

        let assembly = Assembler::new(&registry, AssemblyOptions::new().dry_run(true))
            .assemble(&ClassId::from("Parent"))
            .unwrap();

        assert_eq!(assembly.graphs.len(), 1);
        assert!(assembly.graphs[0]
            .nodes()
            .iter()
            .all(|node| !node.base().is_initialized()));
    }

    #[test]
    fn node_classes_are_assigned_from_records() {
        let registry = registry_with(vec![ClassBuilder::new("M")
            .graph(|g| {
                g.initial_state("A")
                    .state("B")
                    .transition(TransitionSpec::new().from("A").to("B").class("Always"))
            })
            .build()
            .unwrap()]);

        let assembly = assemble(&registry, "M").unwrap();
        let transition = find(&assembly.graphs[0], "A -> B");

        assert_eq!(
            transition.base().instance_class().map(|class| class.name()),
            Some("Always")
        );
    }
}
