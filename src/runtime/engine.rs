//! Execution of assembled instance graphs.
//!
//! The engine works on the graphs of one top-level instance for the duration
//! of a single operation (start, update, execute, stop). A state machine node
//! either owns its contents or, for reference nodes, delegates them to the
//! root of another instance graph; [`Engine::contents`] resolves which.

use crate::core::{
    instance_ids, node_at, node_at_mut, InstanceId, MachineGraph, Node, NodeId, NodeKind, NodeRef,
    StateHistory, TransitionEvent,
};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, trace, warn};

pub(crate) struct Engine<'a> {
    graphs: &'a mut [MachineGraph],
    history: &'a mut StateHistory,
    /// Remaining transitions that may still be chained in this operation.
    budget: usize,
    /// Nodes whose contents are currently being walked.
    busy: HashSet<NodeRef>,
}

impl<'a> Engine<'a> {
    pub(crate) fn new(
        graphs: &'a mut [MachineGraph],
        history: &'a mut StateHistory,
        max_transition_chain: usize,
    ) -> Self {
        Self {
            graphs,
            history,
            budget: max_transition_chain,
            busy: HashSet::new(),
        }
    }

    fn top() -> NodeRef {
        NodeRef::new(InstanceId::TOP, NodeId::ROOT)
    }

    fn node(&self, at: NodeRef) -> Option<&Node> {
        node_at(&*self.graphs, at)
    }

    fn with_node<R>(&mut self, at: NodeRef, f: impl FnOnce(&mut Node, &Map<String, Value>) -> R) -> Option<R> {
        self.graphs
            .get_mut(at.instance.index())
            .and_then(|graph| graph.node_with_variables(at.node))
            .map(|(node, variables)| f(node, variables))
    }

    fn is_active(&self, at: NodeRef) -> bool {
        self.node(at).is_some_and(|node| node.base().is_active())
    }

    /// The node holding the states of the machine at `at`.
    ///
    /// A reference node resolves to the root of its instance; an unresolved
    /// reference or a non-machine node has no contents.
    fn contents(&self, at: NodeRef) -> Option<NodeRef> {
        let machine = self.node(at)?.as_machine()?;
        match machine.reference() {
            Some(reference) => reference
                .instance()
                .map(|instance| NodeRef::new(instance, NodeId::ROOT)),
            None => Some(at),
        }
    }

    fn active_children(&self, machine: NodeRef) -> Vec<NodeId> {
        self.node(machine)
            .and_then(Node::as_machine)
            .map(|m| m.active_states().to_vec())
            .unwrap_or_default()
    }

    /// Enter the top-level root and everything it starts in.
    pub(crate) fn start(&mut self) {
        self.enter(Self::top());
        self.refresh_end_states();
    }

    /// Exit every active node, innermost first.
    pub(crate) fn stop(&mut self) {
        self.exit(Self::top());
        self.refresh_end_states();
    }

    /// Evaluate transitions, then update every state that did not leave.
    pub(crate) fn update(&mut self, delta_seconds: f32) {
        let top = Self::top();
        self.with_node(top, |node, variables| node.execute(Some(variables), delta_seconds));
        self.update_contents(top, delta_seconds);
        self.refresh_end_states();
    }

    /// One transition evaluation pass without running update behavior.
    pub(crate) fn execute(&mut self) {
        self.evaluate_contents(Self::top());
        self.refresh_end_states();
    }

    fn enter(&mut self, at: NodeRef) {
        self.with_node(at, |node, variables| node.enter(Some(variables)));
        trace!(node = ?self.node(at).map(Node::name), "entered");

        match self.contents(at) {
            Some(target) if target != at => {
                if self.is_active(target) {
                    warn!(
                        node = ?self.node(at).map(Node::name),
                        "referenced instance is already active, it will not be entered again"
                    );
                } else {
                    self.enter(target);
                }
            }
            Some(_) => {
                let initial = self
                    .node(at)
                    .and_then(Node::as_machine)
                    .map(|m| m.initial_states().to_vec())
                    .unwrap_or_default();
                for state in initial {
                    self.activate_child(at, state);
                }
            }
            None => {}
        }
    }

    fn exit(&mut self, at: NodeRef) {
        if !self.is_active(at) || !self.busy.insert(at) {
            return;
        }

        match self.contents(at) {
            Some(target) if target != at => self.exit(target),
            Some(_) => {
                for state in self.active_children(at) {
                    self.exit(NodeRef::new(at.instance, state));
                }
                if let Some(machine) = node_at_mut(&mut *self.graphs, at).and_then(Node::as_machine_mut) {
                    machine.active_states.clear();
                }
            }
            None => {}
        }

        self.with_node(at, |node, variables| node.exit(Some(variables)));
        self.busy.remove(&at);
    }

    /// Activate `state` inside `machine`, chaining on through it if it is a
    /// conduit or evaluates its transitions on start.
    fn activate_child(&mut self, machine: NodeRef, state: NodeId) {
        if let Some(contents) = node_at_mut(&mut *self.graphs, machine).and_then(Node::as_machine_mut) {
            if !contents.active_states.contains(&state) {
                contents.active_states.push(state);
            }
        }
        let at = NodeRef::new(machine.instance, state);
        self.enter(at);

        let chains = self.node(at).is_some_and(|node| {
            node.kind() == NodeKind::Conduit
                || node.as_state().is_some_and(|s| s.eval_transitions_on_start)
        });
        if !chains {
            return;
        }
        if self.budget == 0 {
            warn!(
                node = ?self.node(at).map(Node::name),
                "transition chain limit reached, evaluation stops here"
            );
            return;
        }
        self.budget -= 1;
        self.evaluate_state(machine, state);
    }

    fn deactivate_child(&mut self, machine: NodeRef, state: NodeId) {
        self.exit(NodeRef::new(machine.instance, state));
        if let Some(contents) = node_at_mut(&mut *self.graphs, machine).and_then(Node::as_machine_mut) {
            contents.active_states.retain(|active| *active != state);
        }
    }

    /// Try the outgoing transitions of an active state in priority order and
    /// take the first that passes. Returns whether one was taken.
    fn evaluate_state(&mut self, machine: NodeRef, state: NodeId) -> bool {
        let at = NodeRef::new(machine.instance, state);
        let Some(node) = self.node(at) else {
            return false;
        };
        if !node.base().is_active() {
            return false;
        }
        let kind = node.kind();
        let waits = node.as_machine().is_some_and(|m| m.waits_for_end_state());
        let outgoing = node.as_state().map(|s| s.outgoing().to_vec()).unwrap_or_default();

        if waits && !self.contents_in_end_state(at, &mut HashSet::new()) {
            return false;
        }
        if kind == NodeKind::Conduit
            && !self
                .with_node(at, |node, variables| node.evaluate_condition(Some(variables)))
                .unwrap_or(false)
        {
            return false;
        }

        for transition in outgoing {
            let edge = NodeRef::new(machine.instance, transition);
            let eligible = self
                .node(edge)
                .and_then(Node::as_transition)
                .is_some_and(|t| t.can_evaluate() && !t.is_always_false());
            if !eligible {
                continue;
            }
            let passes = self
                .with_node(edge, |node, variables| node.evaluate_condition(Some(variables)))
                .unwrap_or(false);
            if passes {
                self.take_transition(machine, transition);
                return true;
            }
        }
        false
    }

    /// Leave the transition's from state and enter its to state.
    pub(crate) fn take_transition(&mut self, machine: NodeRef, transition: NodeId) {
        let edge = NodeRef::new(machine.instance, transition);
        let Some((from, to)) = self
            .node(edge)
            .and_then(Node::as_transition)
            .and_then(|t| t.from_state().zip(t.to_state()))
        else {
            debug_assert!(false, "transition {edge:?} was never wired");
            return;
        };

        self.deactivate_child(machine, from);
        self.with_node(edge, |node, variables| {
            if node.base().is_initialized() {
                node.with_instance(Some(variables), |instance, ctx| instance.on_enter(ctx));
            }
        });

        let path = |id: NodeId| {
            node_at(&*self.graphs, NodeRef::new(machine.instance, id))
                .map(Node::path_guid)
                .unwrap_or_default()
        };
        let event = TransitionEvent {
            transition: path(transition),
            from: path(from),
            to: path(to),
            to_name: self
                .node(NodeRef::new(machine.instance, to))
                .map(|node| node.name().to_string())
                .unwrap_or_default(),
            timestamp: Utc::now(),
        };
        debug!(
            transition = %event.transition,
            to = %event.to_name,
            "transition taken"
        );
        self.history.record(event);

        self.activate_child(machine, to);
    }

    fn update_contents(&mut self, at: NodeRef, delta_seconds: f32) {
        let Some(target) = self.contents(at) else {
            return;
        };
        if !self.busy.insert(target) {
            return;
        }
        if target != at {
            self.with_node(target, |node, variables| node.execute(Some(variables), delta_seconds));
        }

        for state in self.active_children(target) {
            let child = NodeRef::new(target.instance, state);
            if !self.is_active(child) || self.evaluate_state(target, state) {
                continue;
            }
            self.with_node(child, |node, variables| node.execute(Some(variables), delta_seconds));
            if self.node(child).is_some_and(|node| node.as_machine().is_some()) {
                self.update_contents(child, delta_seconds);
            }
        }
        self.busy.remove(&target);
    }

    fn evaluate_contents(&mut self, at: NodeRef) {
        let Some(target) = self.contents(at) else {
            return;
        };
        if !self.busy.insert(target) {
            return;
        }
        for state in self.active_children(target) {
            let child = NodeRef::new(target.instance, state);
            if !self.is_active(child) || self.evaluate_state(target, state) {
                continue;
            }
            if self.node(child).is_some_and(|node| node.as_machine().is_some()) {
                self.evaluate_contents(child);
            }
        }
        self.busy.remove(&target);
    }

    /// Whether the active states inside the machine at `at` are all in an
    /// end state. A machine without states is trivially done.
    pub(crate) fn contents_in_end_state(&self, at: NodeRef, seen: &mut HashSet<NodeRef>) -> bool {
        let Some(target) = self.contents(at) else {
            return true;
        };
        if !seen.insert(target) {
            return false;
        }
        let result = match self.node(target).and_then(Node::as_machine) {
            Some(machine) if machine.states().is_empty() => true,
            Some(machine) => {
                !machine.active_states().is_empty()
                    && machine.active_states().iter().all(|state| {
                        self.state_in_end_state(NodeRef::new(target.instance, *state), seen)
                    })
            }
            None => true,
        };
        seen.remove(&target);
        result
    }

    fn state_in_end_state(&self, at: NodeRef, seen: &mut HashSet<NodeRef>) -> bool {
        let Some(node) = self.node(at) else {
            return false;
        };
        let structural = node.as_state().is_some_and(|s| s.is_end_state());
        node.base().is_active()
            && structural
            && (node.as_machine().is_none() || self.contents_in_end_state(at, seen))
    }

    /// Recompute the end state flag of every state node.
    pub(crate) fn refresh_end_states(&mut self) {
        let ids: Vec<NodeRef> = instance_ids(&*self.graphs)
            .flat_map(|instance| {
                self.graphs[instance.index()]
                    .node_ids()
                    .map(move |node| NodeRef::new(instance, node))
            })
            .collect();
        for at in ids {
            let in_end = match self.node(at) {
                Some(node) if node.as_state().is_none() => continue,
                Some(node) if at.node == NodeId::ROOT => {
                    node.base().is_active() && self.contents_in_end_state(at, &mut HashSet::new())
                }
                Some(_) => self.state_in_end_state(at, &mut HashSet::new()),
                None => continue,
            };
            if let Some(node) = node_at_mut(&mut *self.graphs, at) {
                node.base_mut().in_end_state = in_end;
            }
        }
    }
}
