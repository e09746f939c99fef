//! Property-based tests for path identity and graph assembly.
//!
//! These tests use proptest to verify properties hold across
//! many randomly generated inputs.

use chrono::Utc;
use proptest::prelude::*;
use statewright::assembly::Assembler;
use statewright::blueprint::{ClassBuilder, ClassId, ClassRegistry, MachineClass, StateSpec};
use statewright::config::AssemblyOptions;
use statewright::core::{guid_path, NodeGuid, PathRegistry, StateHistory, TransitionEvent};
use std::collections::HashSet;
use uuid::Uuid;

prop_compose! {
    fn arbitrary_guid()(bits in any::<u128>()) -> NodeGuid {
        NodeGuid::from_uuid(Uuid::from_u128(bits))
    }
}

fn root_guid() -> impl Strategy<Value = NodeGuid> {
    arbitrary_guid().prop_filter("root GUID must not be nil", NodeGuid::is_valid)
}

prop_compose! {
    fn arbitrary_chain()(chain in prop::collection::vec(arbitrary_guid(), 0..8)) -> Vec<NodeGuid> {
        chain
    }
}

/// Leaf state count of the root plus the state count of each nested machine.
#[derive(Clone, Debug)]
struct Shape {
    leaves: usize,
    nested: Vec<usize>,
}

impl Shape {
    fn state_count(&self) -> usize {
        self.leaves + self.nested.len() + self.nested.iter().sum::<usize>()
    }

    fn class(&self, root: NodeGuid) -> MachineClass {
        let shape = self.clone();
        ClassBuilder::new("Shaped")
            .root_guid(root)
            .graph(move |mut g| {
                g = g.initial_state("L0");
                for n in 1..shape.leaves {
                    g = g.state(format!("L{n}")).link(format!("L{}", n - 1), format!("L{n}"));
                }
                for (m, size) in shape.nested.iter().enumerate() {
                    g = g.nested(StateSpec::state_machine(format!("M{m}")), |mut inner| {
                        inner = inner.initial_state(format!("M{m}S0"));
                        for s in 1..*size {
                            inner = inner.state(format!("M{m}S{s}"));
                        }
                        inner
                    });
                }
                g
            })
            .build()
            .unwrap()
    }
}

prop_compose! {
    fn arbitrary_shape()(
        leaves in 1..8usize,
        nested in prop::collection::vec(1..5usize, 0..4),
    ) -> Shape {
        Shape { leaves, nested }
    }
}

fn path_guids(registry: &ClassRegistry) -> Vec<NodeGuid> {
    let assembly = Assembler::new(registry, AssemblyOptions::default())
        .assemble(&ClassId::from("Shaped"))
        .unwrap();
    assembly
        .graphs
        .iter()
        .flat_map(|graph| graph.nodes().iter().skip(1))
        .filter(|node| node.kind().is_state())
        .map(|node| node.path_guid())
        .collect()
}

proptest! {
    #[test]
    fn path_guid_is_deterministic(chain in arbitrary_chain()) {
        let first = PathRegistry::new().path_guid(chain.iter());
        let second = PathRegistry::new().path_guid(chain.iter());
        prop_assert_eq!(first, second);
        prop_assert_eq!(first, NodeGuid::from_path(&guid_path(chain.iter())));
    }

    #[test]
    fn repeated_paths_are_disambiguated_in_order(
        chain in arbitrary_chain(),
        repeats in 2..6usize,
    ) {
        let mut paths = PathRegistry::new();
        let guids: Vec<NodeGuid> = (0..repeats).map(|_| paths.path_guid(chain.iter())).collect();

        let distinct: HashSet<_> = guids.iter().collect();
        prop_assert_eq!(distinct.len(), repeats);

        let mut again = PathRegistry::new();
        let replay: Vec<NodeGuid> = (0..repeats).map(|_| again.path_guid(chain.iter())).collect();
        prop_assert_eq!(guids, replay);
        prop_assert_eq!(paths.occurrences(&guid_path(chain.iter())), repeats);
    }

    #[test]
    fn assembly_yields_every_state_once(shape in arbitrary_shape(), root in root_guid()) {
        let mut registry = ClassRegistry::new();
        registry.register(shape.class(root));

        let guids = path_guids(&registry);

        prop_assert_eq!(guids.len(), shape.state_count());
        let distinct: HashSet<_> = guids.iter().collect();
        prop_assert_eq!(distinct.len(), guids.len());
    }

    #[test]
    fn reassembly_reproduces_path_guids(shape in arbitrary_shape(), root in root_guid()) {
        let mut registry = ClassRegistry::new();
        registry.register(shape.class(root));

        let first: HashSet<NodeGuid> = path_guids(&registry).into_iter().collect();
        let second: HashSet<NodeGuid> = path_guids(&registry).into_iter().collect();

        prop_assert_eq!(first, second);
    }

    #[test]
    fn history_path_follows_recorded_transitions(
        states in prop::collection::vec(arbitrary_guid(), 1..10)
    ) {
        let mut history = StateHistory::new();
        let start = NodeGuid::new();
        let mut from = start;
        for to in &states {
            history.record(TransitionEvent {
                transition: NodeGuid::new(),
                from,
                to: *to,
                to_name: to.to_string(),
                timestamp: Utc::now(),
            });
            from = *to;
        }

        let mut expected = vec![start];
        expected.extend(states.iter().copied());
        prop_assert_eq!(history.get_path(), expected);
    }

    #[test]
    fn history_roundtrip_serialization(
        states in prop::collection::vec(arbitrary_guid(), 0..5)
    ) {
        let mut history = StateHistory::new();
        for pair in states.windows(2) {
            history.record(TransitionEvent {
                transition: NodeGuid::new(),
                from: pair[0],
                to: pair[1],
                to_name: "next".to_string(),
                timestamp: Utc::now(),
            });
        }

        let json = serde_json::to_string(&history).unwrap();
        let deserialized: StateHistory = serde_json::from_str(&json).unwrap();

        prop_assert_eq!(history.transitions(), deserialized.transitions());
    }
}
