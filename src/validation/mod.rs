//! Structural validation of machine classes.
//!
//! Runs every check against a class's records without instantiating
//! anything and reports all violations at once rather than stopping at the
//! first one.

use crate::blueprint::{ClassId, ClassRegistry, NodeRecord};
use crate::core::{NodeGuid, NodeKind};
use std::collections::{HashMap, HashSet};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// A structural problem found in a machine class.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StructuralViolation {
    #[error("Class '{class}' is not registered")]
    UnknownClass { class: ClassId },

    #[error("GUID {guid} is used by more than one node ('{first}' and '{second}')")]
    DuplicateGuid {
        guid: NodeGuid,
        first: String,
        second: String,
    },

    #[error("Transition '{transition}' starts at {guid} which is not a state in its machine")]
    DanglingFrom { transition: String, guid: NodeGuid },

    #[error("Transition '{transition}' ends at {guid} which is not a state in its machine")]
    DanglingTo { transition: String, guid: NodeGuid },

    #[error("Node '{node}' is owned by {owner} which is not a state machine")]
    InvalidOwner { node: String, owner: NodeGuid },

    #[error("State machine '{machine}' has states but no initial state")]
    MissingInitialState { machine: String },

    #[error("Node '{node}' uses unknown node class '{node_class}'")]
    UnknownNodeClass { node: String, node_class: String },

    #[error("Node '{node}' uses node class '{node_class}' which is meant for {meant_for} nodes")]
    IncompatibleNodeClass {
        node: String,
        node_class: String,
        meant_for: NodeKind,
    },

    #[error("Reference '{node}' targets unknown class '{class}'")]
    UnknownReferenceClass { node: String, class: ClassId },
}

type Checked = Validation<(), NonEmptyVec<StructuralViolation>>;

fn check(violation: Option<StructuralViolation>) -> Checked {
    match violation {
        Some(violation) => Validation::fail(violation),
        None => Validation::success(()),
    }
}

/// Validate the records an instance of `class` would be assembled from.
///
/// A class without records of its own is checked against the records it
/// inherits.
///
/// # Example
///
/// ```rust
/// use statewright::blueprint::{ClassBuilder, ClassId, ClassRegistry};
/// use statewright::validation::validate_class;
///
/// let mut registry = ClassRegistry::new();
/// registry.register(
///     ClassBuilder::new("Door")
///         .graph(|g| g.initial_state("Closed").state("Open").link("Closed", "Open"))
///         .build()
///         .unwrap(),
/// );
///
/// assert!(validate_class(&registry, &ClassId::from("Door")).is_success());
/// ```
pub fn validate_class(registry: &ClassRegistry, class: &ClassId) -> Checked {
    let Some((root, records)) = registry.runtime_records(class) else {
        return Validation::fail(StructuralViolation::UnknownClass {
            class: class.clone(),
        });
    };

    let mut checks = Vec::new();
    checks.extend(duplicate_guids(root, records));
    checks.extend(owners(root, records));
    checks.extend(dangling_endpoints(records));
    checks.extend(initial_states(root, class, records));
    checks.extend(node_classes(registry, records));
    checks.extend(reference_classes(registry, records));

    if let Some(root_class) = registry.class(class).and_then(|c| c.root_node_class()) {
        checks.push(node_class(registry, class.as_str(), root_class, NodeKind::StateMachine));
    }

    Validation::all_vec(checks).map(|_| ())
}

fn duplicate_guids(root: NodeGuid, records: &[NodeRecord]) -> Vec<Checked> {
    let mut seen: HashMap<NodeGuid, &str> = HashMap::new();
    seen.insert(root, "<root>");
    records
        .iter()
        .map(|record| {
            check(match seen.get(&record.guid) {
                Some(first) => Some(StructuralViolation::DuplicateGuid {
                    guid: record.guid,
                    first: first.to_string(),
                    second: record.name.clone(),
                }),
                None => {
                    seen.insert(record.guid, &record.name);
                    None
                }
            })
        })
        .collect()
}

fn machine_guids(root: NodeGuid, records: &[NodeRecord]) -> HashSet<NodeGuid> {
    records
        .iter()
        .filter(|record| record.node_kind() == NodeKind::StateMachine)
        .map(|record| record.guid)
        .chain(std::iter::once(root))
        .collect()
}

fn owners(root: NodeGuid, records: &[NodeRecord]) -> Vec<Checked> {
    let machines = machine_guids(root, records);
    records
        .iter()
        .map(|record| {
            check((!machines.contains(&record.owner_guid)).then(|| {
                StructuralViolation::InvalidOwner {
                    node: record.name.clone(),
                    owner: record.owner_guid,
                }
            }))
        })
        .collect()
}

fn dangling_endpoints(records: &[NodeRecord]) -> Vec<Checked> {
    // Endpoints must be states owned by the same machine as the transition.
    let states: HashSet<(NodeGuid, NodeGuid)> = records
        .iter()
        .filter(|record| record.is_state())
        .map(|record| (record.owner_guid, record.guid))
        .collect();

    records
        .iter()
        .filter_map(|record| record.endpoints().map(|ends| (record, ends)))
        .flat_map(|(record, (from, to))| {
            let from_ok = states.contains(&(record.owner_guid, from));
            let to_ok = states.contains(&(record.owner_guid, to));
            [
                check((!from_ok).then(|| StructuralViolation::DanglingFrom {
                    transition: record.name.clone(),
                    guid: from,
                })),
                check((!to_ok).then(|| StructuralViolation::DanglingTo {
                    transition: record.name.clone(),
                    guid: to,
                })),
            ]
        })
        .collect()
}

fn initial_states(root: NodeGuid, class: &ClassId, records: &[NodeRecord]) -> Vec<Checked> {
    let mut names: Vec<(NodeGuid, String)> = vec![(root, class.to_string())];
    names.extend(
        records
            .iter()
            .filter(|record| {
                record.node_kind() == NodeKind::StateMachine && record.reference_target().is_none()
            })
            .map(|record| (record.guid, record.name.clone())),
    );

    names
        .into_iter()
        .map(|(machine, name)| {
            let mut states = records
                .iter()
                .filter(|record| record.owner_guid == machine && record.is_state())
                .peekable();
            let has_states = states.peek().is_some();
            let has_initial = states.any(NodeRecord::is_initial);
            check((has_states && !has_initial)
                .then_some(StructuralViolation::MissingInitialState { machine: name }))
        })
        .collect()
}

fn node_class(registry: &ClassRegistry, node: &str, name: &str, kind: NodeKind) -> Checked {
    check(match registry.node_class(name) {
        None => Some(StructuralViolation::UnknownNodeClass {
            node: node.to_string(),
            node_class: name.to_string(),
        }),
        Some(class) if !class.is_compatible_with(kind) => {
            Some(StructuralViolation::IncompatibleNodeClass {
                node: node.to_string(),
                node_class: name.to_string(),
                meant_for: class.kind(),
            })
        }
        Some(_) => None,
    })
}

fn node_classes(registry: &ClassRegistry, records: &[NodeRecord]) -> Vec<Checked> {
    records
        .iter()
        .filter_map(|record| {
            record
                .node_class
                .as_deref()
                .map(|name| node_class(registry, &record.name, name, record.node_kind()))
        })
        .collect()
}

fn reference_classes(registry: &ClassRegistry, records: &[NodeRecord]) -> Vec<Checked> {
    records
        .iter()
        .filter_map(|record| record.reference_target().map(|target| (record, target)))
        .map(|(record, target)| {
            check((!registry.contains(&target.class)).then(|| {
                StructuralViolation::UnknownReferenceClass {
                    node: record.name.clone(),
                    class: target.class.clone(),
                }
            }))
        })
        .collect()
}
