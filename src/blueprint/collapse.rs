//! Collapse a set of sibling states into a new nested state machine.

use super::{BuildError, MachineClass, NodeRecord, RecordKind};
use crate::core::NodeGuid;
use std::collections::HashSet;
use tracing::debug;

/// Move `states` into a new state machine node called `name`.
///
/// All states must share one owner. Transitions between collapsed states move
/// with them; transitions crossing the boundary are re-pointed at the new
/// node, so external connectivity is preserved. Collapsed states targeted from
/// outside (or the first collapsed state, if none are) become the initial
/// states of the new machine, which waits for its end state before its own
/// outgoing transitions are considered. Returns the new node's GUID.
///
/// # Example
///
/// ```rust
/// use statewright::blueprint::{collapse_states, ClassBuilder};
///
/// let mut class = ClassBuilder::new("Chain")
///     .graph(|g| {
///         g.initial_state("A")
///             .state("B")
///             .state("C")
///             .link("A", "B")
///             .link("B", "C")
///     })
///     .build()
///     .unwrap();
///
/// let b = class.records().iter().find(|r| r.name == "B").unwrap().guid;
/// let nested = collapse_states(&mut class, &[b], "Group").unwrap();
///
/// let moved = class.records().iter().find(|r| r.name == "B").unwrap();
/// assert_eq!(moved.owner_guid, nested);
/// ```
pub fn collapse_states(
    class: &mut MachineClass,
    states: &[NodeGuid],
    name: impl Into<String>,
) -> Result<NodeGuid, BuildError> {
    let first = *states.first().ok_or(BuildError::NothingToCollapse)?;
    let selected: HashSet<NodeGuid> = states.iter().copied().collect();

    let mut owner = None;
    for guid in states {
        let record = class
            .records()
            .iter()
            .find(|record| record.guid == *guid && record.is_state())
            .ok_or(BuildError::NotAState { guid: *guid })?;
        match owner {
            None => owner = Some(record.owner_guid),
            Some(owner) if owner != record.owner_guid => {
                return Err(BuildError::MixedOwners { guid: *guid });
            }
            Some(_) => {}
        }
    }
    let owner = owner.ok_or(BuildError::NotAState { guid: first })?;

    let mut entries: Vec<NodeGuid> = Vec::new();
    for record in class.records() {
        let entered_from_outside = record.owner_guid == owner
            && matches!(record.endpoints(), Some((from, to)) if !selected.contains(&from) && selected.contains(&to));
        let initial_inside = selected.contains(&record.guid) && record.is_initial();
        if entered_from_outside || initial_inside {
            let target = record.endpoints().map(|(_, to)| to).unwrap_or(record.guid);
            if !entries.contains(&target) {
                entries.push(target);
            }
        }
    }
    let was_initial = class
        .records()
        .iter()
        .any(|record| selected.contains(&record.guid) && record.is_initial());
    if entries.is_empty() {
        if let Some(record) = class.records().iter().find(|r| selected.contains(&r.guid)) {
            entries.push(record.guid);
        }
    }

    let nested = NodeGuid::new();
    let records = class.records_mut();
    for record in records.iter_mut() {
        if selected.contains(&record.guid) {
            record.owner_guid = nested;
            record.set_initial(entries.contains(&record.guid));
            continue;
        }
        if record.owner_guid != owner {
            continue;
        }
        if let RecordKind::Transition { from, to, .. } = &mut record.kind {
            match (selected.contains(from), selected.contains(to)) {
                (true, true) => record.owner_guid = nested,
                (false, true) => *to = nested,
                (true, false) => *from = nested,
                (false, false) => {}
            }
        }
    }

    let position = records
        .iter()
        .position(|record| selected.contains(&record.guid))
        .unwrap_or(records.len());
    let mut machine = NodeRecord::state_machine(name, nested, owner);
    machine.set_initial(was_initial);
    if let RecordKind::StateMachine {
        wait_for_end_state, ..
    } = &mut machine.kind
    {
        *wait_for_end_state = true;
    }
    debug!(
        owner = %owner,
        nested = %nested,
        collapsed = states.len(),
        "collapsed states into a nested state machine"
    );
    records.insert(position, machine);

    Ok(nested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{ClassBuilder, StateSpec};

    fn chain(len: usize) -> MachineClass {
        ClassBuilder::new("Chain")
            .graph(|mut g| {
                g = g.initial_state("S1");
                for i in 2..=len {
                    g = g.state(format!("S{i}")).link(format!("S{}", i - 1), format!("S{i}"));
                }
                g
            })
            .build()
            .unwrap()
    }

    fn guid(class: &MachineClass, name: &str) -> NodeGuid {
        class
            .records()
            .iter()
            .find(|record| record.name == name)
            .unwrap()
            .guid
    }

    fn transition_between(class: &MachineClass, from: NodeGuid, to: NodeGuid) -> Option<&NodeRecord> {
        class
            .records()
            .iter()
            .find(|record| record.endpoints() == Some((from, to)))
    }

    #[test]
    fn collapsing_interior_states_preserves_connectivity() {
        let mut class = chain(5);
        let (s2, s3, s4) = (guid(&class, "S2"), guid(&class, "S3"), guid(&class, "S4"));

        let nested = collapse_states(&mut class, &[s3, s4], "Nested").unwrap();

        assert!(transition_between(&class, s2, nested).is_some());
        assert!(transition_between(&class, nested, guid(&class, "S5")).is_some());

        let inside: Vec<_> = class
            .records()
            .iter()
            .filter(|record| record.owner_guid == nested && record.is_state())
            .map(|record| record.name.as_str())
            .collect();
        assert_eq!(inside, vec!["S3", "S4"]);

        let inner = transition_between(&class, s3, s4).unwrap();
        assert_eq!(inner.owner_guid, nested);

        let s3_record = class.records().iter().find(|r| r.guid == s3).unwrap();
        assert!(s3_record.is_initial());
        let s4_record = class.records().iter().find(|r| r.guid == s4).unwrap();
        assert!(!s4_record.is_initial());
    }

    #[test]
    fn collapsing_the_initial_state_makes_the_new_node_initial() {
        let mut class = chain(3);
        let (s1, s2) = (guid(&class, "S1"), guid(&class, "S2"));

        let nested = collapse_states(&mut class, &[s1, s2], "Start").unwrap();

        let machine = class.records().iter().find(|r| r.guid == nested).unwrap();
        assert!(machine.is_initial());
        assert_eq!(machine.owner_guid, class.root_guid());
        let s1_record = class.records().iter().find(|r| r.guid == s1).unwrap();
        assert!(s1_record.is_initial());
    }

    #[test]
    fn empty_selection_is_rejected() {
        let mut class = chain(2);
        assert_eq!(
            collapse_states(&mut class, &[], "X").unwrap_err(),
            BuildError::NothingToCollapse
        );
    }

    #[test]
    fn transitions_cannot_be_collapsed() {
        let mut class = chain(2);
        let transition = class.records().last().unwrap().guid;

        assert!(matches!(
            collapse_states(&mut class, &[transition], "X"),
            Err(BuildError::NotAState { .. })
        ));
    }

    #[test]
    fn states_of_different_machines_are_rejected() {
        let mut class = ClassBuilder::new("M")
            .graph(|g| {
                g.initial_state("A")
                    .nested(StateSpec::new("Inner"), |inner| inner.initial_state("X"))
            })
            .build()
            .unwrap();
        let (a, x) = (guid(&class, "A"), guid(&class, "X"));

        assert_eq!(
            collapse_states(&mut class, &[a, x], "Group").unwrap_err(),
            BuildError::MixedOwners { guid: x }
        );
    }
}
