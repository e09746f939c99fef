//! History of the transitions taken by a running instance.

use super::guid::NodeGuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One taken transition, identified by path GUIDs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub transition: NodeGuid,
    pub from: NodeGuid,
    pub to: NodeGuid,
    /// Name of the state that was entered, for diagnostics.
    pub to_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Ordered history of taken transitions.
///
/// # Example
///
/// ```rust
/// use statewright::core::{NodeGuid, StateHistory, TransitionEvent};
/// use chrono::Utc;
///
/// let (a, b, c) = (NodeGuid::new(), NodeGuid::new(), NodeGuid::new());
/// let mut history = StateHistory::new();
///
/// history.record(TransitionEvent {
///     transition: NodeGuid::new(),
///     from: a,
///     to: b,
///     to_name: "B".into(),
///     timestamp: Utc::now(),
/// });
/// history.record(TransitionEvent {
///     transition: NodeGuid::new(),
///     from: b,
///     to: c,
///     to_name: "C".into(),
///     timestamp: Utc::now(),
/// });
///
/// assert_eq!(history.get_path(), vec![a, b, c]);
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StateHistory {
    transitions: Vec<TransitionEvent>,
}

impl StateHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: TransitionEvent) {
        self.transitions.push(event);
    }

    /// States visited in order: the first source state, then the target of
    /// each transition.
    pub fn get_path(&self) -> Vec<NodeGuid> {
        let mut path = Vec::with_capacity(self.transitions.len() + 1);
        if let Some(first) = self.transitions.first() {
            path.push(first.from);
        }
        path.extend(self.transitions.iter().map(|event| event.to));
        path
    }

    /// Time between the first and the last recorded transition.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.transitions.first()?, self.transitions.last()?);
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }

    pub fn transitions(&self) -> &[TransitionEvent] {
        &self.transitions
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(from: NodeGuid, to: NodeGuid, timestamp: DateTime<Utc>) -> TransitionEvent {
        TransitionEvent {
            transition: NodeGuid::new(),
            from,
            to,
            to_name: "To".to_string(),
            timestamp,
        }
    }

    #[test]
    fn new_history_is_empty() {
        let history = StateHistory::new();
        assert!(history.transitions().is_empty());
        assert!(history.get_path().is_empty());
        assert!(history.duration().is_none());
    }

    #[test]
    fn get_path_returns_state_sequence() {
        let (a, b, c) = (NodeGuid::new(), NodeGuid::new(), NodeGuid::new());
        let mut history = StateHistory::new();
        history.record(event(a, b, Utc::now()));
        history.record(event(b, c, Utc::now()));

        assert_eq!(history.get_path(), vec![a, b, c]);
    }

    #[test]
    fn duration_spans_first_to_last() {
        let start = Utc::now();
        let mut history = StateHistory::new();
        history.record(event(NodeGuid::new(), NodeGuid::new(), start));
        history.record(event(
            NodeGuid::new(),
            NodeGuid::new(),
            start + chrono::Duration::milliseconds(40),
        ));

        assert_eq!(history.duration(), Some(Duration::from_millis(40)));
    }

    #[test]
    fn single_transition_has_zero_duration() {
        let mut history = StateHistory::new();
        history.record(event(NodeGuid::new(), NodeGuid::new(), Utc::now()));

        assert_eq!(history.duration(), Some(Duration::ZERO));
    }

    #[test]
    fn history_serializes_correctly() {
        let mut history = StateHistory::new();
        history.record(event(NodeGuid::new(), NodeGuid::new(), Utc::now()));

        let json = serde_json::to_string(&history).unwrap();
        let restored: StateHistory = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.transitions(), history.transitions());
    }

    #[test]
    fn clear_empties_history() {
        let mut history = StateHistory::new();
        history.record(event(NodeGuid::new(), NodeGuid::new(), Utc::now()));
        history.clear();

        assert!(history.transitions().is_empty());
    }
}
