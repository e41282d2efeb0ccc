// Status transition table, loadable from configuration

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::experiment::Status;

/// Allowed targets per status. Statuses absent from the map are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionTable(BTreeMap<Status, BTreeSet<Status>>);

impl Default for TransitionTable {
    fn default() -> Self {
        Self::from_pairs([
            (Status::Draft, &[Status::Review][..]),
            (Status::Review, &[Status::Draft, Status::Ship]),
            (Status::Ship, &[Status::Review, Status::Accepted]),
            (Status::Accepted, &[Status::Live]),
            (Status::Live, &[Status::Complete]),
            (Status::Complete, &[]),
        ])
    }
}

impl TransitionTable {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (Status, &'a [Status])>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(from, to)| (from, to.iter().copied().collect()))
                .collect(),
        )
    }

    pub fn allowed(&self, from: Status) -> impl Iterator<Item = Status> + '_ {
        self.0.get(&from).into_iter().flatten().copied()
    }

    pub fn can_transition(&self, from: Status, to: Status) -> bool {
        self.0.get(&from).is_some_and(|targets| targets.contains(&to))
    }

    pub fn is_terminal(&self, status: Status) -> bool {
        self.allowed(status).next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = TransitionTable::default();
        assert!(table.can_transition(Status::Draft, Status::Review));
        assert!(!table.can_transition(Status::Draft, Status::Ship));
        assert!(table.can_transition(Status::Review, Status::Draft));
        assert!(table.can_transition(Status::Ship, Status::Review));
        assert!(!table.can_transition(Status::Live, Status::Draft));
        assert!(table.is_terminal(Status::Complete));
        assert!(!table.is_terminal(Status::Accepted));
    }

    #[test]
    fn test_table_parses_custom_rules() {
        let raw = r#"{"draft": ["review"], "review": ["draft", "ship", "complete"]}"#;
        let table: TransitionTable = serde_json::from_str(raw).unwrap();
        assert!(table.can_transition(Status::Review, Status::Complete));
        assert!(table.is_terminal(Status::Ship));
    }
}
