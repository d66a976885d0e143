//! Commits and change sets.
//!
//! A commit is immutable once written: it records who changed what on which
//! branch at which logical timestamp. The visible state of a branch is the
//! fold of its own commits plus all ancestor commits up to the branch's base
//! timestamp; [`ChangeSet::fold`] collapses a commit sequence into the net
//! per-component outcome, which is what merges replay and compares classify.

use crate::component::{ComponentIdentifier, ComponentPayload};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a commit touched one component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// One component-level change inside a commit.
///
/// `payload` carries the full post-change component for `Added` and
/// `Changed`; removals are tombstones and carry none.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentChange {
    pub component: ComponentIdentifier,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<ComponentPayload>,
}

impl ComponentChange {
    pub fn added(component: ComponentIdentifier, payload: ComponentPayload) -> Self {
        Self {
            component,
            kind: ChangeKind::Added,
            payload: Some(payload),
        }
    }

    pub fn changed(component: ComponentIdentifier, payload: ComponentPayload) -> Self {
        Self {
            component,
            kind: ChangeKind::Changed,
            payload: Some(payload),
        }
    }

    pub fn removed(component: ComponentIdentifier) -> Self {
        Self {
            component,
            kind: ChangeKind::Removed,
            payload: None,
        }
    }
}

/// The changes of one commit, at most one entry per component.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    changes: Vec<ComponentChange>,
}

impl ChangeSet {
    pub fn new(changes: Vec<ComponentChange>) -> Self {
        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &[ComponentChange] {
        &self.changes
    }

    pub fn push(&mut self, change: ComponentChange) {
        self.changes.push(change);
    }

    /// Collapses an ordered sequence of change sets into the net outcome per
    /// component.
    ///
    /// Rules, applied left to right:
    /// - `Added` then `Changed` stays `Added` (with the newest payload) — the
    ///   component is still new to anyone who has not seen this history;
    /// - `Added` then `Removed` cancels out entirely;
    /// - `Changed` then `Removed` is `Removed`;
    /// - `Removed` then `Added` is `Changed` (the component existed before
    ///   the sequence began and exists after, with a new payload).
    pub fn fold<'a>(sets: impl IntoIterator<Item = &'a ChangeSet>) -> ChangeSet {
        let mut net: BTreeMap<ComponentIdentifier, ComponentChange> = BTreeMap::new();
        for set in sets {
            for change in &set.changes {
                match net.get_mut(&change.component) {
                    None => {
                        net.insert(change.component.clone(), change.clone());
                    }
                    Some(existing) => match (existing.kind, change.kind) {
                        (ChangeKind::Added, ChangeKind::Removed) => {
                            net.remove(&change.component);
                        }
                        (ChangeKind::Added, _) => {
                            existing.payload = change.payload.clone();
                        }
                        (ChangeKind::Removed, ChangeKind::Added) => {
                            existing.kind = ChangeKind::Changed;
                            existing.payload = change.payload.clone();
                        }
                        (_, kind) => {
                            existing.kind = kind;
                            existing.payload = change.payload.clone();
                        }
                    },
                }
            }
        }
        ChangeSet {
            changes: net.into_values().collect(),
        }
    }

    /// Looks up the net change for one component.
    pub fn get(&self, component: &ComponentIdentifier) -> Option<&ComponentChange> {
        self.changes.iter().find(|c| &c.component == component)
    }
}

impl IntoIterator for ChangeSet {
    type Item = ComponentChange;
    type IntoIter = std::vec::IntoIter<ComponentChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

/// An immutable commit on a branch.
///
/// `timestamp` is a logical store-wide monotonic value; `branch_id` pins the
/// commit to one branch generation so reopened branches do not inherit the
/// commits they replayed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Commit {
    pub branch_id: u64,
    pub branch_path: String,
    pub timestamp: i64,
    pub author: String,
    pub comment: String,
    pub changes: ChangeSet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentCategory, ConceptPayload, DefinitionStatus};

    fn concept_id(id: &str) -> ComponentIdentifier {
        ComponentIdentifier::new(ComponentCategory::Concept, id)
    }

    fn payload(active: bool) -> ComponentPayload {
        ComponentPayload::Concept(ConceptPayload {
            module_id: "900000000000207008".to_owned(),
            active,
            definition_status: DefinitionStatus::Primitive,
            refset_kind: None,
        })
    }

    #[test]
    fn add_then_change_folds_to_add_with_new_payload() {
        let first = ChangeSet::new(vec![ComponentChange::added(concept_id("c1"), payload(true))]);
        let second =
            ChangeSet::new(vec![ComponentChange::changed(concept_id("c1"), payload(false))]);
        let net = ChangeSet::fold([&first, &second]);
        let change = net.get(&concept_id("c1")).unwrap();
        assert_eq!(change.kind, ChangeKind::Added);
        assert_eq!(change.payload, Some(payload(false)));
    }

    #[test]
    fn add_then_remove_cancels() {
        let first = ChangeSet::new(vec![ComponentChange::added(concept_id("c1"), payload(true))]);
        let second = ChangeSet::new(vec![ComponentChange::removed(concept_id("c1"))]);
        let net = ChangeSet::fold([&first, &second]);
        assert!(net.is_empty());
    }

    #[test]
    fn change_then_remove_is_remove() {
        let first =
            ChangeSet::new(vec![ComponentChange::changed(concept_id("c1"), payload(true))]);
        let second = ChangeSet::new(vec![ComponentChange::removed(concept_id("c1"))]);
        let net = ChangeSet::fold([&first, &second]);
        assert_eq!(net.get(&concept_id("c1")).unwrap().kind, ChangeKind::Removed);
    }

    #[test]
    fn remove_then_add_is_change() {
        let first = ChangeSet::new(vec![ComponentChange::removed(concept_id("c1"))]);
        let second = ChangeSet::new(vec![ComponentChange::added(concept_id("c1"), payload(true))]);
        let net = ChangeSet::fold([&first, &second]);
        let change = net.get(&concept_id("c1")).unwrap();
        assert_eq!(change.kind, ChangeKind::Changed);
        assert_eq!(change.payload, Some(payload(true)));
    }

    #[test]
    fn unrelated_components_fold_independently() {
        let first = ChangeSet::new(vec![
            ComponentChange::added(concept_id("c1"), payload(true)),
            ComponentChange::changed(concept_id("c2"), payload(true)),
        ]);
        let second = ChangeSet::new(vec![ComponentChange::removed(concept_id("c2"))]);
        let net = ChangeSet::fold([&first, &second]);
        assert_eq!(net.len(), 2);
        assert_eq!(net.get(&concept_id("c1")).unwrap().kind, ChangeKind::Added);
        assert_eq!(net.get(&concept_id("c2")).unwrap().kind, ChangeKind::Removed);
    }
}
