//! Branch-to-branch content comparison.
//!
//! A compare answers "what would reach `base` if `compare` were merged now":
//! the components touched by commits visible on the compare branch but not on
//! the base branch, partitioned into new, changed and deleted. The result is
//! derived on every request and has no persisted lifecycle.

use crate::component::ComponentIdentifier;
use crate::store::{ComponentState, RevisionStore};
use crate::TvsResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Outcome of comparing two branches.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompareResult {
    pub base_branch: String,
    pub compare_branch: String,
    pub new_components: BTreeSet<ComponentIdentifier>,
    pub changed_components: BTreeSet<ComponentIdentifier>,
    pub deleted_components: BTreeSet<ComponentIdentifier>,
}

impl CompareResult {
    pub fn is_empty(&self) -> bool {
        self.new_components.is_empty()
            && self.changed_components.is_empty()
            && self.deleted_components.is_empty()
    }
}

/// A compare plus the folded states it was computed from, for callers that
/// need payload access (concept-level rollups).
pub(crate) struct DetailedDiff {
    pub result: CompareResult,
    pub base_state: ComponentState,
    pub compare_state: ComponentState,
}

/// Read-only diff queries over two branch states.
#[derive(Clone)]
pub struct CompareService {
    store: Arc<RevisionStore>,
}

impl CompareService {
    pub fn new(store: Arc<RevisionStore>) -> Self {
        Self { store }
    }

    /// Compares `compare_branch` against `base_branch`.
    ///
    /// Fails with `BranchNotFound` if either path does not exist. Comparing
    /// a branch to itself yields three empty sets.
    pub fn compare(&self, base_branch: &str, compare_branch: &str) -> TvsResult<CompareResult> {
        Ok(self.diff(base_branch, compare_branch)?.result)
    }

    pub(crate) fn diff(
        &self,
        base_branch: &str,
        compare_branch: &str,
    ) -> TvsResult<DetailedDiff> {
        let base_timestamps: BTreeSet<i64> = self
            .store
            .visible_commits(base_branch)?
            .iter()
            .map(|c| c.timestamp)
            .collect();

        // Components touched by commits reachable from the compare branch
        // but not from the base branch.
        let mut touched: BTreeSet<ComponentIdentifier> = BTreeSet::new();
        for commit in self.store.visible_commits(compare_branch)? {
            if base_timestamps.contains(&commit.timestamp) {
                continue;
            }
            for change in commit.changes.changes() {
                touched.insert(change.component.clone());
            }
        }

        let base_state = self.store.state_of(base_branch)?;
        let compare_state = self.store.state_of(compare_branch)?;

        let mut result = CompareResult {
            base_branch: base_branch.to_owned(),
            compare_branch: compare_branch.to_owned(),
            new_components: BTreeSet::new(),
            changed_components: BTreeSet::new(),
            deleted_components: BTreeSet::new(),
        };

        for component in touched {
            match (base_state.get(&component), compare_state.get(&component)) {
                (None, Some(_)) => {
                    result.new_components.insert(component);
                }
                (Some(_), None) => {
                    result.deleted_components.insert(component);
                }
                (Some(base), Some(compare)) if base != compare => {
                    result.changed_components.insert(component);
                }
                // Touched but converged (or created and removed again before
                // anyone saw it): not part of the delta.
                _ => {}
            }
        }

        Ok(DetailedDiff {
            result,
            base_state,
            compare_state,
        })
    }
}
