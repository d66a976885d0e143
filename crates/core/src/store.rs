//! In-memory revision store.
//!
//! The store owns the branch namespace and the append-only commit log, and is
//! the single point of serialization for writes. Commits carry logical,
//! store-wide monotonic timestamps, so "the state of branch B" is always
//! expressible as a set of `(branch generation, upper timestamp)` segments:
//! B's own commits, plus its parent's commits up to B's base, plus the
//! grandparent's up to the parent's base, and so on to `MAIN`.
//!
//! Branch generations make reopening (the rebase primitive) safe: a reopened
//! path gets a fresh generation id, and commits reference generation ids, so
//! the pre-rebase commits of the path simply stop being visible from it while
//! remaining queryable history.

use crate::branch::{join_path, split_path, validate_path, Branch, BranchState, Metadata, MAIN};
use crate::commit::{ChangeSet, Commit};
use crate::component::{ComponentIdentifier, ComponentPayload};
use crate::{TvsError, TvsResult};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tvs_types::NonEmptyText;

/// A commit to be appended to a branch.
#[derive(Clone, Debug)]
pub struct CommitRequest {
    pub branch_path: String,
    pub author: String,
    pub comment: String,
    pub changes: ChangeSet,
    /// Optimistic concurrency token: when set, the commit is rejected if the
    /// branch head moved past this timestamp in the meantime.
    pub expected_head: Option<i64>,
}

/// Folded component state of one branch.
pub type ComponentState = BTreeMap<ComponentIdentifier, ComponentPayload>;

struct StoreInner {
    next_branch_id: u64,
    next_timestamp: i64,
    /// Current generation per path; paths stay present after soft deletion.
    branch_ids: HashMap<String, u64>,
    /// Every generation ever created, replaced ones included.
    branches: HashMap<u64, Branch>,
    /// Commit log keyed by timestamp; timestamps are unique store-wide.
    commits: BTreeMap<i64, Commit>,
}

impl StoreInner {
    fn current(&self, path: &str) -> TvsResult<&Branch> {
        let id = self
            .branch_ids
            .get(path)
            .ok_or_else(|| TvsError::BranchNotFound(path.to_owned()))?;
        self.branches
            .get(id)
            .ok_or_else(|| TvsError::Internal(format!("dangling branch id {id} for '{path}'")))
    }

    fn current_mut(&mut self, path: &str) -> TvsResult<&mut Branch> {
        let id = *self
            .branch_ids
            .get(path)
            .ok_or_else(|| TvsError::BranchNotFound(path.to_owned()))?;
        self.branches
            .get_mut(&id)
            .ok_or_else(|| TvsError::Internal(format!("dangling branch id {id} for '{path}'")))
    }

    /// Ancestry chain of `path` as `(generation id, inclusive upper bound)`
    /// segments, leaf first.
    fn segments(&self, path: &str) -> TvsResult<Vec<(u64, i64)>> {
        let mut segments = Vec::new();
        let mut branch = self.current(path)?;
        let mut upper = i64::MAX;
        loop {
            segments.push((branch.id, upper));
            match branch.parent_id {
                None => break,
                Some(parent_id) => {
                    upper = branch.base_timestamp;
                    branch = self.branches.get(&parent_id).ok_or_else(|| {
                        TvsError::Internal(format!("dangling parent id {parent_id}"))
                    })?;
                }
            }
        }
        Ok(segments)
    }

    /// Commits visible from `path` with timestamps strictly above `floor`,
    /// in timestamp order.
    fn visible_commits_above(&self, path: &str, floor: i64) -> TvsResult<Vec<&Commit>> {
        let segments = self.segments(path)?;
        Ok(self
            .commits
            .range(floor + 1..)
            .map(|(_, commit)| commit)
            .filter(|commit| {
                segments
                    .iter()
                    .any(|&(id, upper)| commit.branch_id == id && commit.timestamp <= upper)
            })
            .collect())
    }

    /// Replaces `path` with a fresh generation forked from the current head
    /// of its parent.
    fn reopen(&mut self, path: &str) -> TvsResult<Branch> {
        let old = self.current(path)?.clone();
        if old.deleted {
            return Err(TvsError::BranchDeleted(path.to_owned()));
        }
        let parent_path = old
            .parent_path
            .clone()
            .ok_or_else(|| TvsError::InvalidInput(format!("{MAIN} cannot be reopened")))?;
        let parent = self.current(&parent_path)?.clone();
        if parent.deleted {
            return Err(TvsError::BranchDeleted(parent_path));
        }

        let branch = Branch {
            id: self.next_branch_id,
            path: old.path.clone(),
            name: old.name.clone(),
            parent_id: Some(parent.id),
            parent_path: Some(parent.path.clone()),
            base_timestamp: parent.head_timestamp,
            head_timestamp: parent.head_timestamp,
            deleted: false,
            metadata: old.metadata.clone(),
            created_at: Utc::now(),
        };
        self.next_branch_id += 1;
        self.branch_ids.insert(branch.path.clone(), branch.id);
        self.branches.insert(branch.id, branch.clone());
        tracing::info!(path, base = branch.base_timestamp, "branch reopened");
        Ok(branch)
    }

    /// Appends one commit, atomically advancing the branch head.
    fn append(
        &mut self,
        branch_path: &str,
        author: String,
        comment: String,
        changes: ChangeSet,
        expected_head: Option<i64>,
    ) -> TvsResult<Commit> {
        let branch = self.current(branch_path)?;
        if branch.deleted {
            return Err(TvsError::BranchDeleted(branch_path.to_owned()));
        }
        if let Some(expected) = expected_head {
            if branch.head_timestamp != expected {
                return Err(TvsError::HeadMoved {
                    branch: branch_path.to_owned(),
                    expected,
                    actual: branch.head_timestamp,
                });
            }
        }

        let branch_id = branch.id;
        let timestamp = self.next_timestamp;
        self.next_timestamp += 1;

        let commit = Commit {
            branch_id,
            branch_path: branch_path.to_owned(),
            timestamp,
            author,
            comment,
            changes,
        };
        self.commits.insert(timestamp, commit.clone());
        self.current_mut(branch_path)?.head_timestamp = timestamp;
        tracing::debug!(
            path = %commit.branch_path,
            timestamp,
            changes = commit.changes.len(),
            "commit appended"
        );
        Ok(commit)
    }
}

/// Thread-safe branch and commit store.
pub struct RevisionStore {
    inner: RwLock<StoreInner>,
}

impl Default for RevisionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RevisionStore {
    /// Creates an empty store containing only `MAIN`.
    pub fn new() -> Self {
        let main = Branch {
            id: 1,
            path: MAIN.to_owned(),
            name: MAIN.to_owned(),
            parent_id: None,
            parent_path: None,
            base_timestamp: 0,
            head_timestamp: 0,
            deleted: false,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        };
        let mut branch_ids = HashMap::new();
        branch_ids.insert(MAIN.to_owned(), 1);
        let mut branches = HashMap::new();
        branches.insert(1, main);
        Self {
            inner: RwLock::new(StoreInner {
                next_branch_id: 2,
                next_timestamp: 1,
                branch_ids,
                branches,
                commits: BTreeMap::new(),
            }),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreInner> {
        self.inner.read().expect("revision store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().expect("revision store lock poisoned")
    }

    /// Creates a child branch under `parent_path`.
    ///
    /// The new branch forks from the parent's current head. Fails with
    /// `BranchNotFound` if the parent is missing, `BranchDeleted` if it was
    /// deleted, and `BranchCollision` if the path is already taken.
    pub fn create_branch(
        &self,
        parent_path: &str,
        name: &str,
        metadata: Metadata,
    ) -> TvsResult<Branch> {
        let path = join_path(parent_path, name);
        validate_path(&path)?;

        let mut inner = self.write();
        let parent = inner.current(parent_path)?;
        if parent.deleted {
            return Err(TvsError::BranchDeleted(parent_path.to_owned()));
        }
        // Deleted paths count as taken: history stays queryable under the
        // old generation and may not be shadowed.
        if inner.branch_ids.contains_key(&path) {
            return Err(TvsError::BranchCollision(path));
        }

        let branch = Branch {
            id: inner.next_branch_id,
            path: path.clone(),
            name: name.to_owned(),
            parent_id: Some(parent.id),
            parent_path: Some(parent_path.to_owned()),
            base_timestamp: parent.head_timestamp,
            head_timestamp: parent.head_timestamp,
            deleted: false,
            metadata,
            created_at: Utc::now(),
        };
        inner.next_branch_id += 1;
        inner.branch_ids.insert(path, branch.id);
        inner.branches.insert(branch.id, branch.clone());
        tracing::info!(path = %branch.path, base = branch.base_timestamp, "branch created");
        Ok(branch)
    }

    /// Returns the current generation of `path`, deleted or not.
    pub fn get_branch(&self, path: &str) -> TvsResult<Branch> {
        Ok(self.read().current(path)?.clone())
    }

    /// Marks a branch deleted. Deletion is soft: the branch and its commits
    /// remain queryable, but no further commits or child branches are
    /// accepted.
    pub fn delete_branch(&self, path: &str) -> TvsResult<()> {
        if path == MAIN {
            return Err(TvsError::InvalidInput(format!("{MAIN} cannot be deleted")));
        }
        let mut inner = self.write();
        let branch = inner.current_mut(path)?;
        branch.deleted = true;
        tracing::info!(path, "branch deleted");
        Ok(())
    }

    /// Direct children of `path` (current generations, deleted ones included
    /// with their flag set).
    pub fn children(&self, path: &str) -> TvsResult<Vec<Branch>> {
        let inner = self.read();
        inner.current(path)?;
        let mut children: Vec<Branch> = inner
            .branch_ids
            .iter()
            .filter(|(child_path, _)| {
                split_path(child_path).is_some_and(|(parent, _)| parent == path)
            })
            .map(|(_, id)| inner.branches[id].clone())
            .collect();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }

    /// Replaces `path` with a fresh generation forked from the current head
    /// of its parent. Used by the merge engine to rebase.
    ///
    /// Returns the new generation; the old one becomes unreachable from the
    /// path but keeps its history.
    pub fn reopen(&self, path: &str) -> TvsResult<Branch> {
        self.write().reopen(path)
    }

    /// Appends one commit, atomically advancing the branch head.
    pub fn commit(&self, request: CommitRequest) -> TvsResult<Commit> {
        if request.changes.is_empty() {
            return Err(TvsError::InvalidInput(
                "commit must contain at least one component change".to_owned(),
            ));
        }
        let (author, comment) = commit_text(&request.author, &request.comment)?;
        self.write().append(
            &request.branch_path,
            author,
            comment,
            request.changes,
            request.expected_head,
        )
    }

    /// Atomically reopens `request.branch_path` at its parent's head and
    /// replays `request.changes` as one commit on the new generation.
    ///
    /// The store lock is held across both steps, so no commit can land
    /// between the reopen and the replay. `request.expected_head` guards the
    /// branch being rebased and `expected_parent_head` guards its parent;
    /// either mismatch fails with `HeadMoved` before anything changes. An
    /// empty change set reopens without committing.
    pub fn rebase(
        &self,
        request: CommitRequest,
        expected_parent_head: Option<i64>,
    ) -> TvsResult<Branch> {
        let replay = if request.changes.is_empty() {
            None
        } else {
            Some(commit_text(&request.author, &request.comment)?)
        };

        let mut inner = self.write();
        let old = inner.current(&request.branch_path)?.clone();
        if let Some(expected) = request.expected_head {
            if old.head_timestamp != expected {
                return Err(TvsError::HeadMoved {
                    branch: request.branch_path,
                    expected,
                    actual: old.head_timestamp,
                });
            }
        }
        if let (Some(expected), Some(parent_path)) =
            (expected_parent_head, old.parent_path.as_deref())
        {
            let parent = inner.current(parent_path)?;
            if parent.head_timestamp != expected {
                return Err(TvsError::HeadMoved {
                    branch: parent_path.to_owned(),
                    expected,
                    actual: parent.head_timestamp,
                });
            }
        }

        let reopened = inner.reopen(&request.branch_path)?;
        match replay {
            None => Ok(reopened),
            Some((author, comment)) => {
                inner.append(&request.branch_path, author, comment, request.changes, None)?;
                Ok(inner.current(&request.branch_path)?.clone())
            }
        }
    }

    /// All commits visible from `path`, oldest first.
    pub fn visible_commits(&self, path: &str) -> TvsResult<Vec<Commit>> {
        let inner = self.read();
        Ok(inner
            .visible_commits_above(path, 0)?
            .into_iter()
            .cloned()
            .collect())
    }

    /// Net change set of everything visible from `path` above `floor`.
    pub fn net_changes_above(&self, path: &str, floor: i64) -> TvsResult<ChangeSet> {
        let inner = self.read();
        let commits = inner.visible_commits_above(path, floor)?;
        Ok(ChangeSet::fold(commits.iter().map(|c| &c.changes)))
    }

    /// Folded component state of `path`.
    pub fn state_of(&self, path: &str) -> TvsResult<ComponentState> {
        let inner = self.read();
        let mut state = ComponentState::new();
        for commit in inner.visible_commits_above(path, 0)? {
            for change in commit.changes.changes() {
                match &change.payload {
                    Some(payload) => {
                        state.insert(change.component.clone(), payload.clone());
                    }
                    None => {
                        state.remove(&change.component);
                    }
                }
            }
        }
        Ok(state)
    }

    /// Looks up one live component on a branch.
    pub fn get_component(
        &self,
        path: &str,
        component: &ComponentIdentifier,
    ) -> TvsResult<ComponentPayload> {
        self.state_of(path)?
            .remove(component)
            .ok_or_else(|| TvsError::ComponentNotFound(component.to_string(), path.to_owned()))
    }

    /// Classifies `left` against `right`, which must be its direct parent or
    /// direct child.
    pub fn branch_state_between(&self, left: &str, right: &str) -> TvsResult<BranchState> {
        let inner = self.read();
        let l = inner.current(left)?;
        let r = inner.current(right)?;
        if l.deleted || r.deleted {
            return Ok(BranchState::Stale);
        }

        if l.parent_path.as_deref() == Some(right) {
            // The fork point survives only while the parent generation the
            // child was created from is still current.
            if l.parent_id != Some(r.id) {
                return Ok(BranchState::Stale);
            }
            Ok(classify(l.has_own_changes(), r.head_timestamp > l.base_timestamp))
        } else if r.parent_path.as_deref() == Some(left) {
            if r.parent_id != Some(l.id) {
                return Ok(BranchState::Stale);
            }
            Ok(classify(l.head_timestamp > r.base_timestamp, r.has_own_changes()))
        } else {
            Err(TvsError::InvalidInput(format!(
                "branches '{left}' and '{right}' are not directly related"
            )))
        }
    }

    /// Classifies a branch against its own parent.
    pub fn branch_state(&self, path: &str) -> TvsResult<BranchState> {
        let parent_path = {
            let inner = self.read();
            let branch = inner.current(path)?;
            match &branch.parent_path {
                None => return Ok(BranchState::UpToDate),
                Some(parent) => parent.clone(),
            }
        };
        self.branch_state_between(path, &parent_path)
    }
}

/// Validates commit attribution and returns it trimmed.
fn commit_text(author: &str, comment: &str) -> TvsResult<(String, String)> {
    let author = NonEmptyText::new(author)
        .map_err(|_| TvsError::InvalidInput("commit author may not be empty".to_owned()))?;
    let comment = NonEmptyText::new(comment)
        .map_err(|_| TvsError::InvalidInput("commit comment may not be empty".to_owned()))?;
    Ok((author.to_string(), comment.to_string()))
}

fn classify(left_changed: bool, right_changed: bool) -> BranchState {
    match (left_changed, right_changed) {
        (false, false) => BranchState::UpToDate,
        (true, false) => BranchState::Forward,
        (false, true) => BranchState::Behind,
        (true, true) => BranchState::Diverged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::ComponentChange;
    use crate::component::{ComponentCategory, ConceptPayload, DefinitionStatus};

    fn concept_change(id: &str, active: bool) -> ComponentChange {
        ComponentChange::added(
            ComponentIdentifier::new(ComponentCategory::Concept, id),
            ComponentPayload::Concept(ConceptPayload {
                module_id: "900000000000207008".to_owned(),
                active,
                definition_status: DefinitionStatus::Primitive,
                refset_kind: None,
            }),
        )
    }

    fn commit_on(store: &RevisionStore, path: &str, change: ComponentChange) -> Commit {
        store
            .commit(CommitRequest {
                branch_path: path.to_owned(),
                author: "test".to_owned(),
                comment: "test commit".to_owned(),
                changes: ChangeSet::new(vec![change]),
                expected_head: None,
            })
            .unwrap()
    }

    #[test]
    fn main_exists_from_the_start() {
        let store = RevisionStore::new();
        let main = store.get_branch("MAIN").unwrap();
        assert_eq!(main.path, "MAIN");
        assert!(main.parent_path.is_none());
        assert!(!main.deleted);
    }

    #[test]
    fn create_get_and_list_children() {
        let store = RevisionStore::new();
        store.create_branch("MAIN", "a", Metadata::new()).unwrap();
        store.create_branch("MAIN", "b", Metadata::new()).unwrap();
        store.create_branch("MAIN/a", "nested", Metadata::new()).unwrap();

        let children = store.children("MAIN").unwrap();
        assert_eq!(
            children.iter().map(|b| b.path.as_str()).collect::<Vec<_>>(),
            vec!["MAIN/a", "MAIN/b"]
        );
        assert_eq!(store.get_branch("MAIN/a/nested").unwrap().name, "nested");
    }

    #[test]
    fn duplicate_path_is_a_collision() {
        let store = RevisionStore::new();
        store.create_branch("MAIN", "a", Metadata::new()).unwrap();
        assert!(matches!(
            store.create_branch("MAIN", "a", Metadata::new()),
            Err(TvsError::BranchCollision(_))
        ));
    }

    #[test]
    fn missing_parent_is_not_found() {
        let store = RevisionStore::new();
        assert!(matches!(
            store.create_branch("MAIN/nope", "a", Metadata::new()),
            Err(TvsError::BranchNotFound(_))
        ));
    }

    #[test]
    fn deletion_is_soft() {
        let store = RevisionStore::new();
        store.create_branch("MAIN", "a", Metadata::new()).unwrap();
        commit_on(&store, "MAIN/a", concept_change("138875005", true));
        store.delete_branch("MAIN/a").unwrap();

        let branch = store.get_branch("MAIN/a").unwrap();
        assert!(branch.deleted);
        // History stays queryable.
        assert_eq!(store.visible_commits("MAIN/a").unwrap().len(), 1);
        // But no further commits are accepted.
        assert!(matches!(
            store.commit(CommitRequest {
                branch_path: "MAIN/a".to_owned(),
                author: "test".to_owned(),
                comment: "too late".to_owned(),
                changes: ChangeSet::new(vec![concept_change("64572001", true)]),
                expected_head: None,
            }),
            Err(TvsError::BranchDeleted(_))
        ));
    }

    #[test]
    fn main_cannot_be_deleted() {
        let store = RevisionStore::new();
        assert!(store.delete_branch("MAIN").is_err());
    }

    #[test]
    fn commits_advance_the_head_monotonically() {
        let store = RevisionStore::new();
        let first = commit_on(&store, "MAIN", concept_change("138875005", true));
        let second = commit_on(&store, "MAIN", concept_change("64572001", true));
        assert!(second.timestamp > first.timestamp);
        assert_eq!(
            store.get_branch("MAIN").unwrap().head_timestamp,
            second.timestamp
        );
    }

    #[test]
    fn optimistic_concurrency_rejects_moved_head() {
        let store = RevisionStore::new();
        let head = store.get_branch("MAIN").unwrap().head_timestamp;
        commit_on(&store, "MAIN", concept_change("138875005", true));
        let result = store.commit(CommitRequest {
            branch_path: "MAIN".to_owned(),
            author: "test".to_owned(),
            comment: "lost the race".to_owned(),
            changes: ChangeSet::new(vec![concept_change("64572001", true)]),
            expected_head: Some(head),
        });
        assert!(matches!(result, Err(TvsError::HeadMoved { .. })));
    }

    #[test]
    fn child_sees_parent_commits_up_to_its_base_only() {
        let store = RevisionStore::new();
        commit_on(&store, "MAIN", concept_change("138875005", true));
        store.create_branch("MAIN", "a", Metadata::new()).unwrap();
        // After the fork: invisible to the child.
        commit_on(&store, "MAIN", concept_change("64572001", true));

        let visible: Vec<i64> = store
            .visible_commits("MAIN/a")
            .unwrap()
            .iter()
            .map(|c| c.timestamp)
            .collect();
        assert_eq!(visible, vec![1]);

        let state = store.state_of("MAIN/a").unwrap();
        assert!(state.contains_key(&ComponentIdentifier::new(
            ComponentCategory::Concept,
            "138875005"
        )));
        assert!(!state.contains_key(&ComponentIdentifier::new(
            ComponentCategory::Concept,
            "64572001"
        )));
    }

    #[test]
    fn branch_states_follow_commits_on_either_side() {
        let store = RevisionStore::new();
        store.create_branch("MAIN", "a", Metadata::new()).unwrap();
        assert_eq!(store.branch_state("MAIN/a").unwrap(), BranchState::UpToDate);

        commit_on(&store, "MAIN/a", concept_change("138875005", true));
        assert_eq!(store.branch_state("MAIN/a").unwrap(), BranchState::Forward);

        commit_on(&store, "MAIN", concept_change("64572001", true));
        assert_eq!(store.branch_state("MAIN/a").unwrap(), BranchState::Diverged);

        let fresh = RevisionStore::new();
        fresh.create_branch("MAIN", "b", Metadata::new()).unwrap();
        commit_on(&fresh, "MAIN", concept_change("64572001", true));
        assert_eq!(fresh.branch_state("MAIN/b").unwrap(), BranchState::Behind);
    }

    #[test]
    fn reopen_moves_the_fork_point_and_drops_old_commits_from_view() {
        let store = RevisionStore::new();
        store.create_branch("MAIN", "a", Metadata::new()).unwrap();
        commit_on(&store, "MAIN/a", concept_change("138875005", true));
        commit_on(&store, "MAIN", concept_change("64572001", true));

        let reopened = store.reopen("MAIN/a").unwrap();
        assert_eq!(
            reopened.base_timestamp,
            store.get_branch("MAIN").unwrap().head_timestamp
        );
        // The pre-rebase commit belongs to the old generation.
        assert!(store
            .visible_commits("MAIN/a")
            .unwrap()
            .iter()
            .all(|c| c.branch_path == "MAIN"));
        let state = store.state_of("MAIN/a").unwrap();
        assert!(!state.contains_key(&ComponentIdentifier::new(
            ComponentCategory::Concept,
            "138875005"
        )));
        // The parent commit made after the original fork is now visible.
        assert!(state.contains_key(&ComponentIdentifier::new(
            ComponentCategory::Concept,
            "64572001"
        )));
        assert_eq!(store.branch_state("MAIN/a").unwrap(), BranchState::UpToDate);
    }

    #[test]
    fn reopening_a_parent_makes_children_stale() {
        let store = RevisionStore::new();
        store.create_branch("MAIN", "a", Metadata::new()).unwrap();
        store.create_branch("MAIN/a", "b", Metadata::new()).unwrap();
        commit_on(&store, "MAIN", concept_change("138875005", true));
        store.reopen("MAIN/a").unwrap();
        assert_eq!(store.branch_state("MAIN/a/b").unwrap(), BranchState::Stale);
    }

    #[test]
    fn unrelated_branches_cannot_be_classified() {
        let store = RevisionStore::new();
        store.create_branch("MAIN", "a", Metadata::new()).unwrap();
        store.create_branch("MAIN", "b", Metadata::new()).unwrap();
        assert!(store.branch_state_between("MAIN/a", "MAIN/b").is_err());
    }

    #[test]
    fn rebase_reopens_and_replays_in_one_operation() {
        let store = RevisionStore::new();
        store.create_branch("MAIN", "a", Metadata::new()).unwrap();
        commit_on(&store, "MAIN/a", concept_change("138875005", true));
        commit_on(&store, "MAIN", concept_change("64572001", true));

        let child = store.get_branch("MAIN/a").unwrap();
        let parent = store.get_branch("MAIN").unwrap();
        let replay = store
            .net_changes_above("MAIN/a", child.base_timestamp)
            .unwrap();
        let rebased = store
            .rebase(
                CommitRequest {
                    branch_path: "MAIN/a".to_owned(),
                    author: "system".to_owned(),
                    comment: "rebase".to_owned(),
                    changes: replay,
                    expected_head: Some(child.head_timestamp),
                },
                Some(parent.head_timestamp),
            )
            .unwrap();

        assert_ne!(rebased.id, child.id);
        assert_eq!(rebased.base_timestamp, parent.head_timestamp);
        let state = store.state_of("MAIN/a").unwrap();
        assert!(state.contains_key(&ComponentIdentifier::new(
            ComponentCategory::Concept,
            "138875005"
        )));
        assert!(state.contains_key(&ComponentIdentifier::new(
            ComponentCategory::Concept,
            "64572001"
        )));
    }

    #[test]
    fn rebase_against_a_moved_head_changes_nothing() {
        let store = RevisionStore::new();
        store.create_branch("MAIN", "a", Metadata::new()).unwrap();
        commit_on(&store, "MAIN/a", concept_change("138875005", true));
        commit_on(&store, "MAIN", concept_change("64572001", true));

        let child = store.get_branch("MAIN/a").unwrap();
        let parent = store.get_branch("MAIN").unwrap();
        let replay = store
            .net_changes_above("MAIN/a", child.base_timestamp)
            .unwrap();
        // A commit lands on the child after the caller captured its head.
        commit_on(&store, "MAIN/a", concept_change("900000000000013009", true));

        let result = store.rebase(
            CommitRequest {
                branch_path: "MAIN/a".to_owned(),
                author: "system".to_owned(),
                comment: "rebase".to_owned(),
                changes: replay,
                expected_head: Some(child.head_timestamp),
            },
            Some(parent.head_timestamp),
        );
        assert!(matches!(result, Err(TvsError::HeadMoved { .. })));

        // The child keeps its generation and every change it had.
        assert_eq!(store.get_branch("MAIN/a").unwrap().id, child.id);
        let state = store.state_of("MAIN/a").unwrap();
        assert!(state.contains_key(&ComponentIdentifier::new(
            ComponentCategory::Concept,
            "138875005"
        )));
        assert!(state.contains_key(&ComponentIdentifier::new(
            ComponentCategory::Concept,
            "900000000000013009"
        )));
    }

    #[test]
    fn blank_commit_author_is_rejected() {
        let store = RevisionStore::new();
        let result = store.commit(CommitRequest {
            branch_path: "MAIN".to_owned(),
            author: "   ".to_owned(),
            comment: "fine".to_owned(),
            changes: ChangeSet::new(vec![concept_change("138875005", true)]),
            expected_head: None,
        });
        assert!(matches!(result, Err(TvsError::InvalidInput(_))));
    }

    #[test]
    fn commit_text_is_stored_trimmed() {
        let store = RevisionStore::new();
        let commit = store
            .commit(CommitRequest {
                branch_path: "MAIN".to_owned(),
                author: "  alice  ".to_owned(),
                comment: "  first  ".to_owned(),
                changes: ChangeSet::new(vec![concept_change("138875005", true)]),
                expected_head: None,
            })
            .unwrap();
        assert_eq!(commit.author, "alice");
        assert_eq!(commit.comment, "first");
    }

    #[test]
    fn empty_commits_are_rejected() {
        let store = RevisionStore::new();
        assert!(matches!(
            store.commit(CommitRequest {
                branch_path: "MAIN".to_owned(),
                author: "test".to_owned(),
                comment: "empty".to_owned(),
                changes: ChangeSet::default(),
                expected_head: None,
            }),
            Err(TvsError::InvalidInput(_))
        ));
    }
}
