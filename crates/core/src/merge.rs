//! Merge and rebase engine.
//!
//! A merge job moves content between a branch and its direct parent. The
//! direction is inferred from ancestry: when the target is the source's
//! parent, the source's divergent changes are promoted onto the target as a
//! single commit; when the source is the target's parent, the target is
//! rebased (reopened at the parent's head, its own changes replayed). Either
//! way the job runs three-way conflict detection against the fork point
//! first, and any conflict leaves both branches untouched.

use crate::commit::{ChangeKind, ChangeSet};
use crate::component::ComponentIdentifier;
use crate::review::{ReviewService, ReviewStatus};
use crate::store::{CommitRequest, RevisionStore};
use crate::{TvsError, TvsResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeStatus {
    Scheduled,
    InProgress,
    Completed,
    Conflicts,
    Failed,
}

impl MergeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Conflicts | Self::Failed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    /// Both sides changed the component to different values.
    ConcurrentUpdate,
    /// The source changed a component the target deleted.
    UpdateOnDeleted,
    /// The source deleted a component the target changed.
    DeleteOnUpdated,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conflict {
    pub component: ComponentIdentifier,
    pub kind: ConflictKind,
    /// Payload fields the two sides disagree on. Populated for
    /// `CONCURRENT_UPDATE`; empty for update/delete crosses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub differing_fields: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct MergeRequest {
    pub source: String,
    pub target: String,
    pub commit_comment: Option<String>,
    pub review_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Merge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub status: MergeStatus,
    pub conflicts: Vec<Conflict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

enum Direction {
    /// Source is a child of target: push source changes up.
    Promote,
    /// Target is a child of source: pull parent changes in by reopening.
    Rebase,
}

/// Schedules and executes merge jobs.
#[derive(Clone)]
pub struct MergeService {
    store: Arc<RevisionStore>,
    reviews: ReviewService,
    merges: Arc<Mutex<HashMap<String, Merge>>>,
}

impl MergeService {
    pub fn new(store: Arc<RevisionStore>, reviews: ReviewService) -> Self {
        Self {
            store,
            reviews,
            merges: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Validates and registers a merge job in `SCHEDULED` state.
    ///
    /// Both branches must exist and be direct parent and child of each other,
    /// in either order. A referenced review must be `CURRENT` at this point;
    /// it is checked again when the job runs.
    pub fn create(&self, request: MergeRequest) -> TvsResult<Merge> {
        if request.source == request.target {
            return Err(TvsError::InvalidInput(
                "merge source and target must differ".to_owned(),
            ));
        }
        let source = self.store.get_branch(&request.source)?;
        let target = self.store.get_branch(&request.target)?;
        if source.deleted {
            return Err(TvsError::BranchDeleted(request.source));
        }
        if target.deleted {
            return Err(TvsError::BranchDeleted(request.target));
        }
        self.direction(&request.source, &request.target)?;
        if let Some(review_id) = &request.review_id {
            self.check_review(review_id, &request.source, &request.target)?;
        }

        let merge = Merge {
            id: uuid::Uuid::new_v4().simple().to_string(),
            source: request.source,
            target: request.target,
            status: MergeStatus::Scheduled,
            conflicts: Vec::new(),
            failure_reason: None,
            created_at: Utc::now(),
        };
        self.lock().insert(merge.id.clone(), merge.clone());
        tracing::info!(
            merge = %merge.id,
            source = %merge.source,
            target = %merge.target,
            "merge scheduled"
        );
        Ok(merge)
    }

    pub fn get(&self, id: &str) -> TvsResult<Merge> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| TvsError::MergeNotFound(id.to_owned()))
    }

    /// Runs a scheduled merge to its terminal state and returns it.
    ///
    /// Intended to run off the request path; callers poll [`get`](Self::get).
    pub fn run(&self, id: &str, request: &MergeRequest) -> TvsResult<Merge> {
        {
            let mut merges = self.lock();
            let merge = merges
                .get_mut(id)
                .ok_or_else(|| TvsError::MergeNotFound(id.to_owned()))?;
            if merge.status.is_terminal() {
                return Ok(merge.clone());
            }
            merge.status = MergeStatus::InProgress;
        }

        let outcome = self.execute(request);

        let mut merges = self.lock();
        let merge = merges
            .get_mut(id)
            .ok_or_else(|| TvsError::MergeNotFound(id.to_owned()))?;
        match outcome {
            Ok(conflicts) if conflicts.is_empty() => {
                merge.status = MergeStatus::Completed;
                tracing::info!(merge = id, "merge completed");
            }
            Ok(conflicts) => {
                merge.status = MergeStatus::Conflicts;
                merge.conflicts = conflicts;
                tracing::info!(merge = id, conflicts = merge.conflicts.len(), "merge conflicted");
            }
            Err(error) => {
                merge.status = MergeStatus::Failed;
                merge.failure_reason = Some(error.to_string());
                tracing::warn!(merge = id, %error, "merge failed");
            }
        }
        Ok(merge.clone())
    }

    fn execute(&self, request: &MergeRequest) -> TvsResult<Vec<Conflict>> {
        if let Some(review_id) = &request.review_id {
            self.check_review(review_id, &request.source, &request.target)?;
        }
        match self.direction(&request.source, &request.target)? {
            Direction::Promote => self.promote(request),
            Direction::Rebase => self.rebase(request),
        }
    }

    fn direction(&self, source: &str, target: &str) -> TvsResult<Direction> {
        let source_branch = self.store.get_branch(source)?;
        let target_branch = self.store.get_branch(target)?;
        if source_branch.parent_path.as_deref() == Some(target) {
            Ok(Direction::Promote)
        } else if target_branch.parent_path.as_deref() == Some(source) {
            Ok(Direction::Rebase)
        } else {
            Err(TvsError::InvalidInput(format!(
                "merges are only allowed between a branch and its direct parent \
                 ('{source}' and '{target}' are unrelated)"
            )))
        }
    }

    fn check_review(&self, review_id: &str, source: &str, target: &str) -> TvsResult<()> {
        let review = self.reviews.get(review_id)?;
        if review.source != source || review.target != target {
            return Err(TvsError::InvalidInput(format!(
                "review '{review_id}' does not cover this merge"
            )));
        }
        if review.status != ReviewStatus::Current {
            return Err(TvsError::ReviewNotCurrent(review_id.to_owned()));
        }
        Ok(())
    }

    /// Source is a child of target: apply the source's divergent net changes
    /// onto the target as one commit.
    fn promote(&self, request: &MergeRequest) -> TvsResult<Vec<Conflict>> {
        let source = self.store.get_branch(&request.source)?;
        let target = self.store.get_branch(&request.target)?;

        // Both sides' net outcome since the fork point.
        let ours = self.store.net_changes_above(&request.source, source.base_timestamp)?;
        let theirs = self.store.net_changes_above(&request.target, source.base_timestamp)?;

        let (to_apply, conflicts) = reconcile(&ours, &theirs);
        if !conflicts.is_empty() {
            return Ok(conflicts);
        }
        if to_apply.is_empty() {
            // Everything converged already.
            return Ok(Vec::new());
        }

        self.store.commit(CommitRequest {
            branch_path: request.target.clone(),
            author: "system".to_owned(),
            comment: request
                .commit_comment
                .clone()
                .unwrap_or_else(|| format!("Merged {} into {}", request.source, request.target)),
            changes: to_apply,
            expected_head: Some(target.head_timestamp),
        })?;
        Ok(Vec::new())
    }

    /// Target is a child of source: reopen the target at the source's head
    /// and replay the target's own net changes.
    fn rebase(&self, request: &MergeRequest) -> TvsResult<Vec<Conflict>> {
        let source = self.store.get_branch(&request.source)?;
        let target = self.store.get_branch(&request.target)?;

        let ours = self.store.net_changes_above(&request.target, target.base_timestamp)?;
        let theirs = self.store.net_changes_above(&request.source, target.base_timestamp)?;

        let (to_apply, conflicts) = reconcile(&ours, &theirs);
        if !conflicts.is_empty() {
            return Ok(conflicts);
        }

        // Conflict-free: the store moves the fork point and replays the
        // target's changes as one operation, guarding both heads we read.
        self.store.rebase(
            CommitRequest {
                branch_path: request.target.clone(),
                author: "system".to_owned(),
                comment: request
                    .commit_comment
                    .clone()
                    .unwrap_or_else(|| {
                        format!("Rebased {} onto {}", request.target, request.source)
                    }),
                changes: to_apply,
                expected_head: Some(target.head_timestamp),
            },
            Some(source.head_timestamp),
        )?;
        Ok(Vec::new())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Merge>> {
        self.merges.lock().expect("merge registry lock poisoned")
    }
}

/// Three-way reconciliation of two divergent net change sets.
///
/// Returns the subset of `ours` that still needs applying (identical outcomes
/// converge and drop out) and the conflicts between the two sides.
fn reconcile(ours: &ChangeSet, theirs: &ChangeSet) -> (ChangeSet, Vec<Conflict>) {
    let mut to_apply = ChangeSet::default();
    let mut conflicts = Vec::new();

    for change in ours.changes() {
        let Some(other) = theirs.get(&change.component) else {
            to_apply.push(change.clone());
            continue;
        };
        match (change.kind, other.kind) {
            (ChangeKind::Removed, ChangeKind::Removed) => {}
            (ChangeKind::Removed, _) => conflicts.push(Conflict {
                component: change.component.clone(),
                kind: ConflictKind::DeleteOnUpdated,
                differing_fields: Vec::new(),
            }),
            (_, ChangeKind::Removed) => conflicts.push(Conflict {
                component: change.component.clone(),
                kind: ConflictKind::UpdateOnDeleted,
                differing_fields: Vec::new(),
            }),
            _ if change.payload == other.payload => {}
            _ => conflicts.push(Conflict {
                component: change.component.clone(),
                kind: ConflictKind::ConcurrentUpdate,
                differing_fields: match (&change.payload, &other.payload) {
                    (Some(ours), Some(theirs)) => ours.differing_fields(theirs),
                    _ => Vec::new(),
                },
            }),
        }
    }

    (to_apply, conflicts)
}
