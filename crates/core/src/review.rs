//! Reviews: human-approvable snapshots of branch divergence.
//!
//! A review captures what merging `source` into `target` would change, at
//! the moment the review was created. It exists so a human can approve that
//! exact diff before the merge runs; a merge request referencing a review
//! that no longer matches reality is rejected. Snapshot computation is
//! asynchronous: a review starts `PENDING` and becomes `CURRENT` once its
//! concept-level changes are available, `FAILED` if computation failed, and
//! `STALE` as soon as either branch moves past the captured state.

use crate::compare::CompareService;
use crate::component::ComponentCategory;
use crate::store::RevisionStore;
use crate::{TvsError, TvsResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pending,
    Current,
    Failed,
    Stale,
}

/// Concept-level rollup of a review's delta.
///
/// Changes to descriptions, relationships and reference set members are
/// attributed to their owning concept, so reviewers see concept ids only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConceptChanges {
    pub id: String,
    pub new_concepts: BTreeSet<String>,
    pub changed_concepts: BTreeSet<String>,
    pub deleted_concepts: BTreeSet<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub source: String,
    pub target: String,
    pub status: ReviewStatus,
    /// Heads and branch generations captured at creation; any drift makes
    /// the review stale.
    pub source_head: i64,
    pub target_head: i64,
    pub source_branch_id: u64,
    pub target_branch_id: u64,
    pub created_at: DateTime<Utc>,
}

struct ReviewRecord {
    review: Review,
    changes: Option<ConceptChanges>,
}

/// Creates, computes and serves reviews.
#[derive(Clone)]
pub struct ReviewService {
    store: Arc<RevisionStore>,
    compare: CompareService,
    reviews: Arc<Mutex<HashMap<String, ReviewRecord>>>,
}

impl ReviewService {
    pub fn new(store: Arc<RevisionStore>) -> Self {
        let compare = CompareService::new(Arc::clone(&store));
        Self {
            store,
            compare,
            reviews: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers a new `PENDING` review of merging `source` into `target`.
    ///
    /// Both branches must exist, differ, and be directly related (parent and
    /// child in either direction); violations are reported as invalid input,
    /// not as not-found, because the review itself has no address yet.
    pub fn create(&self, source: &str, target: &str) -> TvsResult<Review> {
        if source == target {
            return Err(TvsError::InvalidInput(
                "review source and target must differ".to_owned(),
            ));
        }
        let source_branch = self
            .store
            .get_branch(source)
            .map_err(|_| TvsError::InvalidInput(format!("branch '{source}' does not exist")))?;
        let target_branch = self
            .store
            .get_branch(target)
            .map_err(|_| TvsError::InvalidInput(format!("branch '{target}' does not exist")))?;
        if source_branch.deleted || target_branch.deleted {
            return Err(TvsError::InvalidInput(
                "cannot review deleted branches".to_owned(),
            ));
        }
        let directly_related = source_branch.parent_path.as_deref() == Some(target)
            || target_branch.parent_path.as_deref() == Some(source);
        if !directly_related {
            return Err(TvsError::InvalidInput(format!(
                "branches '{source}' and '{target}' are not directly related"
            )));
        }

        let review = Review {
            id: uuid::Uuid::new_v4().simple().to_string(),
            source: source.to_owned(),
            target: target.to_owned(),
            status: ReviewStatus::Pending,
            source_head: source_branch.head_timestamp,
            target_head: target_branch.head_timestamp,
            source_branch_id: source_branch.id,
            target_branch_id: target_branch.id,
            created_at: Utc::now(),
        };
        self.lock().insert(
            review.id.clone(),
            ReviewRecord {
                review: review.clone(),
                changes: None,
            },
        );
        tracing::info!(review = %review.id, source, target, "review created");
        Ok(review)
    }

    /// Computes the snapshot of a pending review, moving it to `CURRENT`
    /// (or `FAILED` if the delta cannot be computed).
    ///
    /// Intended to run off the request path; callers poll [`get`](Self::get).
    pub fn compute(&self, id: &str) -> TvsResult<Review> {
        let (source, target) = {
            let reviews = self.lock();
            let record = reviews
                .get(id)
                .ok_or_else(|| TvsError::ReviewNotFound(id.to_owned()))?;
            (record.review.source.clone(), record.review.target.clone())
        };

        // The delta a merge would carry: changes on source not yet on target.
        let outcome = self.concept_changes_between(id, &target, &source);

        let mut reviews = self.lock();
        let record = reviews
            .get_mut(id)
            .ok_or_else(|| TvsError::ReviewNotFound(id.to_owned()))?;
        match outcome {
            Ok(changes) => {
                record.changes = Some(changes);
                if record.review.status == ReviewStatus::Pending {
                    record.review.status = ReviewStatus::Current;
                }
            }
            Err(error) => {
                tracing::warn!(review = id, %error, "review computation failed");
                record.review.status = ReviewStatus::Failed;
            }
        }
        Ok(record.review.clone())
    }

    /// Returns a review, refreshing its staleness against the live branches.
    pub fn get(&self, id: &str) -> TvsResult<Review> {
        let mut reviews = self.lock();
        let record = reviews
            .get_mut(id)
            .ok_or_else(|| TvsError::ReviewNotFound(id.to_owned()))?;
        if matches!(
            record.review.status,
            ReviewStatus::Pending | ReviewStatus::Current
        ) && self.is_stale(&record.review)
        {
            record.review.status = ReviewStatus::Stale;
        }
        Ok(record.review.clone())
    }

    /// Returns the concept-level changes of a computed review.
    pub fn concept_changes(&self, id: &str) -> TvsResult<ConceptChanges> {
        let reviews = self.lock();
        let record = reviews
            .get(id)
            .ok_or_else(|| TvsError::ReviewNotFound(id.to_owned()))?;
        record
            .changes
            .clone()
            .ok_or_else(|| TvsError::ReviewNotCurrent(id.to_owned()))
    }

    fn is_stale(&self, review: &Review) -> bool {
        let Ok(source) = self.store.get_branch(&review.source) else {
            return true;
        };
        let Ok(target) = self.store.get_branch(&review.target) else {
            return true;
        };
        source.deleted
            || target.deleted
            || source.id != review.source_branch_id
            || target.id != review.target_branch_id
            || source.head_timestamp != review.source_head
            || target.head_timestamp != review.target_head
    }

    fn concept_changes_between(
        &self,
        review_id: &str,
        base: &str,
        compare: &str,
    ) -> TvsResult<ConceptChanges> {
        let diff = self.compare.diff(base, compare)?;

        let mut changes = ConceptChanges {
            id: review_id.to_owned(),
            new_concepts: BTreeSet::new(),
            changed_concepts: BTreeSet::new(),
            deleted_concepts: BTreeSet::new(),
        };

        for component in &diff.result.new_components {
            if component.category == ComponentCategory::Concept {
                changes.new_concepts.insert(component.id.clone());
            }
        }
        for component in &diff.result.deleted_components {
            if component.category == ComponentCategory::Concept {
                changes.deleted_concepts.insert(component.id.clone());
            }
        }
        for component in &diff.result.changed_components {
            if component.category == ComponentCategory::Concept {
                changes.changed_concepts.insert(component.id.clone());
            }
        }

        // Attribute non-concept changes to their owning concept, unless the
        // concept itself is already reported as new or deleted.
        let non_concept = diff
            .result
            .new_components
            .iter()
            .chain(&diff.result.changed_components)
            .chain(&diff.result.deleted_components)
            .filter(|component| component.category != ComponentCategory::Concept);
        for component in non_concept {
            let payload = diff
                .compare_state
                .get(component)
                .or_else(|| diff.base_state.get(component));
            let Some(payload) = payload else { continue };
            let concept_id = payload.owning_concept_id(&component.id);
            if !changes.new_concepts.contains(&concept_id)
                && !changes.deleted_concepts.contains(&concept_id)
            {
                changes.changed_concepts.insert(concept_id);
            }
        }

        Ok(changes)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ReviewRecord>> {
        self.reviews.lock().expect("review registry lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::Metadata;
    use crate::commit::{ChangeSet, ComponentChange};
    use crate::component::{
        ComponentIdentifier, ComponentPayload, ConceptPayload, DefinitionStatus,
        RelationshipPayload,
    };
    use crate::store::CommitRequest;

    fn concept_added(id: &str) -> ComponentChange {
        ComponentChange::added(
            ComponentIdentifier::new(ComponentCategory::Concept, id),
            ComponentPayload::Concept(ConceptPayload {
                module_id: "900000000000207008".to_owned(),
                active: true,
                definition_status: DefinitionStatus::Primitive,
                refset_kind: None,
            }),
        )
    }

    fn relationship_added(id: &str, source: &str, destination: &str) -> ComponentChange {
        ComponentChange::added(
            ComponentIdentifier::new(ComponentCategory::Relationship, id),
            ComponentPayload::Relationship(RelationshipPayload {
                source_id: source.to_owned(),
                type_id: "408729009".to_owned(),
                destination_id: destination.to_owned(),
                module_id: "900000000000207008".to_owned(),
                active: true,
                group: 0,
            }),
        )
    }

    fn commit_changes(store: &RevisionStore, path: &str, changes: Vec<ComponentChange>) {
        store
            .commit(CommitRequest {
                branch_path: path.to_owned(),
                author: "test".to_owned(),
                comment: "test commit".to_owned(),
                changes: ChangeSet::new(changes),
                expected_head: None,
            })
            .unwrap();
    }

    fn setup() -> (Arc<RevisionStore>, ReviewService) {
        let store = Arc::new(RevisionStore::new());
        let reviews = ReviewService::new(Arc::clone(&store));
        (store, reviews)
    }

    #[test]
    fn self_review_is_invalid() {
        let (_, reviews) = setup();
        assert!(matches!(
            reviews.create("MAIN", "MAIN"),
            Err(TvsError::InvalidInput(_))
        ));
    }

    #[test]
    fn missing_branches_are_invalid_input() {
        let (_, reviews) = setup();
        assert!(matches!(
            reviews.create("MAIN/none", "MAIN"),
            Err(TvsError::InvalidInput(_))
        ));
    }

    #[test]
    fn unrelated_branches_are_invalid() {
        let (store, reviews) = setup();
        store.create_branch("MAIN", "a", Metadata::new()).unwrap();
        store.create_branch("MAIN", "b", Metadata::new()).unwrap();
        assert!(reviews.create("MAIN/a", "MAIN/b").is_err());
    }

    #[test]
    fn review_becomes_current_with_concept_rollup() {
        let (store, reviews) = setup();
        commit_changes(&store, "MAIN", vec![concept_added("64572001")]);
        store.create_branch("MAIN", "a", Metadata::new()).unwrap();
        commit_changes(
            &store,
            "MAIN/a",
            vec![
                concept_added("900000000000013009"),
                relationship_added("r1", "64572001", "410510008"),
            ],
        );

        let review = reviews.create("MAIN/a", "MAIN").unwrap();
        assert_eq!(review.status, ReviewStatus::Pending);

        let computed = reviews.compute(&review.id).unwrap();
        assert_eq!(computed.status, ReviewStatus::Current);

        let changes = reviews.concept_changes(&review.id).unwrap();
        assert!(changes.new_concepts.contains("900000000000013009"));
        // The relationship marks its source concept changed...
        assert!(changes.changed_concepts.contains("64572001"));
        // ...but not its destination.
        assert!(!changes.changed_concepts.contains("410510008"));
    }

    #[test]
    fn new_concept_with_new_relationship_is_reported_once() {
        let (store, reviews) = setup();
        store.create_branch("MAIN", "a", Metadata::new()).unwrap();
        commit_changes(
            &store,
            "MAIN/a",
            vec![
                concept_added("64572001"),
                relationship_added("r1", "64572001", "410510008"),
            ],
        );
        let review = reviews.create("MAIN/a", "MAIN").unwrap();
        reviews.compute(&review.id).unwrap();
        let changes = reviews.concept_changes(&review.id).unwrap();
        assert!(changes.new_concepts.contains("64572001"));
        assert!(!changes.changed_concepts.contains("64572001"));
    }

    #[test]
    fn commit_after_snapshot_makes_review_stale() {
        let (store, reviews) = setup();
        store.create_branch("MAIN", "a", Metadata::new()).unwrap();
        commit_changes(&store, "MAIN/a", vec![concept_added("64572001")]);
        let review = reviews.create("MAIN/a", "MAIN").unwrap();
        reviews.compute(&review.id).unwrap();

        commit_changes(&store, "MAIN", vec![concept_added("138875005")]);
        let refreshed = reviews.get(&review.id).unwrap();
        assert_eq!(refreshed.status, ReviewStatus::Stale);
    }

    #[test]
    fn deleting_a_branch_makes_review_stale() {
        let (store, reviews) = setup();
        store.create_branch("MAIN", "a", Metadata::new()).unwrap();
        commit_changes(&store, "MAIN/a", vec![concept_added("64572001")]);
        let review = reviews.create("MAIN/a", "MAIN").unwrap();
        reviews.compute(&review.id).unwrap();
        store.delete_branch("MAIN/a").unwrap();
        assert_eq!(reviews.get(&review.id).unwrap().status, ReviewStatus::Stale);
    }

    #[test]
    fn concept_changes_before_computation_is_a_conflict() {
        let (store, reviews) = setup();
        store.create_branch("MAIN", "a", Metadata::new()).unwrap();
        let review = reviews.create("MAIN/a", "MAIN").unwrap();
        assert!(matches!(
            reviews.concept_changes(&review.id),
            Err(TvsError::ReviewNotCurrent(_))
        ));
    }

    #[test]
    fn unknown_review_is_not_found() {
        let (_, reviews) = setup();
        assert!(matches!(
            reviews.get("nope"),
            Err(TvsError::ReviewNotFound(_))
        ));
    }
}
