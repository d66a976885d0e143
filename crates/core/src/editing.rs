//! Branch-scoped component authoring.
//!
//! The editing service is the write path for terminology content: it
//! validates payloads against the current branch state, allocates component
//! identifiers, and turns each edit into exactly one commit. Identifier
//! allocation is two-phase: SCTIDs are reserved before the commit and
//! registered as assigned only once the commit lands; a failed commit
//! releases the reservation so the item id can be handed out again.
//! Reference set member ids are UUIDs and need no reservation.

use crate::commit::{ChangeSet, ComponentChange};
use crate::component::{ComponentCategory, ComponentIdentifier, ComponentPayload};
use crate::config::CoreConfig;
use crate::store::{CommitRequest, ComponentState, RevisionStore};
use crate::{TvsError, TvsResult};
use sctid::{PartitionCategory, SctId, SctIdGenerator};
use std::sync::Arc;

/// Branch and attribution for one edit.
#[derive(Clone, Debug)]
pub struct EditContext {
    pub branch_path: String,
    pub author: String,
    pub comment: String,
}

/// Validated write access to terminology components.
#[derive(Clone)]
pub struct EditingService {
    store: Arc<RevisionStore>,
    ids: Arc<SctIdGenerator>,
    config: CoreConfig,
}

impl EditingService {
    pub fn new(store: Arc<RevisionStore>, ids: Arc<SctIdGenerator>, config: CoreConfig) -> Self {
        Self { store, ids, config }
    }

    pub fn identifiers(&self) -> &SctIdGenerator {
        &self.ids
    }

    /// Creates a component on a branch, allocating its identifier.
    ///
    /// Core components (concepts, descriptions, relationships) get a fresh
    /// SCTID in the configured namespace; reference set members get a UUID.
    /// References to other components must resolve on the branch.
    pub fn create(
        &self,
        context: &EditContext,
        payload: ComponentPayload,
    ) -> TvsResult<ComponentIdentifier> {
        let state = self.store.state_of(&context.branch_path)?;
        self.validate_references(&context.branch_path, &state, &payload)?;

        let category = payload.category();
        let (component, reserved) = match category {
            ComponentCategory::RefsetMember => (
                ComponentIdentifier::new(category, uuid::Uuid::new_v4().to_string()),
                None,
            ),
            _ => {
                let partition = partition_of(category)?;
                let mut ids =
                    self.ids
                        .reserve(self.config.default_namespace(), partition, 1)?;
                let id = ids
                    .pop()
                    .ok_or_else(|| TvsError::Internal("empty reservation".to_owned()))?;
                (
                    ComponentIdentifier::new(category, id.as_str()),
                    Some(id),
                )
            }
        };
        if state.contains_key(&component) {
            // Sequential allocation never collides; an existing entry means
            // the id space and the store disagree.
            if let Some(id) = &reserved {
                self.ids.release([id]);
            }
            return Err(TvsError::ComponentCollision(
                component.to_string(),
                context.branch_path.clone(),
            ));
        }

        let result = self.store.commit(CommitRequest {
            branch_path: context.branch_path.clone(),
            author: context.author.clone(),
            comment: context.comment.clone(),
            changes: ChangeSet::new(vec![ComponentChange::added(component.clone(), payload)]),
            expected_head: None,
        });
        match result {
            Ok(_) => {
                if let Some(id) = &reserved {
                    self.ids.register([id]);
                }
                Ok(component)
            }
            Err(error) => {
                if let Some(id) = &reserved {
                    self.ids.release([id]);
                }
                Err(error)
            }
        }
    }

    /// Replaces the payload of an existing component.
    pub fn update(
        &self,
        context: &EditContext,
        component: &ComponentIdentifier,
        payload: ComponentPayload,
    ) -> TvsResult<()> {
        if payload.category() != component.category {
            return Err(TvsError::InvalidInput(format!(
                "payload category {} does not match component {component}",
                payload.category()
            )));
        }
        let state = self.store.state_of(&context.branch_path)?;
        let current = state.get(component).ok_or_else(|| {
            TvsError::ComponentNotFound(component.to_string(), context.branch_path.clone())
        })?;
        if *current == payload {
            // Nothing to commit.
            return Ok(());
        }
        self.validate_references(&context.branch_path, &state, &payload)?;

        self.store.commit(CommitRequest {
            branch_path: context.branch_path.clone(),
            author: context.author.clone(),
            comment: context.comment.clone(),
            changes: ChangeSet::new(vec![ComponentChange::changed(component.clone(), payload)]),
            expected_head: None,
        })?;
        Ok(())
    }

    /// Deletes a component and everything that hangs off it.
    ///
    /// Deleting a concept removes, in the same commit, its descriptions, the
    /// relationships that point at it from either end, the reference set
    /// members that reference it, and the members of any reference set it
    /// identifies.
    pub fn delete(&self, context: &EditContext, component: &ComponentIdentifier) -> TvsResult<()> {
        let state = self.store.state_of(&context.branch_path)?;
        if !state.contains_key(component) {
            return Err(TvsError::ComponentNotFound(
                component.to_string(),
                context.branch_path.clone(),
            ));
        }

        let mut changes = ChangeSet::new(vec![ComponentChange::removed(component.clone())]);
        if component.category == ComponentCategory::Concept {
            for dependant in dependants_of(&state, &component.id) {
                changes.push(ComponentChange::removed(dependant));
            }
        }

        self.store.commit(CommitRequest {
            branch_path: context.branch_path.clone(),
            author: context.author.clone(),
            comment: context.comment.clone(),
            changes,
            expected_head: None,
        })?;
        Ok(())
    }

    /// Loads pre-identified components in one commit, registering their
    /// SCTIDs so future reservations skip the occupied item ids.
    pub fn bulk_load(
        &self,
        context: &EditContext,
        components: Vec<(ComponentIdentifier, ComponentPayload)>,
    ) -> TvsResult<usize> {
        if components.is_empty() {
            return Err(TvsError::InvalidInput(
                "bulk load requires at least one component".to_owned(),
            ));
        }
        let mut sctids = Vec::new();
        let mut changes = ChangeSet::default();
        for (component, payload) in components {
            if payload.category() != component.category {
                return Err(TvsError::InvalidInput(format!(
                    "payload category {} does not match component {component}",
                    payload.category()
                )));
            }
            if component.category != ComponentCategory::RefsetMember {
                let sctid = SctId::parse(&component.id)?;
                if sctid.category() != partition_of(component.category)? {
                    return Err(TvsError::InvalidInput(format!(
                        "identifier '{}' is not in the {} partition",
                        component.id, component.category
                    )));
                }
                sctids.push(sctid);
            }
            changes.push(ComponentChange::added(component, payload));
        }

        let count = changes.len();
        self.store.commit(CommitRequest {
            branch_path: context.branch_path.clone(),
            author: context.author.clone(),
            comment: context.comment.clone(),
            changes,
            expected_head: None,
        })?;
        self.ids.register(sctids.iter());
        tracing::info!(path = %context.branch_path, count, "bulk load committed");
        Ok(count)
    }

    fn validate_references(
        &self,
        branch_path: &str,
        state: &ComponentState,
        payload: &ComponentPayload,
    ) -> TvsResult<()> {
        let require_concept = |id: &str| -> TvsResult<()> {
            let concept = ComponentIdentifier::new(ComponentCategory::Concept, id);
            if state.contains_key(&concept) {
                Ok(())
            } else {
                Err(TvsError::ComponentNotFound(
                    concept.to_string(),
                    branch_path.to_owned(),
                ))
            }
        };
        match payload {
            ComponentPayload::Concept(_) => Ok(()),
            ComponentPayload::Description(d) => require_concept(&d.concept_id),
            ComponentPayload::Relationship(r) => {
                require_concept(&r.source_id)?;
                require_concept(&r.destination_id)
            }
            ComponentPayload::RefsetMember(m) => {
                require_concept(&m.refset_id)?;
                require_concept(&m.referenced_component_id)
            }
        }
    }
}

/// Components that must not outlive the given concept.
fn dependants_of(state: &ComponentState, concept_id: &str) -> Vec<ComponentIdentifier> {
    state
        .iter()
        .filter(|(component, payload)| {
            component.category != ComponentCategory::Concept
                && match payload {
                    ComponentPayload::Description(d) => d.concept_id == concept_id,
                    ComponentPayload::Relationship(r) => {
                        r.source_id == concept_id || r.destination_id == concept_id
                    }
                    ComponentPayload::RefsetMember(m) => {
                        m.refset_id == concept_id || m.referenced_component_id == concept_id
                    }
                    ComponentPayload::Concept(_) => false,
                }
        })
        .map(|(component, _)| component.clone())
        .collect()
}

fn partition_of(category: ComponentCategory) -> TvsResult<PartitionCategory> {
    match category {
        ComponentCategory::Concept => Ok(PartitionCategory::Concept),
        ComponentCategory::Description => Ok(PartitionCategory::Description),
        ComponentCategory::Relationship => Ok(PartitionCategory::Relationship),
        ComponentCategory::RefsetMember => Err(TvsError::InvalidInput(
            "reference set members are not identified by SCTIDs".to_owned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{
        ConceptPayload, DefinitionStatus, DescriptionPayload, RefsetKind, RefsetMemberPayload,
        RelationshipPayload,
    };
    use crate::config::CORE_MODULE_ID;

    fn service() -> (Arc<RevisionStore>, EditingService) {
        let store = Arc::new(RevisionStore::new());
        let editing = EditingService::new(
            Arc::clone(&store),
            Arc::new(SctIdGenerator::new()),
            CoreConfig::default(),
        );
        (store, editing)
    }

    fn context() -> EditContext {
        EditContext {
            branch_path: "MAIN".to_owned(),
            author: "test".to_owned(),
            comment: "test edit".to_owned(),
        }
    }

    fn concept_payload() -> ComponentPayload {
        ComponentPayload::Concept(ConceptPayload {
            module_id: CORE_MODULE_ID.to_owned(),
            active: true,
            definition_status: DefinitionStatus::Primitive,
            refset_kind: None,
        })
    }

    fn description_payload(concept_id: &str) -> ComponentPayload {
        ComponentPayload::Description(DescriptionPayload {
            concept_id: concept_id.to_owned(),
            module_id: CORE_MODULE_ID.to_owned(),
            active: true,
            term: "Test term".to_owned(),
            type_id: "900000000000013009".to_owned(),
            language_code: "en".to_owned(),
        })
    }

    #[test]
    fn created_concepts_get_valid_sctids() {
        let (store, editing) = service();
        let component = editing.create(&context(), concept_payload()).unwrap();
        assert_eq!(component.category, ComponentCategory::Concept);
        let sctid = SctId::parse(&component.id).unwrap();
        assert_eq!(sctid.category(), PartitionCategory::Concept);
        assert!(store.state_of("MAIN").unwrap().contains_key(&component));
    }

    #[test]
    fn refset_members_get_uuids() {
        let (_, editing) = service();
        let refset = editing
            .create(
                &context(),
                ComponentPayload::Concept(ConceptPayload {
                    module_id: CORE_MODULE_ID.to_owned(),
                    active: true,
                    definition_status: DefinitionStatus::Primitive,
                    refset_kind: Some(RefsetKind::Simple),
                }),
            )
            .unwrap();
        let referenced = editing.create(&context(), concept_payload()).unwrap();
        let member = editing
            .create(
                &context(),
                ComponentPayload::RefsetMember(RefsetMemberPayload {
                    refset_id: refset.id.clone(),
                    referenced_component_id: referenced.id.clone(),
                    module_id: CORE_MODULE_ID.to_owned(),
                    active: true,
                }),
            )
            .unwrap();
        assert!(uuid::Uuid::parse_str(&member.id).is_ok());
    }

    #[test]
    fn description_for_missing_concept_is_rejected() {
        let (_, editing) = service();
        assert!(matches!(
            editing.create(&context(), description_payload("138875005")),
            Err(TvsError::ComponentNotFound(_, _))
        ));
    }

    #[test]
    fn consecutive_creations_never_reuse_ids() {
        let (_, editing) = service();
        let first = editing.create(&context(), concept_payload()).unwrap();
        let second = editing.create(&context(), concept_payload()).unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn update_replaces_the_payload() {
        let (store, editing) = service();
        let component = editing.create(&context(), concept_payload()).unwrap();
        editing
            .update(
                &context(),
                &component,
                ComponentPayload::Concept(ConceptPayload {
                    module_id: CORE_MODULE_ID.to_owned(),
                    active: false,
                    definition_status: DefinitionStatus::Primitive,
                    refset_kind: None,
                }),
            )
            .unwrap();
        let payload = store.get_component("MAIN", &component).unwrap();
        assert!(matches!(
            payload,
            ComponentPayload::Concept(ConceptPayload { active: false, .. })
        ));
    }

    #[test]
    fn identical_update_is_a_no_op() {
        let (store, editing) = service();
        let component = editing.create(&context(), concept_payload()).unwrap();
        let head = store.get_branch("MAIN").unwrap().head_timestamp;
        editing.update(&context(), &component, concept_payload()).unwrap();
        assert_eq!(store.get_branch("MAIN").unwrap().head_timestamp, head);
    }

    #[test]
    fn update_of_missing_component_is_not_found() {
        let (_, editing) = service();
        assert!(matches!(
            editing.update(
                &context(),
                &ComponentIdentifier::new(ComponentCategory::Concept, "138875005"),
                concept_payload(),
            ),
            Err(TvsError::ComponentNotFound(_, _))
        ));
    }

    #[test]
    fn deleting_a_concept_cascades_in_one_commit() {
        let (store, editing) = service();
        let concept = editing.create(&context(), concept_payload()).unwrap();
        let other = editing.create(&context(), concept_payload()).unwrap();
        let description = editing
            .create(&context(), description_payload(&concept.id))
            .unwrap();
        let relationship = editing
            .create(
                &context(),
                ComponentPayload::Relationship(RelationshipPayload {
                    source_id: concept.id.clone(),
                    type_id: other.id.clone(),
                    destination_id: other.id.clone(),
                    module_id: CORE_MODULE_ID.to_owned(),
                    active: true,
                    group: 0,
                }),
            )
            .unwrap();

        let head_before = store.get_branch("MAIN").unwrap().head_timestamp;
        editing.delete(&context(), &concept).unwrap();

        let state = store.state_of("MAIN").unwrap();
        assert!(!state.contains_key(&concept));
        assert!(!state.contains_key(&description));
        assert!(!state.contains_key(&relationship));
        assert!(state.contains_key(&other));
        // One commit covers the whole cascade.
        let commits = store.visible_commits("MAIN").unwrap();
        assert_eq!(
            commits.iter().filter(|c| c.timestamp > head_before).count(),
            1
        );
    }

    #[test]
    fn deleting_a_refset_concept_removes_its_members() {
        let (store, editing) = service();
        let refset = editing
            .create(
                &context(),
                ComponentPayload::Concept(ConceptPayload {
                    module_id: CORE_MODULE_ID.to_owned(),
                    active: true,
                    definition_status: DefinitionStatus::Primitive,
                    refset_kind: Some(RefsetKind::Query),
                }),
            )
            .unwrap();
        let referenced = editing.create(&context(), concept_payload()).unwrap();
        let member = editing
            .create(
                &context(),
                ComponentPayload::RefsetMember(RefsetMemberPayload {
                    refset_id: refset.id.clone(),
                    referenced_component_id: referenced.id.clone(),
                    module_id: CORE_MODULE_ID.to_owned(),
                    active: true,
                }),
            )
            .unwrap();

        editing.delete(&context(), &refset).unwrap();
        let state = store.state_of("MAIN").unwrap();
        assert!(!state.contains_key(&member));
        assert!(state.contains_key(&referenced));
    }

    #[test]
    fn bulk_load_registers_existing_sctids() {
        let (store, editing) = service();
        let component = ComponentIdentifier::new(ComponentCategory::Concept, "138875005");
        editing
            .bulk_load(&context(), vec![(component.clone(), concept_payload())])
            .unwrap();
        assert!(store.state_of("MAIN").unwrap().contains_key(&component));
        // Loaded ids are blocked from future reservation.
        let loaded = SctId::parse("138875005").unwrap();
        assert!(!editing.identifiers().is_reserved(&loaded));
    }

    #[test]
    fn bulk_load_rejects_malformed_sctids() {
        let (_, editing) = service();
        let component = ComponentIdentifier::new(ComponentCategory::Concept, "12345");
        assert!(editing
            .bulk_load(&context(), vec![(component, concept_payload())])
            .is_err());
    }

    #[test]
    fn bulk_load_rejects_ids_from_the_wrong_partition() {
        let (store, editing) = service();
        // A structurally valid SCTID whose partition says "description"
        // cannot identify a concept.
        let description_id = SctId::new_short(123456, PartitionCategory::Description).unwrap();
        let component =
            ComponentIdentifier::new(ComponentCategory::Concept, description_id.as_str());
        let head_before = store.get_branch("MAIN").unwrap().head_timestamp;
        assert!(matches!(
            editing.bulk_load(&context(), vec![(component, concept_payload())]),
            Err(TvsError::InvalidInput(_))
        ));
        assert_eq!(store.get_branch("MAIN").unwrap().head_timestamp, head_before);
    }

    #[test]
    fn deleting_a_referenced_concept_removes_its_members() {
        let (store, editing) = service();
        let refset = editing
            .create(
                &context(),
                ComponentPayload::Concept(ConceptPayload {
                    module_id: CORE_MODULE_ID.to_owned(),
                    active: true,
                    definition_status: DefinitionStatus::Primitive,
                    refset_kind: Some(RefsetKind::Simple),
                }),
            )
            .unwrap();
        let referenced = editing.create(&context(), concept_payload()).unwrap();
        let member = editing
            .create(
                &context(),
                ComponentPayload::RefsetMember(RefsetMemberPayload {
                    refset_id: refset.id.clone(),
                    referenced_component_id: referenced.id.clone(),
                    module_id: CORE_MODULE_ID.to_owned(),
                    active: true,
                }),
            )
            .unwrap();

        // Deleting the member's referenced concept takes the member with it
        // but leaves the reference set itself alone.
        editing.delete(&context(), &referenced).unwrap();
        let state = store.state_of("MAIN").unwrap();
        assert!(!state.contains_key(&member));
        assert!(state.contains_key(&refset));
    }
}
