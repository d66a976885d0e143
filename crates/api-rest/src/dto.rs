//! Request and response shapes of the REST API.
//!
//! DTOs are separate from the core model so the wire format can carry
//! OpenAPI schemas without pulling documentation concerns into `tvs-core`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tvs_core::component::{
    ConceptPayload, DefinitionStatus, DescriptionPayload, RefsetKind, RefsetMemberPayload,
    RelationshipPayload,
};
use tvs_core::{
    Branch, CompareResult, ComponentCategory, ComponentIdentifier, ComponentPayload, Conflict,
    Job, JobStatus, Merge, Review,
};
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthRes {
    pub status: String,
}

// --- branches ---

#[derive(Deserialize, ToSchema)]
pub struct CreateBranchReq {
    /// Path of the parent branch, e.g. `MAIN` or `MAIN/project`.
    pub parent: String,
    /// Name of the new child branch.
    pub name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct BranchRes {
    pub path: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_path: Option<String>,
    pub base_timestamp: i64,
    pub head_timestamp: i64,
    pub deleted: bool,
    pub metadata: BTreeMap<String, String>,
    /// Classification against the parent: UP_TO_DATE, FORWARD, BEHIND,
    /// DIVERGED or STALE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl BranchRes {
    pub fn from_branch(branch: Branch, state: Option<tvs_core::BranchState>) -> Self {
        Self {
            path: branch.path,
            name: branch.name,
            parent_path: branch.parent_path,
            base_timestamp: branch.base_timestamp,
            head_timestamp: branch.head_timestamp,
            deleted: branch.deleted,
            metadata: branch.metadata,
            state: state.map(|s| screaming(&s)),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct BranchChildrenRes {
    pub items: Vec<BranchRes>,
}

// --- compare ---

#[derive(Deserialize, ToSchema)]
pub struct CompareReq {
    pub base: String,
    pub compare: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ComponentRef {
    /// CONCEPT, DESCRIPTION, RELATIONSHIP or REFSET_MEMBER.
    pub category: String,
    pub id: String,
}

impl From<&ComponentIdentifier> for ComponentRef {
    fn from(component: &ComponentIdentifier) -> Self {
        Self {
            category: component.category.to_string(),
            id: component.id.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CompareRes {
    pub base_branch: String,
    pub compare_branch: String,
    pub new_components: Vec<ComponentRef>,
    pub changed_components: Vec<ComponentRef>,
    pub deleted_components: Vec<ComponentRef>,
}

impl From<CompareResult> for CompareRes {
    fn from(result: CompareResult) -> Self {
        Self {
            base_branch: result.base_branch,
            compare_branch: result.compare_branch,
            new_components: result.new_components.iter().map(Into::into).collect(),
            changed_components: result.changed_components.iter().map(Into::into).collect(),
            deleted_components: result.deleted_components.iter().map(Into::into).collect(),
        }
    }
}

// --- reviews ---

#[derive(Deserialize, ToSchema)]
pub struct CreateReviewReq {
    pub source: String,
    pub target: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ReviewRes {
    pub id: String,
    pub source: String,
    pub target: String,
    /// PENDING, CURRENT, FAILED or STALE.
    pub status: String,
}

impl From<Review> for ReviewRes {
    fn from(review: Review) -> Self {
        Self {
            id: review.id,
            source: review.source,
            target: review.target,
            status: screaming(&review.status),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ConceptChangesRes {
    pub id: String,
    pub new_concepts: Vec<String>,
    pub changed_concepts: Vec<String>,
    pub deleted_concepts: Vec<String>,
}

impl From<tvs_core::ConceptChanges> for ConceptChangesRes {
    fn from(changes: tvs_core::ConceptChanges) -> Self {
        Self {
            id: changes.id,
            new_concepts: changes.new_concepts.into_iter().collect(),
            changed_concepts: changes.changed_concepts.into_iter().collect(),
            deleted_concepts: changes.deleted_concepts.into_iter().collect(),
        }
    }
}

// --- merges ---

#[derive(Deserialize, ToSchema)]
pub struct CreateMergeReq {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub commit_comment: Option<String>,
    /// Id of a CURRENT review covering this merge, if one is required.
    #[serde(default)]
    pub review_id: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ConflictRes {
    pub category: String,
    pub id: String,
    /// CONCURRENT_UPDATE, UPDATE_ON_DELETED or DELETE_ON_UPDATED.
    pub kind: String,
    /// Payload fields the two sides disagree on, for CONCURRENT_UPDATE.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub differing_fields: Vec<String>,
}

impl From<&Conflict> for ConflictRes {
    fn from(conflict: &Conflict) -> Self {
        Self {
            category: conflict.component.category.to_string(),
            id: conflict.component.id.clone(),
            kind: screaming(&conflict.kind),
            differing_fields: conflict.differing_fields.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MergeRes {
    pub id: String,
    pub source: String,
    pub target: String,
    /// SCHEDULED, IN_PROGRESS, COMPLETED, CONFLICTS or FAILED.
    pub status: String,
    pub conflicts: Vec<ConflictRes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl From<Merge> for MergeRes {
    fn from(merge: Merge) -> Self {
        Self {
            id: merge.id,
            source: merge.source,
            target: merge.target,
            status: screaming(&merge.status),
            conflicts: merge.conflicts.iter().map(Into::into).collect(),
            failure_reason: merge.failure_reason,
        }
    }
}

// --- components ---

/// Payload of a versioned component, tagged by category.
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "category")]
pub enum ComponentPayloadDto {
    Concept {
        module_id: String,
        active: bool,
        /// PRIMITIVE or FULLY_DEFINED.
        definition_status: String,
        /// SIMPLE or QUERY, when the concept identifies a reference set.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refset_kind: Option<String>,
    },
    Description {
        concept_id: String,
        module_id: String,
        active: bool,
        term: String,
        type_id: String,
        language_code: String,
    },
    Relationship {
        source_id: String,
        type_id: String,
        destination_id: String,
        module_id: String,
        active: bool,
        group: i64,
    },
    RefsetMember {
        refset_id: String,
        referenced_component_id: String,
        module_id: String,
        active: bool,
    },
}

impl ComponentPayloadDto {
    pub fn into_payload(self) -> Result<ComponentPayload, String> {
        match self {
            Self::Concept {
                module_id,
                active,
                definition_status,
                refset_kind,
            } => Ok(ComponentPayload::Concept(ConceptPayload {
                module_id,
                active,
                definition_status: match definition_status.as_str() {
                    "PRIMITIVE" => DefinitionStatus::Primitive,
                    "FULLY_DEFINED" => DefinitionStatus::FullyDefined,
                    other => return Err(format!("unknown definition status '{other}'")),
                },
                refset_kind: match refset_kind.as_deref() {
                    None => None,
                    Some("SIMPLE") => Some(RefsetKind::Simple),
                    Some("QUERY") => Some(RefsetKind::Query),
                    Some(other) => return Err(format!("unknown refset kind '{other}'")),
                },
            })),
            Self::Description {
                concept_id,
                module_id,
                active,
                term,
                type_id,
                language_code,
            } => Ok(ComponentPayload::Description(DescriptionPayload {
                concept_id,
                module_id,
                active,
                term,
                type_id,
                language_code,
            })),
            Self::Relationship {
                source_id,
                type_id,
                destination_id,
                module_id,
                active,
                group,
            } => Ok(ComponentPayload::Relationship(RelationshipPayload {
                source_id,
                type_id,
                destination_id,
                module_id,
                active,
                group,
            })),
            Self::RefsetMember {
                refset_id,
                referenced_component_id,
                module_id,
                active,
            } => Ok(ComponentPayload::RefsetMember(RefsetMemberPayload {
                refset_id,
                referenced_component_id,
                module_id,
                active,
            })),
        }
    }

    pub fn from_payload(payload: &ComponentPayload) -> Self {
        match payload {
            ComponentPayload::Concept(c) => Self::Concept {
                module_id: c.module_id.clone(),
                active: c.active,
                definition_status: screaming(&c.definition_status),
                refset_kind: c.refset_kind.map(|k| screaming(&k)),
            },
            ComponentPayload::Description(d) => Self::Description {
                concept_id: d.concept_id.clone(),
                module_id: d.module_id.clone(),
                active: d.active,
                term: d.term.clone(),
                type_id: d.type_id.clone(),
                language_code: d.language_code.clone(),
            },
            ComponentPayload::Relationship(r) => Self::Relationship {
                source_id: r.source_id.clone(),
                type_id: r.type_id.clone(),
                destination_id: r.destination_id.clone(),
                module_id: r.module_id.clone(),
                active: r.active,
                group: r.group,
            },
            ComponentPayload::RefsetMember(m) => Self::RefsetMember {
                refset_id: m.refset_id.clone(),
                referenced_component_id: m.referenced_component_id.clone(),
                module_id: m.module_id.clone(),
                active: m.active,
            },
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateComponentReq {
    pub branch: String,
    pub author: String,
    pub comment: String,
    pub payload: ComponentPayloadDto,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateComponentReq {
    pub branch: String,
    pub author: String,
    pub comment: String,
    pub payload: ComponentPayloadDto,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ComponentRes {
    pub category: String,
    pub id: String,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<ComponentPayloadDto>,
}

// --- jobs ---

#[derive(Deserialize, ToSchema)]
pub struct ImportReq {
    pub branch: String,
    pub author: String,
    pub comment: String,
    /// Pre-identified components, e.g. a release file already parsed.
    pub components: Vec<ImportComponent>,
}

#[derive(Deserialize, ToSchema)]
pub struct ImportComponent {
    /// CONCEPT, DESCRIPTION, RELATIONSHIP or REFSET_MEMBER.
    pub category: String,
    pub id: String,
    pub payload: ComponentPayloadDto,
}

#[derive(Deserialize, ToSchema)]
pub struct ExportReq {
    pub branch: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct JobRes {
    pub id: String,
    pub kind: String,
    /// RUNNING, COMPLETED or FAILED.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl From<Job> for JobRes {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            status: match job.status {
                JobStatus::Running => "RUNNING".to_owned(),
                JobStatus::Completed => "COMPLETED".to_owned(),
                JobStatus::Failed => "FAILED".to_owned(),
            },
            result: job.result,
        }
    }
}

pub fn parse_category(value: &str) -> Result<ComponentCategory, String> {
    match value {
        "CONCEPT" => Ok(ComponentCategory::Concept),
        "DESCRIPTION" => Ok(ComponentCategory::Description),
        "RELATIONSHIP" => Ok(ComponentCategory::Relationship),
        "REFSET_MEMBER" => Ok(ComponentCategory::RefsetMember),
        other => Err(format!("unknown component category '{other}'")),
    }
}

/// Renders a unit-style serde enum as its SCREAMING_SNAKE_CASE wire value.
fn screaming<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tvs_core::{ConflictKind, MergeStatus, ReviewStatus};

    #[test]
    fn merge_status_renders_as_wire_value() {
        assert_eq!(screaming(&MergeStatus::InProgress), "IN_PROGRESS");
        assert_eq!(screaming(&ReviewStatus::Current), "CURRENT");
        assert_eq!(screaming(&ConflictKind::UpdateOnDeleted), "UPDATE_ON_DELETED");
    }

    #[test]
    fn conflict_body_carries_the_differing_fields() {
        let conflict = Conflict {
            component: ComponentIdentifier::new(ComponentCategory::Concept, "138875005"),
            kind: ConflictKind::ConcurrentUpdate,
            differing_fields: vec!["active".to_owned(), "module_id".to_owned()],
        };
        let body = serde_json::to_value(ConflictRes::from(&conflict)).unwrap();
        assert_eq!(body["kind"], "CONCURRENT_UPDATE");
        assert_eq!(
            body["differing_fields"],
            serde_json::json!(["active", "module_id"])
        );

        // Update/delete crosses carry no field list and omit the key.
        let deleted = Conflict {
            component: ComponentIdentifier::new(ComponentCategory::Concept, "138875005"),
            kind: ConflictKind::UpdateOnDeleted,
            differing_fields: Vec::new(),
        };
        let body = serde_json::to_value(ConflictRes::from(&deleted)).unwrap();
        assert!(body.get("differing_fields").is_none());
    }

    #[test]
    fn payload_dto_round_trips_through_the_core_model() {
        let dto = ComponentPayloadDto::Concept {
            module_id: "900000000000207008".to_owned(),
            active: true,
            definition_status: "PRIMITIVE".to_owned(),
            refset_kind: Some("SIMPLE".to_owned()),
        };
        let payload = dto.into_payload().unwrap();
        assert!(matches!(
            &payload,
            ComponentPayload::Concept(ConceptPayload {
                refset_kind: Some(RefsetKind::Simple),
                ..
            })
        ));
        let back = ComponentPayloadDto::from_payload(&payload);
        assert!(matches!(
            back,
            ComponentPayloadDto::Concept { ref definition_status, .. }
                if definition_status == "PRIMITIVE"
        ));
    }

    #[test]
    fn unknown_definition_status_is_rejected() {
        let dto = ComponentPayloadDto::Concept {
            module_id: "900000000000207008".to_owned(),
            active: true,
            definition_status: "SOMETIMES".to_owned(),
            refset_kind: None,
        };
        assert!(dto.into_payload().is_err());
    }

    #[test]
    fn category_parsing_matches_wire_names() {
        assert_eq!(parse_category("CONCEPT").unwrap(), ComponentCategory::Concept);
        assert!(parse_category("concept").is_err());
    }
}
