//! Terminology component model.
//!
//! Components are the unit of versioning: every commit records which
//! components it added, changed or removed, and merges reconcile concurrent
//! edits component by component. Payloads are plain typed structs; field
//! values are exposed through the [`PropertyValue`] sum type so conflict
//! detection can report exactly which fields diverged without reflection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four versioned component categories of a SNOMED CT code system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentCategory {
    Concept,
    Description,
    Relationship,
    RefsetMember,
}

impl ComponentCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Concept => "CONCEPT",
            Self::Description => "DESCRIPTION",
            Self::Relationship => "RELATIONSHIP",
            Self::RefsetMember => "REFSET_MEMBER",
        }
    }
}

impl fmt::Display for ComponentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Globally unique component key: category plus component id.
///
/// Concept, description and relationship ids are SCTIDs; reference set
/// member ids are UUIDs. The id is kept as a string here so the store stays
/// agnostic of the allocation scheme; the editing service validates ids at
/// the boundary.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentIdentifier {
    pub category: ComponentCategory,
    pub id: String,
}

impl ComponentIdentifier {
    pub fn new(category: ComponentCategory, id: impl Into<String>) -> Self {
        Self {
            category,
            id: id.into(),
        }
    }
}

impl fmt::Display for ComponentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.id)
    }
}

/// A single typed field value, used for field-level payload comparison.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "value")]
pub enum PropertyValue {
    Bool(bool),
    /// An id-valued field (module, type, destination and similar).
    Code(String),
    Str(String),
    Int(i64),
}

/// Whether a concept is fully defined by its modelled relationships.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DefinitionStatus {
    Primitive,
    FullyDefined,
}

/// The two reference set flavours this store versions.
///
/// Query-type reference sets store an expression instead of enumerated
/// members; their members reference the reference set concept the query
/// maintains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefsetKind {
    Simple,
    Query,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptPayload {
    pub module_id: String,
    pub active: bool,
    pub definition_status: DefinitionStatus,
    /// Reference set behaviour when this concept is used as a reference set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refset_kind: Option<RefsetKind>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionPayload {
    pub concept_id: String,
    pub module_id: String,
    pub active: bool,
    pub term: String,
    /// Description type concept (FSN, synonym, definition).
    pub type_id: String,
    pub language_code: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipPayload {
    pub source_id: String,
    pub type_id: String,
    pub destination_id: String,
    pub module_id: String,
    pub active: bool,
    pub group: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefsetMemberPayload {
    pub refset_id: String,
    pub referenced_component_id: String,
    pub module_id: String,
    pub active: bool,
}

/// Typed payload of a versioned component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "category")]
pub enum ComponentPayload {
    Concept(ConceptPayload),
    Description(DescriptionPayload),
    Relationship(RelationshipPayload),
    RefsetMember(RefsetMemberPayload),
}

impl ComponentPayload {
    pub fn category(&self) -> ComponentCategory {
        match self {
            Self::Concept(_) => ComponentCategory::Concept,
            Self::Description(_) => ComponentCategory::Description,
            Self::Relationship(_) => ComponentCategory::Relationship,
            Self::RefsetMember(_) => ComponentCategory::RefsetMember,
        }
    }

    /// Field-by-field view of the payload.
    pub fn fields(&self) -> Vec<(&'static str, PropertyValue)> {
        match self {
            Self::Concept(c) => {
                let mut fields = vec![
                    ("moduleId", PropertyValue::Code(c.module_id.clone())),
                    ("active", PropertyValue::Bool(c.active)),
                    (
                        "definitionStatus",
                        PropertyValue::Str(format!("{:?}", c.definition_status)),
                    ),
                ];
                if let Some(kind) = c.refset_kind {
                    fields.push(("refsetKind", PropertyValue::Str(format!("{kind:?}"))));
                }
                fields
            }
            Self::Description(d) => vec![
                ("conceptId", PropertyValue::Code(d.concept_id.clone())),
                ("moduleId", PropertyValue::Code(d.module_id.clone())),
                ("active", PropertyValue::Bool(d.active)),
                ("term", PropertyValue::Str(d.term.clone())),
                ("typeId", PropertyValue::Code(d.type_id.clone())),
                ("languageCode", PropertyValue::Str(d.language_code.clone())),
            ],
            Self::Relationship(r) => vec![
                ("sourceId", PropertyValue::Code(r.source_id.clone())),
                ("typeId", PropertyValue::Code(r.type_id.clone())),
                ("destinationId", PropertyValue::Code(r.destination_id.clone())),
                ("moduleId", PropertyValue::Code(r.module_id.clone())),
                ("active", PropertyValue::Bool(r.active)),
                ("group", PropertyValue::Int(r.group)),
            ],
            Self::RefsetMember(m) => vec![
                ("refsetId", PropertyValue::Code(m.refset_id.clone())),
                (
                    "referencedComponentId",
                    PropertyValue::Code(m.referenced_component_id.clone()),
                ),
                ("moduleId", PropertyValue::Code(m.module_id.clone())),
                ("active", PropertyValue::Bool(m.active)),
            ],
        }
    }

    /// Names of fields whose values differ between two payloads of the same
    /// category. Payloads of different categories differ in every field.
    pub fn differing_fields(&self, other: &Self) -> Vec<String> {
        let mine = self.fields();
        let theirs = other.fields();
        if self.category() != other.category() {
            return mine.into_iter().map(|(name, _)| name.to_owned()).collect();
        }
        mine.into_iter()
            .filter(|(name, value)| {
                theirs
                    .iter()
                    .find(|(other_name, _)| other_name == name)
                    .is_none_or(|(_, other_value)| other_value != value)
            })
            .map(|(name, _)| name.to_owned())
            .collect()
    }

    /// The concept a change to this component is attributed to in
    /// concept-level change summaries.
    pub fn owning_concept_id(&self, own_id: &str) -> String {
        match self {
            Self::Concept(_) => own_id.to_owned(),
            Self::Description(d) => d.concept_id.clone(),
            Self::Relationship(r) => r.source_id.clone(),
            Self::RefsetMember(m) => m.referenced_component_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(module: &str, active: bool) -> ComponentPayload {
        ComponentPayload::Concept(ConceptPayload {
            module_id: module.to_owned(),
            active,
            definition_status: DefinitionStatus::Primitive,
            refset_kind: None,
        })
    }

    #[test]
    fn identical_payloads_have_no_differing_fields() {
        let a = concept("900000000000207008", true);
        assert!(a.differing_fields(&a).is_empty());
    }

    #[test]
    fn differing_fields_are_named() {
        let a = concept("900000000000207008", true);
        let b = concept("900000000000207008", false);
        assert_eq!(a.differing_fields(&b), vec!["active".to_owned()]);
    }

    #[test]
    fn category_mismatch_differs_everywhere() {
        let a = concept("900000000000207008", true);
        let b = ComponentPayload::Description(DescriptionPayload {
            concept_id: "138875005".to_owned(),
            module_id: "900000000000207008".to_owned(),
            active: true,
            term: "SNOMED CT Concept".to_owned(),
            type_id: "900000000000003001".to_owned(),
            language_code: "en".to_owned(),
        });
        assert_eq!(a.differing_fields(&b).len(), a.fields().len());
    }

    #[test]
    fn owning_concept_follows_the_component_kind() {
        let description = ComponentPayload::Description(DescriptionPayload {
            concept_id: "138875005".to_owned(),
            module_id: "900000000000207008".to_owned(),
            active: true,
            term: "term".to_owned(),
            type_id: "900000000000013009".to_owned(),
            language_code: "en".to_owned(),
        });
        assert_eq!(description.owning_concept_id("d1"), "138875005");

        let relationship = ComponentPayload::Relationship(RelationshipPayload {
            source_id: "64572001".to_owned(),
            type_id: "408729009".to_owned(),
            destination_id: "410510008".to_owned(),
            module_id: "900000000000207008".to_owned(),
            active: true,
            group: 0,
        });
        assert_eq!(relationship.owning_concept_id("r1"), "64572001");
    }

    #[test]
    fn payload_serialization_is_tagged_by_category() {
        let json = serde_json::to_value(concept("900000000000207008", true)).unwrap();
        assert_eq!(json["category"], "CONCEPT");
        assert_eq!(json["module_id"], "900000000000207008");
    }
}
