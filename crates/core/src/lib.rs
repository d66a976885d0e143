//! # TVS Core
//!
//! Core business logic for the terminology versioning system: a branch-aware
//! revision store for SNOMED CT-style content.
//!
//! This crate contains the pure versioning model and its services:
//! - Branching with base/head timestamps over an append-only commit log
//! - Compare, review and merge/rebase between a branch and its parent
//! - Component authoring with SCTID allocation and referential cascade
//!
//! **No API concerns**: HTTP servers and request/response shapes belong in
//! `api-rest`.

pub mod branch;
pub mod commit;
pub mod compare;
pub mod component;
pub mod config;
pub mod editing;
mod error;
pub mod job;
pub mod merge;
pub mod review;
pub mod store;

pub use branch::{Branch, BranchState, Metadata, MAIN};
pub use commit::{ChangeKind, ChangeSet, Commit, ComponentChange};
pub use compare::{CompareResult, CompareService};
pub use component::{ComponentCategory, ComponentIdentifier, ComponentPayload};
pub use config::CoreConfig;
pub use editing::{EditContext, EditingService};
pub use error::{TvsError, TvsResult};
pub use job::{Job, JobRegistry, JobStatus};
pub use merge::{Conflict, ConflictKind, Merge, MergeRequest, MergeService, MergeStatus};
pub use review::{ConceptChanges, Review, ReviewService, ReviewStatus};
pub use store::{CommitRequest, ComponentState, RevisionStore};
