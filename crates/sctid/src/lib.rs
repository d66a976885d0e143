//! SNOMED CT identifier (SCTID) handling.
//!
//! An SCTID is a string of 6 to 18 digits with structure encoded in its tail:
//!
//! - the last digit is a Verhoeff check digit computed over all preceding digits,
//! - the two digits before it are the *partition identifier*, which encodes
//!   whether the id carries a namespace and which component category it names,
//! - long-format ids carry a 7-digit extension namespace immediately before the
//!   partition identifier,
//! - everything in front is the *item identifier* allocated by the issuer.
//!
//! This crate provides [`SctId`], a validated value type that guarantees the
//! contained identifier is well-formed, and [`SctIdGenerator`], an in-process
//! allocator with reserve/register/release semantics so that ids can be handed
//! out ahead of the commit that embeds them without ever issuing the same id
//! twice.

mod generator;
mod sctid;
mod verhoeff;

pub use generator::SctIdGenerator;
pub use sctid::{Namespace, PartitionCategory, SctId};

/// Errors produced while parsing or allocating SCTIDs.
#[derive(Debug, thiserror::Error)]
pub enum SctIdError {
    #[error("invalid SCTID: {0}")]
    InvalidSctId(String),
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),
    #[error("identifier space exhausted for namespace {namespace} and category {category}")]
    NamespaceExhausted {
        namespace: String,
        category: PartitionCategory,
    },
    #[error("cannot reserve zero identifiers")]
    EmptyReservation,
}

pub type SctIdResult<T> = std::result::Result<T, SctIdError>;
