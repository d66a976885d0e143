//! Branch model.
//!
//! Branch paths are slash-delimited and rooted at `MAIN`. A branch records
//! the identifier of the parent *generation* it was created from and the
//! parent's head timestamp at that moment (the base). The base never changes
//! for the lifetime of a branch object; a rebase produces a fresh generation
//! of the same path with a new base, which is how the store keeps the
//! invariant and still lets branches catch up with their parent.

use crate::{TvsError, TvsResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tvs_types::BranchSegment;

/// Path of the repository root branch.
pub const MAIN: &str = "MAIN";

/// Free-form branch metadata.
pub type Metadata = BTreeMap<String, String>;

/// Relation of a branch to another branch (normally its parent) in terms of
/// commits made since the fork point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BranchState {
    /// Neither side committed since the fork.
    UpToDate,
    /// Only this branch committed; it can be fast-forwarded into the other.
    Forward,
    /// Only the other branch committed.
    Behind,
    /// Both sides committed.
    Diverged,
    /// The fork point is gone: the other side was reopened or deleted.
    Stale,
}

/// One branch generation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Branch {
    /// Store-assigned generation id; a reopened path gets a new one.
    pub id: u64,
    pub path: String,
    pub name: String,
    /// Generation id of the parent this branch was forked from; `None` only
    /// for `MAIN`.
    pub parent_id: Option<u64>,
    pub parent_path: Option<String>,
    /// Timestamp on the parent's commit log this branch forked from.
    /// Immutable for the lifetime of this generation.
    pub base_timestamp: i64,
    /// Timestamp of the latest commit on this branch; monotonically
    /// increasing, never below `base_timestamp`.
    pub head_timestamp: i64,
    pub deleted: bool,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Branch {
    /// True if this branch has commits of its own since it was forked.
    pub fn has_own_changes(&self) -> bool {
        self.head_timestamp > self.base_timestamp
    }
}

/// Splits a branch path into its parent path and final segment.
///
/// Returns `None` for `MAIN`, which has no parent.
pub fn split_path(path: &str) -> Option<(&str, &str)> {
    path.rsplit_once('/')
}

/// Validates a slash-delimited branch path: every segment must be a valid
/// [`BranchSegment`] and the path must be rooted at `MAIN`.
pub fn validate_path(path: &str) -> TvsResult<()> {
    let mut segments = path.split('/');
    match segments.next() {
        Some(MAIN) => {}
        _ => {
            return Err(TvsError::InvalidInput(format!(
                "branch path '{path}' must be rooted at {MAIN}"
            )))
        }
    }
    for segment in segments {
        BranchSegment::from_str(segment)?;
    }
    Ok(())
}

/// Joins a parent path and a child name into a child path.
pub fn join_path(parent: &str, name: &str) -> String {
    format!("{parent}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_path_is_valid() {
        assert!(validate_path("MAIN").is_ok());
    }

    #[test]
    fn nested_paths_are_valid() {
        assert!(validate_path("MAIN/task-1").is_ok());
        assert!(validate_path("MAIN/project/task-1").is_ok());
    }

    #[test]
    fn unrooted_paths_are_invalid() {
        assert!(validate_path("task-1").is_err());
        assert!(validate_path("main/task-1").is_err());
        assert!(validate_path("").is_err());
    }

    #[test]
    fn bad_segments_are_invalid() {
        assert!(validate_path("MAIN//x").is_err());
        assert!(validate_path("MAIN/a b").is_err());
        assert!(validate_path("MAIN/a/").is_err());
    }

    #[test]
    fn split_path_returns_parent_and_name() {
        assert_eq!(split_path("MAIN/a/b"), Some(("MAIN/a", "b")));
        assert_eq!(split_path("MAIN"), None);
    }

    #[test]
    fn branch_state_serializes_screaming() {
        let json = serde_json::to_string(&BranchState::UpToDate).unwrap();
        assert_eq!(json, "\"UP_TO_DATE\"");
    }
}
