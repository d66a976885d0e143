/// Error taxonomy of the terminology versioning core.
///
/// Variants group into the five externally visible classes: not-found,
/// conflict (optimistic concurrency, duplicate paths, stale reviews,
/// unresolved merge conflicts), bad request, resource exhaustion and
/// internal failure. The REST layer maps each class onto an HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum TvsError {
    #[error("branch '{0}' does not exist")]
    BranchNotFound(String),
    #[error("branch '{0}' already exists")]
    BranchCollision(String),
    #[error("merge '{0}' does not exist")]
    MergeNotFound(String),
    #[error("review '{0}' does not exist")]
    ReviewNotFound(String),
    #[error("component '{0}' does not exist on branch '{1}'")]
    ComponentNotFound(String, String),
    #[error("job '{0}' does not exist")]
    JobNotFound(String),

    #[error("branch '{branch}' head moved (expected {expected}, found {actual})")]
    HeadMoved {
        branch: String,
        expected: i64,
        actual: i64,
    },
    #[error("branch '{0}' is deleted")]
    BranchDeleted(String),
    #[error("review '{0}' is not current")]
    ReviewNotCurrent(String),
    #[error("component '{0}' already exists on branch '{1}'")]
    ComponentCollision(String, String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid branch path: {0}")]
    InvalidBranchPath(#[from] tvs_types::TextError),

    #[error("identifier allocation failed: {0}")]
    Identifier(#[from] sctid::SctIdError),

    #[error("failed to serialize: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl TvsError {
    /// True for errors a client can resolve by fixing the request rather
    /// than by retrying.
    pub fn is_bad_request(&self) -> bool {
        match self {
            Self::InvalidInput(_) | Self::InvalidBranchPath(_) => true,
            Self::Identifier(inner) => !matches!(inner, sctid::SctIdError::NamespaceExhausted { .. }),
            _ => false,
        }
    }

    /// True when an identifier namespace has run out of allocatable ids.
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            Self::Identifier(sctid::SctIdError::NamespaceExhausted { .. })
        )
    }

    /// True for errors caused by concurrent modification or duplicate state.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::BranchCollision(_)
                | Self::HeadMoved { .. }
                | Self::BranchDeleted(_)
                | Self::ReviewNotCurrent(_)
                | Self::ComponentCollision(_, _)
        )
    }

    /// True when the referenced resource is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BranchNotFound(_)
                | Self::MergeNotFound(_)
                | Self::ReviewNotFound(_)
                | Self::ComponentNotFound(_, _)
                | Self::JobNotFound(_)
        )
    }
}

pub type TvsResult<T> = std::result::Result<T, TvsError>;
