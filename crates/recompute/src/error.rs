use buildledger_core::{DomainError, ProjectId};

/// Result sink failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecomputeError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("unknown project: {0}")]
    UnknownProject(ProjectId),

    #[error("project {project_id}: expected sequence {expected}, got {actual}")]
    NonMonotonicSequence {
        project_id: ProjectId,
        expected: u64,
        actual: u64,
    },

    #[error("thread pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl RecomputeError {
    pub fn kind(&self) -> &'static str {
        match self {
            RecomputeError::Domain(e) => e.kind(),
            RecomputeError::UnknownProject(_) => "unknown_project",
            RecomputeError::NonMonotonicSequence { .. } => "non_monotonic_sequence",
            RecomputeError::ThreadPool(_) => "thread_pool",
            RecomputeError::Sink(_) => "sink",
        }
    }
}
