use thiserror::Error;

/// Failures of sandbox lifecycle and remote operations.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Maximum number of sandboxes ({max}) reached")]
    CapacityExceeded { max: usize },

    #[error("Sandbox {id} not found")]
    NotFound { id: String },

    #[error("Failed to create sandbox: {0:#}")]
    CreateFailed(#[source] anyhow::Error),

    /// The entry was already removed from the registry when this is returned.
    #[error("Error killing sandbox {id}: {source:#}")]
    KillFailed {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to {operation} in sandbox {id}: {source:#}")]
    RemoteOperationFailed {
        operation: &'static str,
        id: String,
        #[source]
        source: anyhow::Error,
    },
}

impl SandboxError {
    pub fn remote(operation: &'static str, id: &str, source: anyhow::Error) -> Self {
        Self::RemoteOperationFailed {
            operation,
            id: id.to_string(),
            source,
        }
    }

    /// Stable machine-readable code surfaced to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::NotFound { .. } => "sandbox_not_found",
            Self::CreateFailed(_) => "create_failed",
            Self::KillFailed { .. } => "kill_failed",
            Self::RemoteOperationFailed { .. } => "remote_operation_failed",
        }
    }
}
