use thiserror::Error;

/// Errors surfaced by the optimizer.
///
/// Failures from caller-supplied loaders and executors are carried unchanged
/// as the error source.
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("failed to load module `{module}`")]
    LoadFailure {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("operation `{key}` failed")]
    ExecutionFailure {
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unknown operation `{key}`{}", suggestion_hint(.suggestion))]
    UnknownOperation {
        key: String,
        suggestion: Option<String>,
    },
}

impl OptimizerError {
    /// The caller's own error, for load and execution failures.
    pub fn caller_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::LoadFailure { source, .. } | Self::ExecutionFailure { source, .. } => {
                Some(source)
            }
            Self::InvalidConfig(_) | Self::UnknownOperation { .. } => None,
        }
    }
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|name| format!(" (did you mean `{name}`?)"))
        .unwrap_or_default()
}

pub type Result<T, E = OptimizerError> = std::result::Result<T, E>;
