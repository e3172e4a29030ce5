use thiserror::Error;

#[derive(Debug, Error)]
pub enum DevflowError {
    // Text generation errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Engine errors
    #[error("Step '{step}' failed: {source}")]
    StepExecution {
        step: String,
        #[source]
        source: Box<DevflowError>,
    },

    #[error("Step '{step}' produced branch '{branch}' which has no target")]
    UnknownBranch { step: String, branch: String },

    #[error("Step not found: {0}")]
    UnknownStep(String),

    #[error("Step '{step}' exceeded {limit} visits")]
    RevisionLimitExceeded { step: String, limit: usize },

    #[error("Workflow run already finished")]
    RunFinished,

    #[error("Workflow cancelled")]
    Cancelled,

    // Approval errors
    #[error("Approval timeout for artifact: {artifact}")]
    ApprovalTimeout { artifact: String },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("No review is awaiting this artifact: {0}")]
    UnknownArtifact(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DevflowError {
    /// Wrap a step failure, leaving control-flow outcomes untouched so callers
    /// can still match on them.
    pub fn in_step(self, step: &str) -> Self {
        match self {
            Self::Cancelled
            | Self::ApprovalTimeout { .. }
            | Self::RevisionLimitExceeded { .. }
            | Self::StepExecution { .. } => self,
            other => Self::StepExecution {
                step: step.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Whether calling `advance()` again on the same run can make progress.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            Self::StepExecution { .. } | Self::ApprovalTimeout { .. } | Self::LlmRequest(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DevflowError>;
