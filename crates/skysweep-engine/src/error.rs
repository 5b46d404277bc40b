use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] skysweep_config::ConfigError),

    #[error(transparent)]
    Core(#[from] skysweep_core::CoreError),

    #[error("spot advisor error: {0}")]
    Advisor(#[from] skysweep_advisor::AdvisorError),

    #[error("no valid credentials after validation")]
    NoValidCredentials,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{action} requires --yes in non-interactive mode")]
    NonInteractiveRefusal { action: String },

    #[error("account {account} looks like production ({marker}); refusing without explicit override")]
    ProductionGuard { account: String, marker: String },

    #[error("expected {expected} resources, exceeding the session limit of {max}")]
    TooManyResources { expected: usize, max: usize },

    #[error("credential validation failed for {account}: {reason}")]
    Auth { account: String, reason: String },

    #[error("AWS error: {0}")]
    Aws(String),

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("required tool not on PATH: {tool} (install it and retry)")]
    ToolMissing { tool: String },

    #[error("subprocess failed: {0}")]
    Subprocess(String),

    #[error("deadline exceeded: {what}")]
    Timeout { what: String },

    #[error("session cancelled")]
    Cancelled,

    #[error("kubernetes error: {0}")]
    Kube(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Short machine-readable kind for ledger entries and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Config(_) => "config",
            EngineError::Core(_) => "config",
            EngineError::Advisor(_) => "advisor",
            EngineError::NoValidCredentials => "no-valid-credentials",
            EngineError::InvalidArgument(_) => "invalid-argument",
            EngineError::NonInteractiveRefusal { .. } => "non-interactive-refusal",
            EngineError::ProductionGuard { .. } => "production-guard",
            EngineError::TooManyResources { .. } => "too-many-resources",
            EngineError::Auth { .. } => "auth",
            EngineError::Aws(_) => "aws",
            EngineError::Ledger(_) => "ledger",
            EngineError::ToolMissing { .. } => "tool-missing",
            EngineError::Subprocess(_) => "subprocess",
            EngineError::Timeout { .. } => "timeout",
            EngineError::Cancelled => "cancelled",
            EngineError::Kube(_) => "kube",
            EngineError::Serialization(_) => "serialization",
            EngineError::Io(_) => "io",
        }
    }
}

/// Flatten an error and its source chain into one line. SDK errors bury the
/// service error code two levels down; logs need the whole chain.
pub fn format_err_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
