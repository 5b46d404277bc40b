use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("failed to download spot advisor dataset: {0}")]
    Download(String),

    #[error("EC2 API error: {0}")]
    Api(String),

    #[error("cache I/O error: {0}")]
    Cache(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no instance types matched the requested filters in {region}")]
    NoCandidates { region: String },
}
