use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("template parse error: {0}")]
    TemplateParse(String),

    #[error("template render error: {0}")]
    TemplateRender(#[from] tera::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
