use thiserror::Error;

#[derive(Error, Debug)]
pub enum RevenueError {
    #[error("Data unavailable from {source_table}: {message}")]
    DataUnavailable {
        source_table: &'static str,
        message: String,
    },

    #[error("Invalid reporting period: {0}")]
    InvalidPeriod(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Fetch timed out after {0} seconds")]
    Timeout(u64),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RevenueError {
    pub fn unavailable(source_table: &'static str, message: impl Into<String>) -> Self {
        Self::DataUnavailable {
            source_table,
            message: message.into(),
        }
    }

    /// Whether the failure came from the data store rather than from the engine
    pub fn is_data_unavailable(&self) -> bool {
        matches!(self, Self::DataUnavailable { .. })
    }
}

impl From<config::ConfigError> for RevenueError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<handlebars::RenderError> for RevenueError {
    fn from(err: handlebars::RenderError) -> Self {
        Self::Export(err.to_string())
    }
}

impl From<handlebars::TemplateError> for RevenueError {
    fn from(err: handlebars::TemplateError) -> Self {
        Self::Export(err.to_string())
    }
}

impl From<csv::Error> for RevenueError {
    fn from(err: csv::Error) -> Self {
        Self::Export(err.to_string())
    }
}

pub type RevenueResult<T> = Result<T, RevenueError>;
