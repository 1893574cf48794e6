use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Supabase API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Aggregation error: {0}")]
    Aggregate(String),

    #[error("Dataframe error: {0}")]
    Frame(#[from] polars::prelude::PolarsError),

    #[error("Render error: {0}")]
    Render(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PNG encoding error: {0}")]
    Png(#[from] png::EncodingError),
}

impl AppError {
    /// Short machine-readable label, recorded on spans and log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Http(_) => "http",
            AppError::Api { .. } => "api",
            AppError::Decode(_) => "decode",
            AppError::Aggregate(_) => "aggregate",
            AppError::Frame(_) => "frame",
            AppError::Render(_) => "render",
            AppError::Io(_) => "io",
            AppError::Png(_) => "png",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
