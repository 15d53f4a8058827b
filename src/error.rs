use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillError {
    /// The amount field could not be read as a finite number.
    #[error("Malformed amount: {0:?} is not a number")]
    MalformedAmount(String),

    /// The model answered with something that carries none of the bill fields.
    #[error("Unstructured response: the model did not return the expected bill fields")]
    UnstructuredResponse,

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Unsupported file: {0}")]
    UnsupportedMedia(String),

    #[error("Vision model error: {0}")]
    Model(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
}

pub type Result<T> = std::result::Result<T, BillError>;
