use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    /// The file could not be opened, or lofty did not recognise its format.
    #[error("Cannot read tags from {path}: {message}")]
    ExtractionFailed { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, MetadataError>;
