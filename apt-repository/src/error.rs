//! Error types for the APT repository library.

/// Result type for APT repository operations.
pub type Result<T> = std::result::Result<T, AptRepositoryError>;

/// Errors that can occur when working with APT repository formats.
#[derive(Debug, thiserror::Error)]
pub enum AptRepositoryError {
    /// I/O error occurred while reading or encoding data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid package control data.
    #[error("Invalid package data: {0}")]
    InvalidPackageData(String),

    /// The package archive container is malformed.
    #[error("Invalid package archive: {0}")]
    InvalidArchive(String),

    /// Malformed Release file.
    #[error("Invalid release file: {0}")]
    InvalidRelease(String),

    /// Missing required field.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid field value.
    #[error("Invalid field value for '{field}': {value}")]
    InvalidField { field: String, value: String },
}

impl AptRepositoryError {
    /// Create a new invalid package data error.
    pub fn invalid_package<S: Into<String>>(msg: S) -> Self {
        Self::InvalidPackageData(msg.into())
    }

    /// Create a new invalid archive error.
    pub fn invalid_archive<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArchive(msg.into())
    }

    /// Create a new missing field error.
    pub fn missing_field<S: Into<String>>(field: S) -> Self {
        Self::MissingField(field.into())
    }

    /// Create a new invalid field error.
    pub fn invalid_field<S: Into<String>>(field: S, value: S) -> Self {
        Self::InvalidField {
            field: field.into(),
            value: value.into(),
        }
    }
}
