//! Common error types for musi

use thiserror::Error;

/// Common result type for musi operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the musi crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_variant_has_a_source() {
        let io: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(io.to_string(), "IO error: gone");

        let db: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(db, Error::Database(_)));

        let config = Error::Config("missing token".to_string());
        assert_eq!(config.to_string(), "Configuration error: missing token");
    }
}
