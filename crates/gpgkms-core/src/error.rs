use std::fmt;
use thiserror::Error;

pub type GpgKmsResult<T> = Result<T, GpgKmsError>;

#[derive(Debug, Error)]
pub enum GpgKmsError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("key export failed: {0}")]
    Export(String),

    #[error("key import failed: {0}")]
    Import(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Service unreachable or deadline exceeded. Safe to retry.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Flat discriminant of [`GpgKmsError`], used as a structured log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    KeyGeneration,
    Export,
    Import,
    Io,
    Permission,
    Unavailable,
    NotFound,
    AlreadyExists,
    DecryptionFailed,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::KeyGeneration => "KeyGenerationError",
            ErrorKind::Export => "ExportError",
            ErrorKind::Import => "ImportError",
            ErrorKind::Io => "IOError",
            ErrorKind::Permission => "PermissionError",
            ErrorKind::Unavailable => "UnavailableError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::AlreadyExists => "AlreadyExistsError",
            ErrorKind::DecryptionFailed => "DecryptionFailed",
            ErrorKind::Other => "Error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GpgKmsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GpgKmsError::Config(_) => ErrorKind::Configuration,
            GpgKmsError::KeyGeneration(_) => ErrorKind::KeyGeneration,
            GpgKmsError::Export(_) => ErrorKind::Export,
            GpgKmsError::Import(_) => ErrorKind::Import,
            GpgKmsError::Io { .. } => ErrorKind::Io,
            GpgKmsError::PermissionDenied(_) => ErrorKind::Permission,
            GpgKmsError::Unavailable(_) => ErrorKind::Unavailable,
            GpgKmsError::NotFound(_) => ErrorKind::NotFound,
            GpgKmsError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            GpgKmsError::DecryptionFailed(_) => ErrorKind::DecryptionFailed,
            GpgKmsError::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether the caller may back off and retry the failed step.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GpgKmsError::Unavailable(_))
    }

    pub fn io(path: impl fmt::Display, source: std::io::Error) -> Self {
        GpgKmsError::Io {
            path: path.to_string(),
            source,
        }
    }

    /// Map an HTTP status from a Google API into the error taxonomy.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => GpgKmsError::PermissionDenied(message),
            404 => GpgKmsError::NotFound(message),
            409 => GpgKmsError::AlreadyExists(message),
            408 | 429 | 500 | 502 | 503 | 504 => GpgKmsError::Unavailable(message),
            _ => GpgKmsError::Other(anyhow::anyhow!("HTTP {status}: {message}")),
        }
    }
}
