use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Maintenance error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Node not found: {path}")]
    NodeNotFound { path: String },

    #[error("Parent node not found: {path}")]
    ParentNotFound { path: String },

    #[error("Memory record not found: {id}")]
    MemoryNotFound { id: i64 },

    #[error("Root node cannot be deleted")]
    RootImmutable,

    #[error("Invalid node path: {path}")]
    InvalidPath { path: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Inference-backend errors
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Maintenance pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Stage {stage} output unparsable: {message}")]
    StageParse { stage: String, message: String },

    #[error("Stage {stage} backend call failed: {message}")]
    StageBackend { stage: String, message: String },

    #[error("Review rejected: {reason}")]
    Rejected { reason: String },

    #[error("Verification failed after {attempts} organize attempts: {issues:?}")]
    ValidationExhausted { attempts: u32, issues: Vec<String> },

    #[error("Another maintenance task is already in flight")]
    AlreadyRunning,
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type alias for maintenance pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::NodeNotFound {
            path: "1.2".to_string(),
        };
        assert_eq!(err.to_string(), "Node not found: 1.2");

        let err = StorageError::ParentNotFound {
            path: "7".to_string(),
        };
        assert_eq!(err.to_string(), "Parent node not found: 7");

        let err = StorageError::MemoryNotFound { id: 42 };
        assert_eq!(err.to_string(), "Memory record not found: 42");

        assert_eq!(
            StorageError::RootImmutable.to_string(),
            "Root node cannot be deleted"
        );
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(
            err.to_string(),
            "Backend unavailable: server down (retries: 3)"
        );

        let err = BackendError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = BackendError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::Rejected {
            reason: "analysis too vague".to_string(),
        };
        assert_eq!(err.to_string(), "Review rejected: analysis too vague");

        let err = PipelineError::StageParse {
            stage: "discover".to_string(),
            message: "not JSON".to_string(),
        };
        assert_eq!(err.to_string(), "Stage discover output unparsable: not JSON");
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let storage_err = StorageError::NodeNotFound {
            path: "3.1".to_string(),
        };
        let app_err: AppError = storage_err.into();
        assert!(matches!(app_err, AppError::Storage(_)));
    }

    #[test]
    fn test_backend_error_conversion_to_app_error() {
        let backend_err = BackendError::Timeout { timeout_ms: 1000 };
        let app_err: AppError = backend_err.into();
        assert!(matches!(app_err, AppError::Backend(_)));
    }

    #[test]
    fn test_pipeline_error_conversion_to_app_error() {
        let err = PipelineError::AlreadyRunning;
        let app_err: AppError = err.into();
        assert!(matches!(app_err, AppError::Pipeline(_)));
    }
}
