// Error handling framework

use thiserror::Error;

/// Schedule-related errors
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Invalid time of day '{0}', expected HH:MM")]
    InvalidTimeOfDay(String),
}

/// Validation errors raised when raw settings are turned into typed configuration
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },
}

/// Errors from the host data store (repositories and persistence context)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Filesystem error: {0}")]
    FileSystemError(String),
}

/// Merge-field template rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("The template command '{0}' is not enabled for this template")]
    CommandNotEnabled(String),

    #[error("Unterminated tag starting at byte {0}")]
    UnterminatedTag(usize),

    #[error("Regex compilation error: {0}")]
    RegexError(String),

    #[error("Command '{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },
}

/// Messaging transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Fatal job errors. Anything returned here aborts the whole run.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Root group not found: {0}")]
    RootGroupNotFound(String),

    #[error("Unable to fetch sender: {0}")]
    SenderNotFound(String),

    #[error("{0}")]
    TransportUnavailable(String),

    #[error("Invalid job configuration: {0}")]
    InvalidConfiguration(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Template error: {0}")]
    Render(#[from] RenderError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvalidJson(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::FileSystemError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_error_display() {
        let err = ScheduleError::InvalidCronExpression {
            expression: "* * * *".to_string(),
            reason: "invalid format".to_string(),
        };
        assert!(err.to_string().contains("Invalid cron expression"));
    }

    #[test]
    fn test_transport_unavailable_message_is_passed_through() {
        let err = JobError::TransportUnavailable("SMS Medium is Inactive".to_string());
        assert_eq!(err.to_string(), "SMS Medium is Inactive");
    }

    #[test]
    fn test_store_error_converts_into_job_error() {
        let err: JobError = StoreError::NotFound("pledge 42".to_string()).into();
        assert!(matches!(err, JobError::Store(_)));
        assert!(err.to_string().contains("pledge 42"));
    }

    #[test]
    fn test_validation_error_converts_into_job_error() {
        let err: JobError = ValidationError::InvalidFieldValue {
            field: "group_reminder.look_ahead".to_string(),
            reason: "out of range".to_string(),
        }
        .into();
        assert!(matches!(err, JobError::InvalidConfiguration(_)));
        assert!(err.to_string().starts_with("Invalid job configuration"));
    }

    #[test]
    fn test_command_not_enabled_names_command() {
        let err = RenderError::CommandNotEnabled("sql".to_string());
        assert!(err.to_string().contains("'sql'"));
    }
}
