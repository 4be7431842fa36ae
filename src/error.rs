use thiserror::Error;

use crate::parser::ObjectClass;

/// Errors surfaced by the connector.
///
/// The first six variants are the ones callers are expected to act on; the
/// remaining ones cover configuration, parsing and storage plumbing.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Invalid name format '{value}': {reason}")]
    NameFormat { value: String, reason: String },

    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("{object_class} '{name}' already exists")]
    AlreadyExists {
        object_class: ObjectClass,
        name: String,
    },

    #[error("Failed to save record {record}: {cause}")]
    RecordSave { record: String, cause: String },

    #[error("Directory unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid attribute: {0}")]
    InvalidAttribute(String),

    #[error("Filter parse error: {0}")]
    FilterParse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConnectorError {
    pub fn name_format(value: impl Into<String>, reason: impl Into<String>) -> Self {
        ConnectorError::NameFormat {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn already_exists(object_class: ObjectClass, name: impl Into<String>) -> Self {
        ConnectorError::AlreadyExists {
            object_class,
            name: name.into(),
        }
    }

    pub fn record_save(record: impl Into<String>, cause: impl ToString) -> Self {
        ConnectorError::RecordSave {
            record: record.into(),
            cause: cause.to_string(),
        }
    }

    /// Whether retrying the whole operation after a fresh session may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ConnectorError::BackendUnavailable(_))
    }
}

impl From<sqlx::Error> for ConnectorError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                ConnectorError::BackendUnavailable(err.to_string())
            }
            other => ConnectorError::Database(other.to_string()),
        }
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = ConnectorError::already_exists(ObjectClass::Group, "Sales");
        assert_eq!(err.to_string(), "Group 'Sales' already exists");

        let err = ConnectorError::record_save("CN=John Doe/O=Acme", "disk full");
        assert_eq!(
            err.to_string(),
            "Failed to save record CN=John Doe/O=Acme: disk full"
        );
    }

    #[test]
    fn test_only_backend_unavailable_is_transient() {
        assert!(ConnectorError::BackendUnavailable("down".into()).is_transient());
        assert!(!ConnectorError::UnknownGroup("g".into()).is_transient());
        assert!(!ConnectorError::name_format("", "empty").is_transient());
    }
}
