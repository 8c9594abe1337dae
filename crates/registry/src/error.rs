use rp_database::DatabaseError;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// A single rejected field of a client request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.field, self.message, self.code)
    }
}

/// Why a supplied public key could not be bound
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyBindingError {
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Malformed key: {0}")]
    MalformedKey(String),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid client request: {}", render_violations(.0))]
    Validation(Vec<FieldViolation>),

    #[error("Key binding failed: {0}")]
    KeyBinding(#[from] KeyBindingError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Whether the caller should fix the request or try again later
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    ClientFault,
    ServerFault,
}

impl ClientError {
    pub fn violation(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation(vec![FieldViolation::new(field, code, message)])
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ClientError::Validation(_)
            | ClientError::KeyBinding(_)
            | ClientError::NotFound(_)
            | ClientError::Conflict(_) => ErrorClass::ClientFault,
            ClientError::Persistence(_) | ClientError::Configuration(_) => ErrorClass::ServerFault,
        }
    }

    /// Only storage faults are worth retrying unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Persistence(_))
    }

    /// Field-level violations, empty for non-validation errors
    pub fn violations(&self) -> &[FieldViolation] {
        match self {
            ClientError::Validation(violations) => violations,
            _ => &[],
        }
    }
}

fn render_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<DatabaseError> for ClientError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ClientError::NotFound(msg),
            DatabaseError::DuplicateEntry(msg) | DatabaseError::VersionConflict(msg) => {
                ClientError::Conflict(msg)
            }
            other => ClientError::Persistence(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ClientError {
    fn from(err: validator::ValidationErrors) -> Self {
        ClientError::Validation(violations_from(&err))
    }
}

/// Flatten derive-based validation errors into field violations, ordered by field
pub fn violations_from(errors: &validator::ValidationErrors) -> Vec<FieldViolation> {
    let mut violations: Vec<FieldViolation> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = field.to_string();
            errs.iter().map(move |err| {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("failed `{}` check", err.code));
                FieldViolation::new(field.clone(), err.code.to_string(), message)
            })
        })
        .collect();

    violations.sort_by(|a, b| a.field.cmp(&b.field).then_with(|| a.code.cmp(&b.code)));
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_errors_map_onto_taxonomy() {
        let not_found: ClientError = DatabaseError::not_found("Client", "rp_1").into();
        assert!(matches!(not_found, ClientError::NotFound(_)));

        let duplicate: ClientError = DatabaseError::duplicate("Client", "client_id rp_1").into();
        assert!(matches!(duplicate, ClientError::Conflict(_)));

        let stale: ClientError = DatabaseError::stale_version("Client", "rp_1", 3).into();
        assert!(matches!(stale, ClientError::Conflict(_)));

        let down: ClientError = DatabaseError::Other("connection reset".to_string()).into();
        assert!(matches!(down, ClientError::Persistence(_)));
        assert!(down.is_retryable());
        assert_eq!(down.class(), ErrorClass::ServerFault);
    }

    #[test]
    fn test_client_faults_are_not_retryable() {
        let errors = [
            ClientError::violation("redirect_uris", "required", "missing"),
            ClientError::KeyBinding(KeyBindingError::MalformedKey("bad".to_string())),
            ClientError::NotFound("rp_1".to_string()),
            ClientError::Conflict("rp_1".to_string()),
        ];

        for err in errors {
            assert_eq!(err.class(), ErrorClass::ClientFault);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_validation_message_lists_every_field() {
        let err = ClientError::Validation(vec![
            FieldViolation::new("redirect_uris", "required", "at least one redirect URI is required"),
            FieldViolation::new("grant_types", "not_allowed", "implicit is not enabled"),
        ]);

        let message = err.to_string();
        assert!(message.contains("redirect_uris"));
        assert!(message.contains("grant_types"));
        assert_eq!(err.violations().len(), 2);
    }
}
