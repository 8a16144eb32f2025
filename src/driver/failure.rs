//! Server failure classification.
//!
//! Status codes look like `Neo.ClientError.Statement.SyntaxError`: an optional
//! `Neo` prefix, then category, subcategory and title.

use std::fmt;

use crate::bolt::message::FailureMessage;

// ============================================================================
// FailureCategory
// ============================================================================

/// The second segment of a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// The request was wrong; retrying unchanged will fail again
    ClientError,
    ClientNotification,
    /// Temporary condition; the same request may succeed later
    TransientError,
    /// The server failed to process a valid request
    DatabaseError,
    /// Code did not follow the expected shape
    Unknown,
}

impl FailureCategory {
    fn parse(segment: &str) -> Self {
        match segment {
            "ClientError" => FailureCategory::ClientError,
            "ClientNotification" => FailureCategory::ClientNotification,
            "TransientError" => FailureCategory::TransientError,
            "DatabaseError" => FailureCategory::DatabaseError,
            _ => FailureCategory::Unknown,
        }
    }
}

// ============================================================================
// ServerFailure
// ============================================================================

/// A FAILURE reply, classified.
///
/// Classification never fails: a code that does not parse keeps its raw
/// string with [`FailureCategory::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFailure {
    /// The status code exactly as the server sent it
    pub code: String,
    pub message: String,
    pub category: FailureCategory,
    pub subcategory: Option<String>,
    pub title: Option<String>,
}

/// Transient codes that a retry cannot fix: the transaction was killed on purpose.
const NON_RETRYABLE_TRANSIENT: [&str; 2] = [
    "Neo.TransientError.Transaction.Terminated",
    "Neo.TransientError.Transaction.LockClientStopped",
];

/// Client errors that a retry against another member may fix.
const RETRYABLE_CLIENT: [&str; 2] = [
    "Neo.ClientError.Cluster.NotALeader",
    "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase",
];

impl ServerFailure {
    pub fn classify(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let segments: Vec<&str> = code.split('.').collect();
        let parts = match segments.as_slice() {
            ["Neo", category, sub, title] | [category, sub, title] => {
                Some((FailureCategory::parse(category), sub.to_string(), title.to_string()))
            }
            _ => None,
        };
        let (category, subcategory, title) = match parts {
            Some((FailureCategory::Unknown, _, _)) | None => (FailureCategory::Unknown, None, None),
            Some((category, sub, title)) => (category, Some(sub), Some(title)),
        };
        Self {
            code,
            message: message.into(),
            category,
            subcategory,
            title,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.category == FailureCategory::ClientError
    }

    pub fn is_transient(&self) -> bool {
        self.category == FailureCategory::TransientError
    }

    pub fn is_database_error(&self) -> bool {
        self.category == FailureCategory::DatabaseError
    }

    /// `Security` client errors: bad credentials, expired tokens, rate limits.
    pub fn is_authentication_error(&self) -> bool {
        self.is_client_error() && self.subcategory.as_deref() == Some("Security")
    }

    /// Whether an external retry policy should try again.
    pub fn is_retryable(&self) -> bool {
        if self.is_transient() {
            return !NON_RETRYABLE_TRANSIENT.contains(&self.code.as_str());
        }
        RETRYABLE_CLIENT.contains(&self.code.as_str())
    }
}

impl From<FailureMessage> for ServerFailure {
    fn from(msg: FailureMessage) -> Self {
        ServerFailure::classify(msg.code, msg.message)
    }
}

impl fmt::Display for ServerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServerFailure {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_status_code() {
        let f = ServerFailure::classify("Neo.ClientError.Statement.SyntaxError", "Invalid input 'RETRUN'");
        assert_eq!(f.category, FailureCategory::ClientError);
        assert_eq!(f.subcategory.as_deref(), Some("Statement"));
        assert_eq!(f.title.as_deref(), Some("SyntaxError"));
        assert_eq!(f.message, "Invalid input 'RETRUN'");
        assert!(!f.is_retryable());
    }

    #[test]
    fn test_code_without_prefix() {
        let f = ServerFailure::classify("TransientError.Transaction.DeadlockDetected", "deadlock");
        assert!(f.is_transient());
        assert_eq!(f.title.as_deref(), Some("DeadlockDetected"));
        assert!(f.is_retryable());
    }

    #[test]
    fn test_unrecognized_codes_keep_raw_string() {
        for code in ["", "Oops", "Neo.Weird.A.B", "a.b.c.d.e", "Neo.ClientError.Statement"] {
            let f = ServerFailure::classify(code, "m");
            assert_eq!(f.category, FailureCategory::Unknown, "{}", code);
            assert_eq!(f.code, code);
            assert!(f.subcategory.is_none());
            assert!(!f.is_retryable());
        }
    }

    #[test]
    fn test_retryability() {
        let retryable = [
            "Neo.TransientError.General.DatabaseUnavailable",
            "Neo.TransientError.Transaction.LockAcquisitionTimeout",
            "Neo.ClientError.Cluster.NotALeader",
        ];
        for code in retryable {
            assert!(ServerFailure::classify(code, "").is_retryable(), "{}", code);
        }
        let not_retryable = [
            "Neo.TransientError.Transaction.Terminated",
            "Neo.TransientError.Transaction.LockClientStopped",
            "Neo.ClientError.Security.Unauthorized",
            "Neo.DatabaseError.General.UnknownError",
        ];
        for code in not_retryable {
            assert!(!ServerFailure::classify(code, "").is_retryable(), "{}", code);
        }
    }

    #[test]
    fn test_authentication_detection() {
        assert!(ServerFailure::classify("Neo.ClientError.Security.Unauthorized", "").is_authentication_error());
        assert!(!ServerFailure::classify("Neo.ClientError.Statement.SyntaxError", "").is_authentication_error());
        assert!(!ServerFailure::classify("Neo.DatabaseError.Security.Unknown", "").is_authentication_error());
    }

    #[test]
    fn test_from_failure_message() {
        let f: ServerFailure = FailureMessage::new("Neo.DatabaseError.General.UnknownError", "boom").into();
        assert!(f.is_database_error());
        assert_eq!(f.to_string(), "Neo.DatabaseError.General.UnknownError: boom");
    }
}
