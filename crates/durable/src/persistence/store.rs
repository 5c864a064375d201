//! TokenStore trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque resume handle issued by a suspending step
///
/// Only the orchestrator that issued a token can make sense of it. The value
/// is redacted from `Debug` output and has no `Display` impl so it cannot end
/// up in logs or API responses by accident.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ResumeToken(String);

impl ResumeToken {
    /// Wrap an existing token value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a fresh random token
    pub fn generate() -> Self {
        Self(format!("tok-{}", Uuid::new_v4().simple()))
    }

    /// Raw token value
    ///
    /// Meant for store implementations that need to persist the value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ResumeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ResumeToken(***)")
    }
}

/// One in-flight suspension
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRecord {
    /// Externally assigned execution id (primary key)
    pub execution_id: String,

    /// Resume handle for the suspended step
    pub token: ResumeToken,

    /// When the record was written
    pub created_at: DateTime<Utc>,

    /// Whether a resume has already been accepted for this record
    pub consumed: bool,
}

impl TokenRecord {
    /// Create a fresh, unconsumed record
    pub fn new(execution_id: impl Into<String>, token: ResumeToken) -> Self {
        Self {
            execution_id: execution_id.into(),
            token,
            created_at: Utc::now(),
            consumed: false,
        }
    }
}

/// What `put` does when a record already exists for the execution id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PutStrictness {
    /// Fail with [`PersistFailure::AlreadyExists`] and keep the stored record
    #[default]
    Reject,

    /// Log a warning and replace the record with a fresh, unconsumed one
    Overwrite,
}

impl std::str::FromStr for PutStrictness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(format!("unknown put strictness: {other}")),
        }
    }
}

/// Token record could not be written
#[derive(Debug, thiserror::Error)]
pub enum PersistFailure {
    /// A record already exists and the store rejects overwrites
    #[error("token record already exists for execution {0}")]
    AlreadyExists(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),
}

/// Token record could not be found
#[derive(Debug, thiserror::Error)]
pub enum LookupFailure {
    /// No record for this execution id (yet)
    #[error("no token record for execution {0}")]
    NotFound(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),
}

/// The record was already consumed by an earlier resume
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("execution {execution_id} was already resumed")]
pub struct DuplicateResume {
    pub execution_id: String,
}

/// Error from [`TokenStore::mark_consumed`]
#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    /// Compare-and-set lost: the record is already consumed
    #[error(transparent)]
    Duplicate(#[from] DuplicateResume),

    /// No record for this execution id
    #[error("no token record for execution {0}")]
    NotFound(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),
}

/// Durable mapping from execution id to resume token
///
/// Implementations must be safe under concurrent, independent callers.
/// `mark_consumed` must be a single atomic compare-and-set; it is the only
/// thing standing between a duplicate event delivery and a second resume.
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    /// Create the record for an execution id
    ///
    /// A second `put` for the same id is a caller error; the store's
    /// [`PutStrictness`] decides whether it is rejected or overwrites.
    async fn put(&self, execution_id: &str, token: ResumeToken) -> Result<(), PersistFailure>;

    /// Load the record for an execution id
    async fn get(&self, execution_id: &str) -> Result<TokenRecord, LookupFailure>;

    /// Flip `consumed` from false to true, failing if it already was true
    async fn mark_consumed(&self, execution_id: &str) -> Result<(), ConsumeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_debug_is_redacted() {
        let token = ResumeToken::new("tok-secret");
        let rendered = format!("{:?}", token);

        assert!(!rendered.contains("tok-secret"));

        let record = TokenRecord::new("exec-1", token);
        assert!(!format!("{:?}", record).contains("tok-secret"));
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        assert_ne!(ResumeToken::generate(), ResumeToken::generate());
    }

    #[test]
    fn test_put_strictness_from_str() {
        assert_eq!("reject".parse::<PutStrictness>(), Ok(PutStrictness::Reject));
        assert_eq!(
            "Overwrite".parse::<PutStrictness>(),
            Ok(PutStrictness::Overwrite)
        );
        assert!("sometimes".parse::<PutStrictness>().is_err());
    }

    #[test]
    fn test_duplicate_resume_converts_into_consume_error() {
        let err: ConsumeError = DuplicateResume {
            execution_id: "exec-1".to_string(),
        }
        .into();

        assert!(matches!(err, ConsumeError::Duplicate(_)));
        assert_eq!(err.to_string(), "execution exec-1 was already resumed");
    }
}
