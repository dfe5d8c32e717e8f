//! API key authorization
//!
//! Clients send `Authorization: Bearer <key>`. Only the SHA-256 hash of a key
//! is stored. Each key carries grants of the form (event or every event,
//! scope, action); a request is allowed when a grant matches the event it
//! touches and the action it performs. A mutation grant also allows queries.

use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix of issued keys, so they are recognizable in logs and configs
const KEY_PREFIX: &str = "edim_";

// ========================================
// Error Types
// ========================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAuthError {
    /// No bearer token on the request
    MissingKey,

    /// Token does not match any stored key
    UnknownKey,

    /// Key exists but has no matching grant
    Forbidden {
        scope: AccessScope,
        action: AccessAction,
    },

    /// Database error loading keys or grants
    DatabaseError(String),
}

impl fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiAuthError::MissingKey => write!(f, "Missing API key"),
            ApiAuthError::UnknownKey => write!(f, "Invalid API key"),
            ApiAuthError::Forbidden { scope, action } => {
                write!(f, "API key is not allowed to {} {}", action, scope)
            }
            ApiAuthError::DatabaseError(err) => write!(f, "Database error: {}", err),
        }
    }
}

impl std::error::Error for ApiAuthError {}

impl From<sqlx::Error> for ApiAuthError {
    fn from(err: sqlx::Error) -> Self {
        ApiAuthError::DatabaseError(err.to_string())
    }
}

// ========================================
// Grant Vocabulary
// ========================================

/// What a grant covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    /// The dimension catalog
    Dimensions,
    /// Program item tags
    Program,
    /// Survey response tags
    Response,
}

impl AccessScope {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessScope::Dimensions => "dimensions",
            AccessScope::Program => "program",
            AccessScope::Response => "response",
        }
    }
}

impl fmt::Display for AccessScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dimensions" => Ok(AccessScope::Dimensions),
            "program" => Ok(AccessScope::Program),
            "response" => Ok(AccessScope::Response),
            other => Err(format!("unknown scope '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessAction {
    Query,
    Mutation,
}

impl AccessAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessAction::Query => "query",
            AccessAction::Mutation => "mutation",
        }
    }
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(AccessAction::Query),
            "mutation" => Ok(AccessAction::Mutation),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

// ========================================
// Key Management
// ========================================

/// SHA-256 of a key as 64 hex characters
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Random key: prefix plus 32 random bytes in hex
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);

    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", KEY_PREFIX, hex)
}

/// Issue a new key; the plaintext is returned once and never stored
pub async fn create_api_key(db: &SqlitePool, label: &str) -> Result<String, ApiAuthError> {
    let key = generate_api_key();

    sqlx::query("INSERT INTO api_keys (key_hash, label) VALUES (?, ?)")
        .bind(hash_api_key(&key))
        .bind(label)
        .execute(db)
        .await?;

    Ok(key)
}

/// Grant a key a scope and action on one event, or on every event when `event_id` is `None`
pub async fn grant(
    db: &SqlitePool,
    key: &str,
    event_id: Option<Uuid>,
    scope: AccessScope,
    action: AccessAction,
) -> Result<(), ApiAuthError> {
    let key_hash = hash_api_key(key);
    let event_id = event_id.map(|id| id.to_string());

    // UNIQUE does not collapse NULL event ids, so check explicitly
    sqlx::query(
        r#"
        INSERT INTO api_key_grants (key_hash, event_id, scope, action)
        SELECT ?, ?, ?, ?
        WHERE NOT EXISTS (
            SELECT 1 FROM api_key_grants
            WHERE key_hash = ? AND event_id IS ? AND scope = ? AND action = ?
        )
        "#,
    )
    .bind(&key_hash)
    .bind(&event_id)
    .bind(scope.as_str())
    .bind(action.as_str())
    .bind(&key_hash)
    .bind(&event_id)
    .bind(scope.as_str())
    .bind(action.as_str())
    .execute(db)
    .await?;

    Ok(())
}

// ========================================
// Access Check
// ========================================

/// Check that `key` may perform `action` on `scope` within `event_id`
pub async fn check_access(
    db: &SqlitePool,
    key: Option<&str>,
    event_id: Uuid,
    scope: AccessScope,
    action: AccessAction,
) -> Result<(), ApiAuthError> {
    let key = key.filter(|k| !k.is_empty()).ok_or(ApiAuthError::MissingKey)?;
    let key_hash = hash_api_key(key);

    let known: Option<String> = sqlx::query_scalar("SELECT key_hash FROM api_keys WHERE key_hash = ?")
        .bind(&key_hash)
        .fetch_optional(db)
        .await?;
    if known.is_none() {
        return Err(ApiAuthError::UnknownKey);
    }

    let matching: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM api_key_grants
        WHERE key_hash = ?
            AND (event_id IS NULL OR event_id = ?)
            AND scope = ?
            AND (action = ? OR action = 'mutation')
        "#,
    )
    .bind(&key_hash)
    .bind(event_id.to_string())
    .bind(scope.as_str())
    .bind(action.as_str())
    .fetch_one(db)
    .await?;

    if matching == 0 {
        return Err(ApiAuthError::Forbidden { scope, action });
    }

    Ok(())
}

// ========================================
// Tests
// ========================================
