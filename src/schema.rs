//! Startup schema evolution for the `users` table and its `user_type` enum.
//!
//! Safe to run on every start: an existing enum is completed rather than
//! recreated, and every table/index statement is `IF NOT EXISTS`.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{db::is_unavailable_code, users::repo_types::UserType};

pub const USER_TYPE_ENUM: &str = "user_type";

/// Table shape, applied in order. Columns are re-asserted individually so an
/// older table gains what it is missing without touching existing data.
pub const USERS_DDL: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        deleted_at TIMESTAMPTZ,
        name VARCHAR(100) NOT NULL,
        account VARCHAR(100) NOT NULL,
        password VARCHAR(255) NOT NULL,
        status BOOLEAN NOT NULL DEFAULT TRUE,
        "type" user_type NOT NULL DEFAULT 'panel'
    )"#,
    "ALTER TABLE users ADD COLUMN IF NOT EXISTS created_at TIMESTAMPTZ NOT NULL DEFAULT now()",
    "ALTER TABLE users ADD COLUMN IF NOT EXISTS updated_at TIMESTAMPTZ NOT NULL DEFAULT now()",
    "ALTER TABLE users ADD COLUMN IF NOT EXISTS deleted_at TIMESTAMPTZ",
    "ALTER TABLE users ADD COLUMN IF NOT EXISTS status BOOLEAN NOT NULL DEFAULT TRUE",
    r#"ALTER TABLE users ADD COLUMN IF NOT EXISTS "type" user_type NOT NULL DEFAULT 'panel'"#,
    "CREATE INDEX IF NOT EXISTS idx_users_name ON users (name)",
    "CREATE INDEX IF NOT EXISTS idx_users_status ON users (status)",
    r#"CREATE INDEX IF NOT EXISTS idx_users_type ON users ("type")"#,
    "CREATE INDEX IF NOT EXISTS idx_users_deleted_at ON users (deleted_at)",
    "CREATE UNIQUE INDEX IF NOT EXISTS users_account_live_key ON users (account) WHERE deleted_at IS NULL",
];

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("type '{0}' already exists")]
    AlreadyExists(String),

    #[error("schema store unreachable: {0}")]
    Unreachable(String),

    #[error("schema statement failed: {0}")]
    Failed(String),
}

/// Backing store able to hold enumerated domains and apply idempotent DDL.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Fails with [`SchemaError::AlreadyExists`] if the type is present.
    async fn create_enum(&self, name: &str, labels: &[&str]) -> Result<(), SchemaError>;
    async fn enum_labels(&self, name: &str) -> Result<Vec<String>, SchemaError>;
    async fn add_enum_label(&self, name: &str, label: &str) -> Result<(), SchemaError>;
    async fn apply(&self, statement: &str) -> Result<(), SchemaError>;
}

/// Ensures `user_type` exists with every allowed label, then brings the
/// `users` table up to the current shape.
pub async fn ensure_user_type_category(store: &dyn SchemaStore) -> Result<(), SchemaError> {
    let labels: Vec<&str> = UserType::ALL.iter().map(|t| t.as_str()).collect();

    info!(enum_name = USER_TYPE_ENUM, "checking user type enum");
    match store.create_enum(USER_TYPE_ENUM, &labels).await {
        Ok(()) => info!(enum_name = USER_TYPE_ENUM, "user type enum created"),
        Err(SchemaError::AlreadyExists(_)) => {
            let existing = store.enum_labels(USER_TYPE_ENUM).await?;
            for label in &labels {
                if !existing.iter().any(|e| e == label) {
                    store.add_enum_label(USER_TYPE_ENUM, label).await?;
                    info!(enum_name = USER_TYPE_ENUM, label, "added missing enum label");
                }
            }
            for extra in existing.iter().filter(|e| !labels.contains(&e.as_str())) {
                warn!(
                    enum_name = USER_TYPE_ENUM,
                    label = %extra,
                    "unknown enum label left in place"
                );
            }
        }
        Err(e) => return Err(e),
    }

    info!("migrating users table");
    for statement in USERS_DDL {
        store.apply(statement).await?;
    }
    info!("users table migration complete");
    Ok(())
}

#[derive(Clone)]
pub struct PgSchemaStore {
    db: PgPool,
}

impl PgSchemaStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const DUPLICATE_OBJECT: &str = "42710";
const UNIQUE_VIOLATION: &str = "23505";

fn schema_error(err: sqlx::Error, name: &str) -> SchemaError {
    match err {
        sqlx::Error::Database(ref db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            // Two processes racing on CREATE TYPE trip the pg_type unique index.
            if code == DUPLICATE_OBJECT || code == UNIQUE_VIOLATION {
                SchemaError::AlreadyExists(name.to_string())
            } else if is_unavailable_code(&code) {
                SchemaError::Unreachable(err.to_string())
            } else {
                SchemaError::Failed(err.to_string())
            }
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => SchemaError::Unreachable(err.to_string()),
        other => SchemaError::Failed(other.to_string()),
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[async_trait]
impl SchemaStore for PgSchemaStore {
    async fn create_enum(&self, name: &str, labels: &[&str]) -> Result<(), SchemaError> {
        let labels = labels
            .iter()
            .map(|l| quote_literal(l))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("CREATE TYPE {} AS ENUM ({})", quote_ident(name), labels);
        sqlx::query(&sql)
            .execute(&self.db)
            .await
            .map_err(|e| schema_error(e, name))?;
        Ok(())
    }

    async fn enum_labels(&self, name: &str) -> Result<Vec<String>, SchemaError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT e.enumlabel::text
              FROM pg_enum e
              JOIN pg_type t ON t.oid = e.enumtypid
             WHERE t.typname = $1
             ORDER BY e.enumsortorder
            "#,
        )
        .bind(name)
        .fetch_all(&self.db)
        .await
        .map_err(|e| schema_error(e, name))
    }

    async fn add_enum_label(&self, name: &str, label: &str) -> Result<(), SchemaError> {
        let sql = format!(
            "ALTER TYPE {} ADD VALUE IF NOT EXISTS {}",
            quote_ident(name),
            quote_literal(label)
        );
        sqlx::query(&sql)
            .execute(&self.db)
            .await
            .map_err(|e| schema_error(e, name))?;
        Ok(())
    }

    async fn apply(&self, statement: &str) -> Result<(), SchemaError> {
        sqlx::query(statement)
            .execute(&self.db)
            .await
            .map_err(|e| schema_error(e, "users"))?;
        Ok(())
    }
}

/// Snapshot of what an [`InMemorySchemaStore`] holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    pub enums: BTreeMap<String, Vec<String>>,
    pub statements: BTreeSet<String>,
}

/// Schema store for tests; DDL statements are recorded as a set, matching
/// their `IF NOT EXISTS` semantics.
#[derive(Debug, Default)]
pub struct InMemorySchemaStore {
    state: RwLock<SchemaSnapshot>,
}

impl InMemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> SchemaSnapshot {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl SchemaStore for InMemorySchemaStore {
    async fn create_enum(&self, name: &str, labels: &[&str]) -> Result<(), SchemaError> {
        let mut state = self.state.write().await;
        if state.enums.contains_key(name) {
            return Err(SchemaError::AlreadyExists(name.to_string()));
        }
        state.enums.insert(
            name.to_string(),
            labels.iter().map(|l| l.to_string()).collect(),
        );
        Ok(())
    }

    async fn enum_labels(&self, name: &str) -> Result<Vec<String>, SchemaError> {
        Ok(self
            .state
            .read()
            .await
            .enums
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_enum_label(&self, name: &str, label: &str) -> Result<(), SchemaError> {
        let mut state = self.state.write().await;
        let labels = state
            .enums
            .get_mut(name)
            .ok_or_else(|| SchemaError::Failed(format!("type '{name}' does not exist")))?;
        if !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
        Ok(())
    }

    async fn apply(&self, statement: &str) -> Result<(), SchemaError> {
        let mut state = self.state.write().await;
        if !state.enums.contains_key(USER_TYPE_ENUM) && statement.contains(USER_TYPE_ENUM) {
            return Err(SchemaError::Failed(format!(
                "type '{USER_TYPE_ENUM}' does not exist"
            )));
        }
        state.statements.insert(statement.to_string());
        Ok(())
    }
}
