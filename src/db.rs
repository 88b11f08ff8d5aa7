use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{config::DbConfig, error::DirectoryError};

const UNIQUE_VIOLATION: &str = "23505";
const QUERY_CANCELED: &str = "57014";

pub async fn connect(database_url: &str, cfg: &DbConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .acquire_timeout(cfg.timeout())
        .connect(database_url)
        .await
        .context("connect to database")
}

/// Maps a driver error onto the directory taxonomy.
pub fn classify(err: sqlx::Error) -> DirectoryError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            DirectoryError::Unavailable(err.to_string())
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => DirectoryError::Unavailable(err.to_string()),
        sqlx::Error::Database(ref db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            if is_unavailable_code(&code) {
                DirectoryError::Unavailable(err.to_string())
            } else {
                DirectoryError::Internal(err.to_string())
            }
        }
        other => DirectoryError::Internal(other.to_string()),
    }
}

/// Like [`classify`], but a unique violation becomes `DuplicateAccount`.
/// The only unique constraint on `users` besides the key is the live-account index.
pub fn classify_write(err: sqlx::Error, account: &str) -> DirectoryError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return DirectoryError::DuplicateAccount(account.to_string());
        }
    }
    classify(err)
}

/// Connection exceptions (class 08), operator intervention (57P0x) and
/// statement timeouts are worth a retry.
pub(crate) fn is_unavailable_code(code: &str) -> bool {
    code.starts_with("08") || code.starts_with("57P0") || code == QUERY_CANCELED
}
