use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    db::{classify, classify_write},
    error::DirectoryResult,
    users::{
        dto::{PageQuery, SortColumn, UserFilter},
        repo_types::{NewUser, User},
    },
};

/// Persistence for users. "Live" means `deleted_at IS NULL`; every read
/// except the raw row identity ignores soft-deleted rows.
///
/// Implementations must enforce account uniqueness among live rows
/// atomically and report violations as `DuplicateAccount`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> DirectoryResult<User>;

    async fn find_live(&self, id: i64) -> DirectoryResult<Option<User>>;

    async fn find_live_by_account(&self, account: &str) -> DirectoryResult<Option<User>>;

    /// Writes every mutable field of `user`. `None` if the row is no longer live.
    async fn update_live(&self, user: &User) -> DirectoryResult<Option<User>>;

    /// `false` if there was no live row to delete.
    async fn soft_delete(&self, id: i64) -> DirectoryResult<bool>;

    /// Page of live rows ordered by `query.sort`, ties broken by id ascending.
    async fn list_live(&self, query: &PageQuery) -> DirectoryResult<Vec<User>>;

    async fn count_live(&self, filter: &UserFilter) -> DirectoryResult<i64>;
}

const USER_COLUMNS: &str =
    r#"id, name, account, password, status, "type", created_at, updated_at, deleted_at"#;

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    qb.push(" WHERE deleted_at IS NULL");
    if let Some(user_type) = filter.user_type {
        qb.push(r#" AND "type" = "#).push_bind(user_type);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> DirectoryResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (name, account, password, status, "type")
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.name)
            .bind(&user.account)
            .bind(&user.password_hash)
            .bind(user.status)
            .bind(user.user_type)
            .fetch_one(&self.db)
            .await
            .map_err(|e| classify_write(e, &user.account))
    }

    async fn find_live(&self, id: i64) -> DirectoryResult<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(classify)
    }

    async fn find_live_by_account(&self, account: &str) -> DirectoryResult<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE account = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(account)
            .fetch_optional(&self.db)
            .await
            .map_err(classify)
    }

    async fn update_live(&self, user: &User) -> DirectoryResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
               SET name = $2, account = $3, password = $4, status = $5, "type" = $6,
                   updated_at = now()
             WHERE id = $1 AND deleted_at IS NULL
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.account)
            .bind(&user.password_hash)
            .bind(user.status)
            .bind(user.user_type)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| classify_write(e, &user.account))
    }

    async fn soft_delete(&self, id: i64) -> DirectoryResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET deleted_at = now()
             WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(classify)?;
        Ok(res.rows_affected() == 1)
    }

    async fn list_live(&self, query: &PageQuery) -> DirectoryResult<Vec<User>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_filter(&mut qb, &query.filter);
        // Column and direction come from closed enums, never from caller text.
        qb.push(" ORDER BY ")
            .push(query.sort.as_sql())
            .push(" ")
            .push(query.order.as_sql());
        if query.sort != SortColumn::Id {
            qb.push(", id ASC");
        }
        qb.push(" LIMIT ")
            .push_bind(query.per_page)
            .push(" OFFSET ")
            .push_bind(query.offset());

        qb.build_query_as::<User>()
            .fetch_all(&self.db)
            .await
            .map_err(classify)
    }

    async fn count_live(&self, filter: &UserFilter) -> DirectoryResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_filter(&mut qb, filter);
        qb.build_query_scalar::<i64>()
            .fetch_one(&self.db)
            .await
            .map_err(classify)
    }
}
