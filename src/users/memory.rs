use std::{cmp::Ordering, collections::BTreeMap};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::{
    error::{DirectoryError, DirectoryResult},
    users::{
        dto::{PageQuery, SortColumn, SortOrder, UserFilter},
        repo::UserStore,
        repo_types::{NewUser, User},
    },
};

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, User>,
}

impl Table {
    fn account_taken(&self, account: &str, except: Option<i64>) -> bool {
        self.rows
            .values()
            .any(|u| u.is_live() && u.account == account && Some(u.id) != except)
    }
}

/// In-memory [`UserStore`] with the same constraints as the Postgres table:
/// serial ids, live-account uniqueness and soft deletes. Checks and writes
/// happen under one write lock, so concurrent creates race the same way
/// they would against the unique index.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    table: RwLock<Table>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw row including soft-deleted ones.
    pub async fn raw(&self, id: i64) -> Option<User> {
        self.table.read().await.rows.get(&id).cloned()
    }
}

fn compare(a: &User, b: &User, sort: SortColumn) -> Ordering {
    match sort {
        SortColumn::Id => a.id.cmp(&b.id),
        SortColumn::Name => a.name.cmp(&b.name),
        SortColumn::Account => a.account.cmp(&b.account),
        SortColumn::Status => a.status.cmp(&b.status),
        SortColumn::Type => a.user_type.cmp(&b.user_type),
        SortColumn::CreatedAt => a.created_at.cmp(&b.created_at),
        SortColumn::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: NewUser) -> DirectoryResult<User> {
        let mut table = self.table.write().await;
        if table.account_taken(&user.account, None) {
            return Err(DirectoryError::DuplicateAccount(user.account));
        }
        table.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let row = User {
            id: table.next_id,
            name: user.name,
            account: user.account,
            password_hash: user.password_hash,
            status: user.status,
            user_type: user.user_type,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        table.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_live(&self, id: i64) -> DirectoryResult<Option<User>> {
        let table = self.table.read().await;
        Ok(table.rows.get(&id).filter(|u| u.is_live()).cloned())
    }

    async fn find_live_by_account(&self, account: &str) -> DirectoryResult<Option<User>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .find(|u| u.is_live() && u.account == account)
            .cloned())
    }

    async fn update_live(&self, user: &User) -> DirectoryResult<Option<User>> {
        let mut table = self.table.write().await;
        if !table.rows.get(&user.id).is_some_and(|u| u.is_live()) {
            return Ok(None);
        }
        if table.account_taken(&user.account, Some(user.id)) {
            return Err(DirectoryError::DuplicateAccount(user.account.clone()));
        }
        let Some(row) = table.rows.get_mut(&user.id) else {
            return Ok(None);
        };
        row.name = user.name.clone();
        row.account = user.account.clone();
        row.password_hash = user.password_hash.clone();
        row.status = user.status;
        row.user_type = user.user_type;
        row.updated_at = OffsetDateTime::now_utc();
        Ok(Some(row.clone()))
    }

    async fn soft_delete(&self, id: i64) -> DirectoryResult<bool> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&id) {
            Some(row) if row.is_live() => {
                row.deleted_at = Some(OffsetDateTime::now_utc());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_live(&self, query: &PageQuery) -> DirectoryResult<Vec<User>> {
        let table = self.table.read().await;
        let mut rows: Vec<User> = table
            .rows
            .values()
            .filter(|u| u.is_live() && query.filter.matches(u))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            let primary = compare(a, b, query.sort);
            let primary = match query.order {
                SortOrder::Asc => primary,
                SortOrder::Desc => primary.reverse(),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.per_page).unwrap_or(0);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_live(&self, filter: &UserFilter) -> DirectoryResult<i64> {
        let table = self.table.read().await;
        let count = table
            .rows
            .values()
            .filter(|u| u.is_live() && filter.matches(u))
            .count();
        Ok(count as i64)
    }
}
