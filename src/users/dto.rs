use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;

use crate::config::ListLimits;
use crate::users::repo_types::{User, UserType};

/// Request body for creating a user.
#[derive(Debug, Clone, Deserialize)]
pub struct UserCandidate {
    pub name: String,
    pub account: String,
    pub password: String,
    #[serde(default = "default_status")]
    pub status: bool,
    #[serde(rename = "type", default)]
    pub user_type: String,
}

fn default_status() -> bool {
    true
}

/// Partial update. `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub account: Option<String>,
    pub password: Option<String>,
    pub status: Option<bool>,
    /// Raw label; `Some("")` counts as absent.
    #[serde(rename = "type")]
    pub user_type: Option<String>,
}

/// Columns a listing may be ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortColumn {
    #[default]
    Id,
    Name,
    Account,
    Status,
    Type,
    CreatedAt,
    UpdatedAt,
}

impl SortColumn {
    /// Unknown names fall back to the default column.
    pub fn parse_or_default(raw: &str) -> Self {
        match raw {
            "id" => SortColumn::Id,
            "name" => SortColumn::Name,
            "account" => SortColumn::Account,
            "status" => SortColumn::Status,
            "type" => SortColumn::Type,
            "created_at" => SortColumn::CreatedAt,
            "updated_at" => SortColumn::UpdatedAt,
            _ => SortColumn::default(),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortColumn::Id => "id",
            SortColumn::Name => "name",
            SortColumn::Account => "account",
            SortColumn::Status => "status",
            SortColumn::Type => "\"type\"",
            SortColumn::CreatedAt => "created_at",
            SortColumn::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse_or_default(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Optional equality filters applied on top of the live-row filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub user_type: Option<UserType>,
    pub status: Option<bool>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        self.user_type.map_or(true, |t| user.user_type == t)
            && self.status.map_or(true, |s| user.status == s)
    }
}

/// Listing parameters as received from the caller, before normalisation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub sort_by: Option<String>,
    pub order_by: Option<String>,
    #[serde(rename = "type")]
    pub user_type: Option<UserType>,
    pub status: Option<bool>,
}

/// Normalised listing request handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub page: i64,
    pub per_page: i64,
    pub sort: SortColumn,
    pub order: SortOrder,
    pub filter: UserFilter,
}

impl PageQuery {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

impl ListParams {
    pub fn normalize(self, limits: ListLimits) -> PageQuery {
        let page = self.page.filter(|p| *p >= 1).unwrap_or(1);
        let per_page = match self.per_page {
            Some(n) if n > limits.max_per_page => {
                warn!(
                    requested = n,
                    max = limits.max_per_page,
                    default = limits.default_per_page,
                    "per_page above limit, using default"
                );
                limits.default_per_page
            }
            Some(n) if n >= 1 => n,
            _ => limits.default_per_page,
        };
        PageQuery {
            page,
            per_page,
            sort: self
                .sort_by
                .as_deref()
                .map(SortColumn::parse_or_default)
                .unwrap_or_default(),
            order: self
                .order_by
                .as_deref()
                .map(SortOrder::parse_or_default)
                .unwrap_or_default(),
            filter: UserFilter {
                user_type: self.user_type,
                status: self.status,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub current_page: i64,
    pub per_page: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(current_page: i64, per_page: i64, total_items: i64) -> Self {
        let total_pages = if total_items <= 0 {
            0
        } else {
            (total_items + per_page - 1) / per_page
        };
        Self {
            current_page,
            per_page,
            total_items,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResult<T> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

impl<T> PaginatedResult<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResult<U> {
        PaginatedResult {
            data: self.data.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

/// Outward view of a user; carries no password material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: i64,
    pub name: String,
    pub account: String,
    pub status: bool,
    #[serde(rename = "type")]
    pub user_type: UserType,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            account: u.account,
            status: u.status,
            user_type: u.user_type,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserCountResponse {
    pub user_count: i64,
}
