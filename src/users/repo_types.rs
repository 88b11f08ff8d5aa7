use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::{
    auth::password,
    error::{DirectoryError, ValidationError},
};

/// Closed set of account kinds; stored as the PostgreSQL enum `user_type`.
/// Variant order is the enum label order, which is how PostgreSQL sorts it.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
)]
#[sqlx(type_name = "user_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    System,
    #[default]
    Panel,
}

impl UserType {
    pub const ALL: [UserType; 2] = [UserType::System, UserType::Panel];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::System => "system",
            UserType::Panel => "panel",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(UserType::System),
            "panel" => Ok(UserType::Panel),
            other => Err(ValidationError::InvalidUserType(other.to_string())),
        }
    }
}

/// User row in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub account: String,
    #[serde(skip_serializing)]
    #[sqlx(rename = "password")]
    pub password_hash: String,      // argon2 PHC string
    pub status: bool,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub user_type: UserType,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

impl User {
    /// Replaces the stored hash with a fresh salted hash of `plain`.
    pub fn set_password(&mut self, plain: &str) -> Result<(), DirectoryError> {
        if plain.is_empty() {
            return Err(ValidationError::EmptyPassword.into());
        }
        self.password_hash = password::hash_password(plain)?;
        Ok(())
    }

    /// Never errors: a malformed stored hash simply does not match.
    pub fn check_password(&self, plain: &str) -> bool {
        password::verify_password(plain, &self.password_hash).unwrap_or(false)
    }

    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// A validated user ready for insertion. Only produced by
/// [`validate_for_create`](super::validation::validate_for_create), so the
/// password is always hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub account: String,
    pub password_hash: String,
    pub status: bool,
    pub user_type: UserType,
}
