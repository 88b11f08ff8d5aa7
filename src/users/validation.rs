//! Pre-write validation for the user lifecycle.
//!
//! Both steps consume their input. Creation hashes the password here;
//! a patch carries its new password until it is applied onto the stored
//! user. Nothing here touches storage.

use std::fmt;

use crate::{
    auth::password,
    error::{DirectoryError, ValidationError},
    users::{
        dto::{UserCandidate, UserPatch},
        repo_types::{NewUser, User, UserType},
    },
};

/// Upper bound for `name` and `account`, matching their `VARCHAR(100)` columns.
pub const MAX_FIELD_CHARS: usize = 100;

/// A patch that passed validation.
#[derive(Clone, Default)]
pub struct ValidatedPatch {
    pub name: Option<String>,
    pub account: Option<String>,
    password: Option<String>,
    pub status: Option<bool>,
    pub user_type: Option<UserType>,
}

impl fmt::Debug for ValidatedPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedPatch")
            .field("name", &self.name)
            .field("account", &self.account)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("status", &self.status)
            .field("user_type", &self.user_type)
            .finish()
    }
}

impl ValidatedPatch {
    /// Overwrites only the fields present in the patch. A new password is
    /// hashed here, once.
    pub fn apply_to(self, user: &mut User) -> Result<(), DirectoryError> {
        if let Some(plain) = self.password {
            user.set_password(&plain)?;
        }
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(account) = self.account {
            user.account = account;
        }
        if let Some(status) = self.status {
            user.status = status;
        }
        if let Some(user_type) = self.user_type {
            user.user_type = user_type;
        }
        Ok(())
    }
}

fn required(
    value: String,
    empty: ValidationError,
    too_long: ValidationError,
) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(empty);
    }
    if trimmed.chars().count() > MAX_FIELD_CHARS {
        return Err(too_long);
    }
    Ok(trimmed.to_string())
}

fn checked_name(value: String) -> Result<String, ValidationError> {
    required(value, ValidationError::EmptyName, ValidationError::NameTooLong)
}

fn checked_account(value: String) -> Result<String, ValidationError> {
    required(value, ValidationError::EmptyAccount, ValidationError::AccountTooLong)
}

/// Checks a create request and hashes its password, exactly once.
///
/// The empty-password check runs before any hashing is attempted.
pub fn validate_for_create(candidate: UserCandidate) -> Result<NewUser, DirectoryError> {
    let name = checked_name(candidate.name)?;
    let account = checked_account(candidate.account)?;
    let user_type: UserType = candidate.user_type.parse()?;
    if candidate.password.is_empty() {
        return Err(ValidationError::EmptyPassword.into());
    }
    let password_hash = password::hash_password(&candidate.password)?;

    Ok(NewUser {
        name,
        account,
        password_hash,
        status: candidate.status,
        user_type,
    })
}

/// Checks a patch. An empty `type` or `password` means "not provided";
/// an unknown non-empty type is rejected. Never looks at the stored type.
pub fn validate_for_update(patch: UserPatch) -> Result<ValidatedPatch, DirectoryError> {
    let name = patch.name.map(checked_name).transpose()?;
    let account = patch.account.map(checked_account).transpose()?;
    let user_type = match patch.user_type.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<UserType>()?),
    };
    let password = patch.password.filter(|p| !p.is_empty());

    Ok(ValidatedPatch {
        name,
        account,
        password,
        status: patch.status,
        user_type,
    })
}
