//! Back-office user directory: account lifecycle, paginated listing and
//! the startup schema evolution for the `users` table.

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod panel;
pub mod schema;
pub mod state;
pub mod users;

pub use error::{DirectoryError, DirectoryResult, ValidationError};
pub use users::services::UserService;
