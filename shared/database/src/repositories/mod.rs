//! Postgres-backed implementations of the store traits.

pub mod case;
pub mod summary;
pub mod directory;
pub mod notification;

pub use case::CaseRepository;
pub use summary::SummaryRepository;
pub use directory::DirectoryRepository;
pub use notification::NotificationRepository;

use tix_utils::{TixError, TixResult};

/// Attach a short description of the failed operation to a sqlx error.
pub(crate) trait DbContext<T> {
    fn db_context(self, what: &str) -> TixResult<T>;
}

impl<T> DbContext<T> for Result<T, sqlx::Error> {
    fn db_context(self, what: &str) -> TixResult<T> {
        self.map_err(|e| match e {
            sqlx::Error::RowNotFound => TixError::not_found(what.to_string()),
            other => TixError::database(format!("{}: {}", what, other)),
        })
    }
}
