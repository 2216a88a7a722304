mod memory_repository;
mod postgres_repository;

pub use memory_repository::MemoryRepository;
pub use postgres_repository::{create_postgres_repository, PostgresRepository};

use crate::config::StorageConfig;
use crate::domain::RepositoryPtr;
use std::sync::Arc;

/// Creates the repository backend selected by configuration.
///
/// Postgres pools connect lazily; call [`Repository::migrate`](crate::domain::Repository::migrate)
/// before serving traffic.
pub fn create_repository(storage: &StorageConfig) -> anyhow::Result<RepositoryPtr> {
    // ---
    match storage {
        StorageConfig::Memory => {
            tracing::info!("Using in-memory storage");
            Ok(Arc::new(MemoryRepository::new()))
        }
        StorageConfig::Postgres(db) => {
            tracing::info!("Using Postgres storage (table {})", db.table);
            Ok(Arc::new(create_postgres_repository(db)?))
        }
    }
}
