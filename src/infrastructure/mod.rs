mod database;
pub mod metrics;

// Re-export the factory functions for easy access
pub use database::{
    create_postgres_repository, create_repository, MemoryRepository, PostgresRepository,
};
pub use metrics::{create_registry, create_system_probe};
