pub mod config;
pub mod database;
pub mod queue_repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use queue_repository::PgQueueStore;
