pub mod config;
pub mod database;
pub mod resource_repository;
pub mod summary_repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use resource_repository::ResourceRepository;
pub use summary_repository::SummaryRepository;
