pub mod fetcher;
pub mod plugin;
pub mod storage;

pub use fetcher::ReqwestFetcher;
pub use plugin::SitePlugin;
pub use storage::{S3ObjectStore, StorageConfig};
