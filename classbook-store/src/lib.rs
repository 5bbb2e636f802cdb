pub mod app_config;
pub mod snapshot_repo;

pub use app_config::Config;
pub use snapshot_repo::FileSnapshotRepository;
