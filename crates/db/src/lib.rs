pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod retention;

pub use connection::{connect_with_settings, DbPool};
pub use repositories::RepositoryError;
pub use retention::RetentionReport;
