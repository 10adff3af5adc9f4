pub mod cleanup;
pub mod database;
pub mod error;
pub mod facts;
pub mod records;
pub mod row_helpers;
pub mod schema;

pub use cleanup::{CleanupRepo, StoreStats, TabDeletion};
pub use database::Database;
pub use error::StoreError;
pub use facts::FactRepo;
pub use records::TimingRecordRepo;
