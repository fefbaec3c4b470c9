pub mod error;
pub mod sqlite;

pub use error::DatabaseError;
pub use sqlite::{opt_uuid_column, uuid_column, Database};
