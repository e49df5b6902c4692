pub mod manager;

pub use manager::{DatabaseError, DatabaseManager};
