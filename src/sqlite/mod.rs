// SQLite module - the embedded-file backend
//
// - config: connection string parsing and open flags
// - params: value conversion and placeholder binding
// - query: row extraction and statement execution
// - connection: the backend and its worker-thread session

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::SqliteOptions;
pub use connection::{SqliteBackend, SqliteConnection};
pub use query::build_result_set;
