// PostgreSQL module - the open-source-server backend
//
// - params: value encoding for the server-inferred parameter types
// - query: row extraction and result building
// - connection: the backend, its session and its row stream

pub mod connection;
pub mod params;
pub mod query;

pub use connection::{PostgresBackend, PostgresConnection};
pub use params::Params;
pub use query::build_result_set_from_statement;
