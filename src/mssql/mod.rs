// MSSQL module - the server-SQL backend
//
// - params: query binding and EXEC text for procedures
// - query: result extraction across every result set
// - connection: the backend, client creation and its session

pub mod connection;
pub mod params;
pub mod query;

pub use connection::{MssqlBackend, MssqlClient, MssqlConnection, create_mssql_client};
pub use params::bind_query_params;
pub use query::build_row_set;
