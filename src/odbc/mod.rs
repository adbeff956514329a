// ODBC module - the bridged backends (ODBC, OLE DB sources, Oracle)
//
// - params: owned input parameters
// - query: column description and typed row extraction
// - connection: the backend and its worker-thread session

pub mod connection;
pub mod params;
pub mod query;

pub use connection::{OdbcBackend, OdbcSession};
