pub mod store;

pub use store::{is_valid_identifier, PostgresConfig, PostgresConnector, PostgresSession};
