pub mod api_server;
pub mod memory;
pub mod postgres;
pub mod store;

pub use api_server::{start_api_server, start_api_server_background};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use store::{EconomyStore, NewTransaction, TxInsert};
