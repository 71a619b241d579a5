pub mod chat;
pub mod connection;
pub mod query_log;
pub mod schema;
pub mod settings;

pub use chat::*;
pub use connection::*;
pub use query_log::*;
pub use schema::*;
pub use settings::*;
