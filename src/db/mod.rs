pub mod audit;
pub mod credentials;
pub mod postgres;
pub mod retry;
pub mod sqlite;
