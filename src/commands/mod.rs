pub mod ask;
pub mod explore;
pub mod metadata;
pub mod query;
pub mod query_log;
pub mod settings;

pub use ask::{Assistant, Round, Stage, Timings};
pub use query::{check_read_only, execute_read_only, ExecOptions, PgExecutor, QueryExecutor, ResultSet};
