pub mod block;
pub mod error;
pub mod notify;
pub mod outcome;
pub mod parser;
pub mod server;
pub mod store;
pub mod types;
