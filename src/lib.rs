pub mod dispatch;
pub mod error;
pub mod exec;
pub mod job;
pub mod parser;
pub mod types;
