pub mod admin;
pub mod config;
pub mod error;
pub mod record;
pub mod schema;
pub mod sink;
pub mod time;
pub mod topic;
