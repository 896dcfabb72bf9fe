//! Durable audit record: users, last-seen keys and the invocation log.

mod db;
mod error;
mod models;

pub use db::{AuditBatch, AuditStore};
pub use error::StoreError;
pub use models::{KeyRecord, LogEntry, NewLogEntry, NewUser};
