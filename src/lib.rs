//! acs-keyholder - keyholder interface of a hackerspace access control system
//!
//! Runs as the forced SSH command of the keyholder account and:
//! - Proves which authorized key opened the current SSH session
//! - Resolves that key to a known user
//! - Records the invocation in an SQLite audit store
//! - Publishes the requested space state to a watched state directory

pub mod audit;
pub mod command;
pub mod config;
pub mod error;
pub mod invocation;
pub mod state;
pub mod trust;

pub use config::Config;
pub use error::{AcsError, Result};
pub use invocation::{Invocation, Outcome};
