//! # Trust chain
//!
//! Proves which authorized key opened the SSH session that invoked us, and
//! who that key belongs to. There is no API between `sshd` and this tool, so
//! the proof is pieced together from what the host exposes:
//!
//! ```text
//! ┌──────────────┐  pid   ┌──────────────┐  fingerprint  ┌──────────────────┐  comment  ┌─────────────┐
//! │  process.rs  │ ─────▶ │  authlog.rs  │ ────────────▶ │ authorized_keys  │ ────────▶ │ identity.rs │
//! │ /proc walk   │        │ auth.log     │               │ + fingerprint.rs │           │ user table  │
//! └──────────────┘        └──────────────┘               └──────────────────┘           └─────────────┘
//! ```
//!
//! ## Known gap
//!
//! The correlation is keyed on the `sshd` pid alone. If that session ends
//! and the kernel hands the pid to a new `sshd` before we scan the log, the
//! last "Accepted publickey" line for the pid wins, which may belong to the
//! newer session.

mod authlog;
mod authorized_keys;
mod fingerprint;
mod identity;
mod process;

pub use authlog::{AuthLog, LoginEvent, LoginEventSource};
pub use authorized_keys::{AuthorizedKey, AuthorizedKeys};
pub use identity::{Identity, resolve as resolve_identity, username_from_comment};
pub use process::ProcessAncestry;

#[cfg(test)]
pub(crate) use authlog::MockLoginEventSource;
#[cfg(test)]
pub(crate) use authorized_keys::tests::{fake_blob, fake_fingerprint};
#[cfg(test)]
pub(crate) use process::tests::fake_process;
