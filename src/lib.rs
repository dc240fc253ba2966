//! Client-side mirror of a table-oriented exchange feed.
//!
//! The feed streams `partial` snapshots followed by `insert` / `update` /
//! `delete` mutations per table. [`Mirror`] keeps a local copy of every
//! table, bounded in size, and exposes read-only views of it.

pub mod config;
pub mod error;
pub mod logging;
pub mod market;
pub mod mirror;

pub use config::{Credentials, MirrorConfig};
pub use error::{MirrorError, Result};
pub use mirror::Mirror;
