//! Mirror core library: domain types, job configuration, errors.
//!
//! - [`types`]: entry, signature and scheduling types shared by every crate
//! - [`config`]: YAML job configuration (load / save / validate)
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::MirrorConfig;
pub use error::ConfigError;
pub use types::{
    CompareMode, DirectoryEntry, EntryKind, Interval, IntervalUnit, RelPath, Signature,
};
