//! # mirror-sync
//!
//! One-way tree reconciliation: make a replica directory look like a source
//! directory.
//!
//! A pass lists one directory level of each tree ([`walker`]), partitions the
//! names into five sets ([`classify`]), applies copy / overwrite / delete
//! actions to the replica ([`reconcile`]) and recurses into directories present
//! on both sides. Call [`run_once`] for a full pass; it keeps no state between
//! calls, so running it on a timer is safe.

pub mod cancel;
pub mod classify;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod reconcile;
pub mod walker;

pub use cancel::CancelFlag;
pub use classify::{classify, Classification, FileComparator, Matched};
pub use error::SyncError;
pub use event::{Action, EventSink, NullSink, Severity, SyncEvent, TracingSink};
pub use pipeline::{prepare_replica, run_once, PassOptions, PassSummary, SyncPassResult};
