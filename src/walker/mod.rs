//! Volume walker
//!
//! This module implements the sorted object listing of a volume and the
//! coordinator that runs several of them side by side.
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │     WalkCoordinator     │
//!                     │  - one thread / volume  │
//!                     └───────────┬─────────────┘
//!                                 │
//!       ┌─────────────────────────┼─────────────────────────┐
//!       │                         │                         │
//! ┌─────▼─────┐             ┌─────▼─────┐             ┌─────▼─────┐
//! │DiskWalker │             │DiskWalker │             │DiskWalker │
//! │ disk1/b   │             │ disk2/b   │             │ diskN/b   │
//! └─────┬─────┘             └─────┬─────┘             └─────┬─────┘
//!       │                         │                         │
//!       └──────────── bounded channel (EntrySink) ──────────┘
//!                                 │
//!                            ┌────▼────┐
//!                            │ printer │
//!                            └─────────┘
//! ```

pub mod coordinator;
pub mod options;
pub mod sink;
pub mod walk_dir;

pub use coordinator::{VolumeResult, WalkCoordinator, WalkResult};
pub use options::{WalkDirOptions, WalkStats};
pub use sink::{CountingSink, EntrySink, FnSink};
pub use walk_dir::DiskWalker;
