//! volume-walker - Sorted Object Listing for Local Disk Volumes
//!
//! The local-disk scanning engine of a sharded object store. Objects are
//! stored as directories holding a metadata file; this crate rebuilds the
//! object namespace of a bucket from that layout and streams it in strict
//! byte order, without ever materializing the whole listing.
//!
//! # Features
//!
//! - **Raw Directory Reads**: `getdents64` into pooled buffers, decoded by a
//!   bounds-checked record parser. One allocation per returned name.
//!
//! - **Cheap Object Probes**: only the first 4 KiB of a metadata file is
//!   read to decide that a directory is an object.
//!
//! - **Sorted Merge Walk**: prefixes are merged back into the level they
//!   belong to, so output is globally ordered and resumable.
//!
//! - **Best Effort on Live Disks**: entries that vanish mid-walk are
//!   skipped, never retried.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     <disk>/<bucket>/...                          │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ getdents64 / open(O_NOATIME)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         storage                                  │
//! │   VolumeDir ─ readdir ─ DirentDecoder ─ metadata ─ block_reader  │
//! │                    pooled buffers (pool)                         │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          walker                                  │
//! │   DiskWalker::walk_dir: filter → sort → probe → stack merge      │
//! │   WalkCoordinator: one thread per volume                         │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ EntrySink
//!                               ▼
//!                    ┌──────────────────┐
//!                    │  sorted names    │
//!                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Full recursive listing
//! volume-walker /mnt/disk1/photos
//!
//! # One level below a prefix, resuming after a known name
//! volume-walker /mnt/disk1/photos --base-dir 2024/ --flat --forward-to 2024/06/
//! ```

pub mod config;
pub mod error;
pub mod progress;
pub mod storage;
pub mod walker;

pub use config::{CliArgs, VolumeTarget, WalkConfig};
pub use error::{Result, StorageError, StorageResult, WalkerError};
pub use walker::{DiskWalker, EntrySink, WalkCoordinator, WalkDirOptions, WalkResult, WalkStats};
