//! Local disk storage layer
//!
//! Everything the walk engine needs from one disk: the volume resolver,
//! the directory reader, the metadata probe and the buffer pools they
//! share.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Walk Engine                         │
//! └───────┬───────────────────┬────────────────────┬─────────┘
//!         │ resolve           │ list               │ probe
//! ┌───────▼───────┐   ┌───────▼────────┐   ┌───────▼────────┐
//! │  VolumeDir    │   │  readdir       │   │  metadata      │
//! │  access(2)    │   │  getdents64    │   │  4 KiB head    │
//! └───────────────┘   │  DirentDecoder │   │  block_reader  │
//!                     └───────┬────────┘   └───────┬────────┘
//!                             │                    │
//!                     ┌───────▼────────────────────▼───────┐
//!                     │    pool: dirent / name / metadata  │
//!                     │          aligned direct blocks     │
//!                     └────────────────────────────────────┘
//! ```
//!
//! # On-disk layout
//!
//! `<disk>/<bucket>/<object path>/xl.meta`, or `xl.json` for objects
//! written in the legacy format. An object whose name ends in `/` is
//! stored under `<name>__XLDIR__/xl.meta` so it can coexist with a real
//! prefix of the same name.

pub mod block_reader;
pub mod dirent;
pub mod metadata;
pub mod pool;
pub mod readdir;
pub mod types;
pub mod volume;

pub use block_reader::{read_file, BlockReader};
pub use metadata::{read_metadata, PartialMetadata};
pub use readdir::{is_dir_empty, read_dir, read_dir_n, read_dir_with_opts, ReadDirOpts};
pub use types::{decode_dir_object, encode_dir_object, EntryType};
pub use volume::{check_path_length, path_join, VolumeDir};
