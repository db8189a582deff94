//! Configuration types for volume-walker
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Volume path parsing (`<disk>/<bucket>`)

use crate::error::ConfigError;
use crate::walker::WalkDirOptions;
use clap::Parser;
use std::path::{Path, PathBuf};

/// Minimum output queue size
const MIN_QUEUE_SIZE: usize = 16;

/// Sorted object listing of local disk volumes
#[derive(Parser, Debug, Clone)]
#[command(
    name = "volume-walker",
    version,
    about = "List the objects stored on local disk volumes in sorted order",
    long_about = "Walks one or more bucket directories laid out as \
                  <disk>/<bucket>/<object>/xl.meta and prints every object and prefix \
                  name in byte order.\n\n\
                  Directories without metadata are reported as prefixes ending in '/'.",
    after_help = "EXAMPLES:\n    \
        volume-walker /mnt/disk1/photos\n    \
        volume-walker /mnt/disk1/photos --base-dir 2024/ --flat\n    \
        volume-walker /mnt/disk1/photos --forward-to 2024/06/img-0042.jpg\n    \
        volume-walker /mnt/disk1/photos /mnt/disk2/photos --count-only"
)]
pub struct CliArgs {
    /// Volume paths to scan (<disk>/<bucket>)
    #[arg(value_name = "VOLUME", required = true)]
    pub volumes: Vec<PathBuf>,

    /// Directory inside the bucket to list
    #[arg(long, default_value = "", value_name = "DIR")]
    pub base_dir: String,

    /// Only list first-level entries starting with this (no '/')
    #[arg(long, default_value = "", value_name = "PREFIX")]
    pub prefix: String,

    /// Resume listing at this object path
    #[arg(long, default_value = "", value_name = "PATH")]
    pub forward_to: String,

    /// Do not descend into prefixes
    #[arg(long)]
    pub flat: bool,

    /// Also print the prefixes a recursive walk descends into
    #[arg(long)]
    pub with_prefixes: bool,

    /// Fail if the base directory does not exist
    #[arg(long)]
    pub report_not_found: bool,

    /// Follow symlinks to directories
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Print only the number of names found
    #[arg(long)]
    pub count_only: bool,

    /// Output queue size between walkers and the printer
    #[arg(long, default_value = "4096", value_name = "NUM")]
    pub queue_size: usize,

    /// Quiet mode - suppress progress and summary output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (show skipped entries)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// One bucket directory on one disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeTarget {
    /// Disk root holding the bucket
    pub disk_root: PathBuf,

    /// Bucket directory name
    pub bucket: String,
}

impl VolumeTarget {
    /// Split a `<disk>/<bucket>` path.
    ///
    /// The last component is the bucket; everything before it is the disk
    /// root (the current directory if there is nothing before it).
    pub fn parse(path: &Path) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidVolumePath {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let bucket = path
            .file_name()
            .ok_or_else(|| invalid("missing bucket name"))?
            .to_str()
            .ok_or_else(|| invalid("bucket name is not valid UTF-8"))?
            .to_string();

        let disk_root = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Ok(Self { disk_root, bucket })
    }

    /// Label used to tag output from this volume
    pub fn display_name(&self) -> String {
        self.disk_root.join(&self.bucket).display().to_string()
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// Volumes to walk, one thread each
    pub volumes: Vec<VolumeTarget>,

    /// Directory inside each bucket
    pub base_dir: String,

    /// First-level name filter
    pub filter_prefix: String,

    /// Resume point
    pub forward_to: String,

    /// Descend into prefixes
    pub recursive: bool,

    /// Emit walked prefixes too
    pub emit_prefixes: bool,

    /// Missing base directory is an error
    pub report_not_found: bool,

    /// Follow symlinked directories
    pub follow_symlinks: bool,

    /// Count names instead of printing them
    pub count_only: bool,

    /// Output channel capacity
    pub queue_size: usize,

    /// Show progress indicator and summary
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl WalkConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.volumes.is_empty() {
            return Err(ConfigError::NoVolumes);
        }

        let volumes = args
            .volumes
            .iter()
            .map(|p| VolumeTarget::parse(p))
            .collect::<Result<Vec<_>, _>>()?;

        if args.prefix.contains('/') {
            return Err(ConfigError::InvalidPrefix {
                prefix: args.prefix,
            });
        }

        if !forward_inside_base(&args.forward_to, &args.base_dir) {
            return Err(ConfigError::ForwardOutsideBase {
                forward_to: args.forward_to,
                base_dir: args.base_dir,
            });
        }

        if args.queue_size < MIN_QUEUE_SIZE {
            return Err(ConfigError::InvalidQueueSize {
                size: args.queue_size,
                min: MIN_QUEUE_SIZE,
            });
        }

        Ok(Self {
            volumes,
            base_dir: args.base_dir,
            filter_prefix: args.prefix,
            forward_to: args.forward_to,
            recursive: !args.flat,
            emit_prefixes: args.with_prefixes,
            report_not_found: args.report_not_found,
            follow_symlinks: args.follow_symlinks,
            count_only: args.count_only,
            queue_size: args.queue_size,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Walk options for one bucket
    pub fn to_walk_options(&self, bucket: &str) -> WalkDirOptions {
        WalkDirOptions {
            bucket: bucket.to_string(),
            base_dir: self.base_dir.clone(),
            recursive: self.recursive,
            report_not_found: self.report_not_found,
            filter_prefix: self.filter_prefix.clone(),
            forward_to: self.forward_to.clone(),
            emit_prefixes: self.emit_prefixes,
        }
    }
}

/// A resume point must lie under the base directory
fn forward_inside_base(forward_to: &str, base_dir: &str) -> bool {
    if forward_to.is_empty() || base_dir.is_empty() {
        return true;
    }
    match forward_to.strip_prefix(base_dir) {
        Some(rest) => base_dir.ends_with('/') || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
