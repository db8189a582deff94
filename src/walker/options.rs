//! Walk options and statistics

use std::time::Duration;

/// Options for one walk over one volume
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkDirOptions {
    /// Bucket to scan
    pub bucket: String,

    /// Directory inside the bucket (empty = bucket root)
    pub base_dir: String,

    /// Descend into prefixes
    pub recursive: bool,

    /// Fail with `FileNotFound` when `base_dir` does not exist
    pub report_not_found: bool,

    /// Only return entries of the first level starting with this.
    /// Never contains `/`.
    pub filter_prefix: String,

    /// Resume: skip every name sorting before this full object path
    pub forward_to: String,

    /// Also emit prefixes that a recursive walk descends into.
    /// Non-recursive walks always emit them.
    pub emit_prefixes: bool,
}

impl WalkDirOptions {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    pub fn base_dir(mut self, base_dir: impl Into<String>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn report_not_found(mut self, report: bool) -> Self {
        self.report_not_found = report;
        self
    }

    pub fn filter_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.filter_prefix = prefix.into();
        self
    }

    pub fn forward_to(mut self, forward_to: impl Into<String>) -> Self {
        self.forward_to = forward_to.into();
        self
    }

    pub fn emit_prefixes(mut self, emit: bool) -> Self {
        self.emit_prefixes = emit;
        self
    }
}

/// Result of a walk
#[derive(Debug, Clone, Default)]
pub struct WalkStats {
    /// Object names emitted
    pub objects: u64,
    /// Prefix names emitted
    pub prefixes: u64,
    /// Directories listed
    pub dirs_listed: u64,
    /// Entries skipped on unexpected probe or listing errors
    pub skipped: u64,
    /// Metadata bytes read by probes
    pub meta_bytes: u64,
    pub duration: Duration,
    pub completed: bool,
}

impl WalkStats {
    /// Total names emitted
    pub fn emitted(&self) -> u64 {
        self.objects + self.prefixes
    }

    pub fn entries_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.emitted() as f64 / secs
        } else {
            0.0
        }
    }

    /// Fold another volume's stats into this one
    pub fn merge(&mut self, other: &WalkStats) {
        self.objects += other.objects;
        self.prefixes += other.prefixes;
        self.dirs_listed += other.dirs_listed;
        self.skipped += other.skipped;
        self.meta_bytes += other.meta_bytes;
        self.duration = self.duration.max(other.duration);
        self.completed &= other.completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let opts = WalkDirOptions::new("bucket")
            .base_dir("photos/")
            .recursive(true)
            .filter_prefix("2024")
            .forward_to("photos/2024/b")
            .emit_prefixes(true);

        assert_eq!(opts.bucket, "bucket");
        assert_eq!(opts.base_dir, "photos/");
        assert!(opts.recursive);
        assert!(!opts.report_not_found);
        assert_eq!(opts.filter_prefix, "2024");
        assert_eq!(opts.forward_to, "photos/2024/b");
        assert!(opts.emit_prefixes);
    }

    #[test]
    fn test_stats_merge() {
        let mut total = WalkStats {
            completed: true,
            ..Default::default()
        };
        let a = WalkStats {
            objects: 3,
            prefixes: 1,
            duration: Duration::from_secs(2),
            completed: true,
            ..Default::default()
        };
        let b = WalkStats {
            objects: 2,
            skipped: 4,
            duration: Duration::from_secs(1),
            completed: false,
            ..Default::default()
        };
        total.merge(&a);
        total.merge(&b);

        assert_eq!(total.emitted(), 6);
        assert_eq!(total.skipped, 4);
        assert_eq!(total.duration, Duration::from_secs(2));
        assert!(!total.completed);
    }

    #[test]
    fn test_entries_per_second() {
        let stats = WalkStats {
            objects: 100,
            duration: Duration::from_secs(4),
            ..Default::default()
        };
        assert_eq!(stats.entries_per_second(), 25.0);
        assert_eq!(WalkStats::default().entries_per_second(), 0.0);
    }
}
