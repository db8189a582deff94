//! Sorted directory walk over one volume
//!
//! Object names are rebuilt from the on-disk layout and emitted in strictly
//! increasing byte order. Each level is listed, filtered and sorted on its
//! own; subdirectories that turn out not to be objects are parked on a
//! small stack and merged back into the stream as soon as the next entry of
//! the level sorts after them, so a subtree is walked exactly where its
//! names belong instead of all at once.
//!
//! ```text
//!   level "":   [a-b, a, b]        stack (top last)
//!   a   → not an object            ["a/"]
//!   a-b → object, emit "a-b"       ["a/"]         "a-b" < "a/"
//!   b   → pop "a/", emit, recurse  []
//!         emit "b"
//! ```

use crate::error::{ProbeError, StorageError, StorageResult};
use crate::storage::block_reader::read_file;
use crate::storage::metadata::read_metadata;
use crate::storage::readdir::{is_dir_empty, read_dir_with_opts, ReadDirOpts};
use crate::storage::types::{
    decode_dir_object, encode_dir_object, is_dir_object_entry, SLASH_SEPARATOR, XL_META_FILE,
    XL_META_FILE_LEGACY,
};
use crate::storage::volume::{path_join, VolumeDir};
use crate::walker::options::{WalkDirOptions, WalkStats};
use crate::walker::sink::EntrySink;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of probing one candidate object directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    /// Current or legacy metadata present
    Object,
    /// No metadata; may be a prefix
    Missing,
    /// Unexpected error, entry skipped
    Failed,
}

/// Walks volumes on one disk
pub struct DiskWalker {
    disk_root: PathBuf,
    follow_dir_symlink: bool,
    shutdown: Arc<AtomicBool>,
}

impl DiskWalker {
    pub fn new(disk_root: impl Into<PathBuf>) -> Self {
        Self {
            disk_root: disk_root.into(),
            follow_dir_symlink: false,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Treat symlinks to directories as directories
    pub fn follow_dir_symlink(mut self, follow: bool) -> Self {
        self.follow_dir_symlink = follow;
        self
    }

    /// Share a cancellation flag with other walkers
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn disk_root(&self) -> &Path {
        &self.disk_root
    }

    /// Walk `opts.bucket` and send every name to `sink` in sorted order.
    ///
    /// Aborts with `VolumeNotFound`, `AccessDenied` or `FaultyDisk` when the
    /// volume cannot be used, and with `Cancelled` when the shutdown flag is
    /// set or the sink refuses a name. Per-entry failures only shrink the
    /// output.
    pub fn walk_dir<S: EntrySink + ?Sized>(
        &self,
        opts: &WalkDirOptions,
        sink: &mut S,
    ) -> StorageResult<WalkStats> {
        let start = Instant::now();

        if self.shutdown.load(Ordering::Relaxed) {
            return Err(StorageError::Cancelled);
        }
        let volume = VolumeDir::resolve(&self.disk_root, &opts.bucket)?;
        debug!(
            "Walking {} base_dir={:?} recursive={}",
            volume.path().display(),
            opts.base_dir,
            opts.recursive
        );

        let mut ctx = WalkContext {
            volume,
            opts,
            prefix: opts.filter_prefix.clone(),
            read_opts: ReadDirOpts {
                count: None,
                follow_dir_symlink: self.follow_dir_symlink,
            },
            shutdown: &self.shutdown,
            sink,
            last_emitted: None,
            stats: WalkStats::default(),
        };

        let result = ctx
            .check_base_dir()
            .and_then(|()| ctx.scan_dir(&opts.base_dir, 0));

        let mut stats = ctx.stats;
        stats.duration = start.elapsed();

        match result {
            Ok(()) => {
                stats.completed = true;
                info!(
                    "Walk of {} complete: {} objects, {} prefixes, {} dirs listed in {:.2}s",
                    opts.bucket,
                    stats.objects,
                    stats.prefixes,
                    stats.dirs_listed,
                    stats.duration.as_secs_f64()
                );
                Ok(stats)
            }
            Err(StorageError::Cancelled) => {
                info!(
                    "Walk of {} cancelled after {} names",
                    opts.bucket,
                    stats.emitted()
                );
                Err(StorageError::Cancelled)
            }
            Err(e) => {
                warn!("Walk of {} failed: {}", opts.bucket, e);
                Err(e)
            }
        }
    }
}

/// State of one walk, threaded through every level
struct WalkContext<'a, S: EntrySink + ?Sized> {
    volume: VolumeDir,
    opts: &'a WalkDirOptions,
    /// First-level filter, cleared once the base level is listed
    prefix: String,
    read_opts: ReadDirOpts,
    shutdown: &'a AtomicBool,
    sink: &'a mut S,
    last_emitted: Option<String>,
    stats: WalkStats,
}

impl<'a, S: EntrySink + ?Sized> WalkContext<'a, S> {
    fn check_cancel(&self) -> StorageResult<()> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(StorageError::Cancelled);
        }
        Ok(())
    }

    /// Send `name` unless it sorts before the resume point or repeats the
    /// previous name.
    fn emit(&mut self, name: String, is_prefix: bool) -> StorageResult<()> {
        self.check_cancel()?;
        if !self.opts.forward_to.is_empty() && name.as_str() < self.opts.forward_to.as_str() {
            return Ok(());
        }
        // Directory object "a/" next to a real directory "a"
        if self.last_emitted.as_deref() == Some(name.as_str()) {
            return Ok(());
        }

        if is_prefix {
            self.stats.prefixes += 1;
        } else {
            self.stats.objects += 1;
        }
        self.last_emitted = Some(name.clone());

        if !self.sink.send(name) {
            return Err(StorageError::Cancelled);
        }
        Ok(())
    }

    /// Handle a base directory given with a trailing slash.
    ///
    /// If it names a directory object, that object is the first name of the
    /// listing. If it names a plain object, there is no prefix to list.
    fn check_base_dir(&mut self) -> StorageResult<()> {
        let opts = self.opts;
        let base_dir = &opts.base_dir;
        if !base_dir.ends_with(SLASH_SEPARATOR) {
            return Ok(());
        }
        self.check_cancel()?;

        let dir_object = self
            .volume
            .join(&encode_dir_object(base_dir))
            .join(XL_META_FILE);
        match read_metadata(&dir_object) {
            Ok(meta) => {
                self.stats.meta_bytes += meta.bytes().len() as u64;
                self.emit(base_dir.clone(), false)
            }
            Err(_) => {
                let object_meta = self.volume.join(base_dir).join(XL_META_FILE);
                match std::fs::symlink_metadata(&object_meta) {
                    Ok(md) if md.file_type().is_file() => Err(StorageError::FileNotFound),
                    _ => Ok(()),
                }
            }
        }
    }

    /// List `current`, folding failures into "nothing there".
    ///
    /// Only fatal conditions are returned as errors: cancellation, the
    /// volume vanishing or faulting, and a missing base directory when the
    /// caller asked for it to be reported.
    fn list_dir(&mut self, current: &str, is_base: bool) -> StorageResult<Option<Vec<String>>> {
        self.check_cancel()?;

        let dir_path = self.volume.join(current);
        match read_dir_with_opts(&dir_path, self.read_opts) {
            Ok(entries) => {
                self.stats.dirs_listed += 1;
                Ok(Some(entries))
            }
            Err(e) if e.is_not_found() => {
                if let Err(e) = self.volume.recheck() {
                    if e.is_fatal() {
                        return Err(e);
                    }
                }
                if is_base && self.opts.report_not_found {
                    return Err(StorageError::FileNotFound);
                }
                // Removed while we were walking
                debug!("{} vanished before listing", dir_path.display());
                Ok(None)
            }
            Err(e) => {
                warn!("Failed to list {}: {}", dir_path.display(), e);
                self.stats.skipped += 1;
                Ok(None)
            }
        }
    }

    /// Check `name` for current metadata, then legacy metadata.
    fn probe(&mut self, name: &str) -> StorageResult<Probe> {
        self.check_cancel()?;

        let object_dir = self.volume.join(name);
        match read_metadata(&object_dir.join(XL_META_FILE)) {
            Ok(meta) => {
                self.stats.meta_bytes += meta.bytes().len() as u64;
                Ok(Probe::Object)
            }
            Err(e) if e.is_not_found_or_dir() => {
                self.check_cancel()?;
                match read_file(&object_dir.join(XL_META_FILE_LEGACY)) {
                    Ok(data) => {
                        self.stats.meta_bytes += data.len() as u64;
                        Ok(Probe::Object)
                    }
                    Err(_) => Ok(Probe::Missing),
                }
            }
            Err(ProbeError::NotDirectory) => Ok(Probe::Failed),
            Err(e) => {
                debug!("Skipping {}: {}", object_dir.display(), e);
                self.stats.skipped += 1;
                Ok(Probe::Failed)
            }
        }
    }

    /// Resolve the base directory itself as an object from the metadata
    /// file found while listing it.
    fn root_object(&mut self, current: &str, file: &str) -> StorageResult<Option<String>> {
        self.check_cancel()?;

        let meta_path = self.volume.join(current).join(file);
        let found = if file == XL_META_FILE {
            match read_metadata(&meta_path) {
                Ok(meta) => {
                    self.stats.meta_bytes += meta.bytes().len() as u64;
                    true
                }
                Err(_) => false,
            }
        } else if file == XL_META_FILE_LEGACY {
            match read_file(&meta_path) {
                Ok(data) => {
                    self.stats.meta_bytes += data.len() as u64;
                    true
                }
                Err(_) => false,
            }
        } else {
            false
        };

        Ok(found.then(|| decode_dir_object(current.trim_end_matches('/'))))
    }

    /// Emit a pending prefix, or walk it when recursive.
    fn visit_prefix(&mut self, prefix: String, depth: usize) -> StorageResult<()> {
        let opts = self.opts;
        if !opts.recursive || opts.emit_prefixes {
            self.emit(prefix.clone(), true)?;
        }

        if opts.recursive && !self.before_forward(&prefix) {
            self.check_cancel()?;
            self.scan_dir(&prefix, depth + 1)?;
        }
        Ok(())
    }

    /// Whole subtree under `prefix` sorts before the resume point
    fn before_forward(&self, prefix: &str) -> bool {
        let forward_to = self.opts.forward_to.as_str();
        !forward_to.is_empty() && prefix < forward_to && !forward_to.starts_with(prefix)
    }

    /// Pop and visit every stacked prefix sorting before `bound`, or all of
    /// them when there is no bound.
    fn drain_stack(
        &mut self,
        stack: &mut Vec<String>,
        bound: Option<&str>,
        depth: usize,
    ) -> StorageResult<()> {
        while stack
            .last()
            .is_some_and(|top| bound.map_or(true, |b| top.as_str() < b))
        {
            if let Some(pending) = stack.pop() {
                self.visit_prefix(pending, depth)?;
            }
        }
        Ok(())
    }

    /// Walk one directory level.
    fn scan_dir(&mut self, current: &str, depth: usize) -> StorageResult<()> {
        let forward = forward_segment(&self.opts.forward_to, current).to_string();

        let mut entries = match self.list_dir(current, depth == 0)? {
            Some(entries) if !entries.is_empty() => entries,
            _ => return Ok(()),
        };

        // Filter in place; dropped entries become empty strings
        let mut dir_objects = HashSet::new();
        for entry in entries.iter_mut() {
            if !self.prefix.is_empty() && !entry.starts_with(self.prefix.as_str()) {
                entry.clear();
                continue;
            }
            if !forward.is_empty() && entry.as_str() < forward.as_str() {
                entry.clear();
                continue;
            }
            if is_dir_object_entry(entry) {
                // Sort by the object name, not the on-disk name
                let name = decode_dir_object(&entry[..entry.len() - 1]);
                if name == SLASH_SEPARATOR {
                    entry.clear();
                    continue;
                }
                dir_objects.insert(name.clone());
                *entry = name;
                continue;
            }
            if entry.ends_with(SLASH_SEPARATOR) {
                entry.pop();
                continue;
            }

            let file = std::mem::take(entry);
            if depth == 0 && !self.opts.base_dir.is_empty() {
                if let Some(name) = self.root_object(current, &file)? {
                    return self.emit(name, false);
                }
            }
        }

        self.prefix.clear();
        entries.sort_unstable();

        if !forward.is_empty() {
            // Compare in listed shape: directories carry a trailing slash
            entries.retain(|e| {
                if e.is_empty() || e.ends_with(SLASH_SEPARATOR) {
                    return e.as_str() >= forward.as_str();
                }
                format!("{}{}", e, SLASH_SEPARATOR) >= forward
            });
        }

        let mut stack: Vec<String> = Vec::with_capacity(5);
        for entry in entries {
            if entry.is_empty() {
                continue;
            }
            self.check_cancel()?;

            let name = path_join(&[current, entry.as_str()]);
            self.drain_stack(&mut stack, Some(&name), depth)?;

            let is_dir_object = dir_objects.contains(&entry);
            let probe_name = if is_dir_object {
                encode_dir_object(&name)
            } else {
                name.clone()
            };

            match self.probe(&probe_name)? {
                Probe::Object => self.emit(name, false)?,
                Probe::Missing if is_dir_object => {
                    debug!("Dropping directory object {} without metadata", probe_name);
                }
                Probe::Missing => {
                    self.check_cancel()?;
                    if !is_dir_empty(&self.volume.join(&name)) {
                        stack.push(format!("{}{}", name, SLASH_SEPARATOR));
                    }
                }
                Probe::Failed => {}
            }
        }

        self.drain_stack(&mut stack, None, depth)
    }
}

/// Next path segment of `forward_to` below `current`, or "" when the resume
/// point is not inside `current`.
fn forward_segment<'f>(forward_to: &'f str, current: &str) -> &'f str {
    if forward_to.is_empty() {
        return "";
    }
    let Some(rest) = forward_to.strip_prefix(current) else {
        return "";
    };
    let rest = if current.is_empty() || current.ends_with('/') {
        rest
    } else {
        match rest.strip_prefix('/') {
            Some(rest) => rest,
            None => return "",
        }
    };
    match rest.find('/') {
        Some(idx) => &rest[..idx],
        None => rest,
    }
}
