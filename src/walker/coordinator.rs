//! Walk coordinator - runs one walker per volume
//!
//! The coordinator is responsible for:
//! - Spawning a named thread per volume
//! - Sharing one shutdown flag between them
//! - Collecting per-volume outcomes and combined statistics
//!
//! Names flow from every walker into a single bounded channel; the caller
//! drains it while the walk runs. With more than one volume each name is
//! tagged with its volume so interleaved output stays attributable.

use crate::config::{VolumeTarget, WalkConfig};
use crate::error::{Result, StorageError, StorageResult, WalkerError};
use crate::storage::pool::log_pool_stats;
use crate::walker::options::WalkStats;
use crate::walker::sink::FnSink;
use crate::walker::walk_dir::DiskWalker;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of one volume's walk
#[derive(Debug)]
pub struct VolumeResult {
    /// Volume label (`<disk>/<bucket>`)
    pub volume: String,

    pub outcome: StorageResult<WalkStats>,
}

/// Result of a multi-volume walk
#[derive(Debug)]
pub struct WalkResult {
    /// Per-volume outcomes, in argument order
    pub volumes: Vec<VolumeResult>,

    /// Statistics summed over the volumes that finished
    pub stats: WalkStats,

    /// Time taken for the whole walk
    pub duration: Duration,

    /// Every volume finished and nothing was cancelled
    pub completed: bool,
}

impl WalkResult {
    /// Volumes that ended with an error other than cancellation
    pub fn failures(&self) -> impl Iterator<Item = (&str, &StorageError)> {
        self.volumes.iter().filter_map(|v| match &v.outcome {
            Err(StorageError::Cancelled) | Ok(_) => None,
            Err(e) => Some((v.volume.as_str(), e)),
        })
    }
}

/// Coordinates the per-volume walks
pub struct WalkCoordinator {
    config: Arc<WalkConfig>,

    /// Shutdown signal shared with every walker
    shutdown: Arc<AtomicBool>,

    /// Walker threads, in volume order
    handles: Vec<(String, JoinHandle<StorageResult<WalkStats>>)>,

    start_time: Option<Instant>,
}

impl WalkCoordinator {
    pub fn new(config: WalkConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
            start_time: None,
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn one walker per volume sending into `out`.
    ///
    /// `out` is dropped once every walker holds its own clone, so the
    /// receiving side sees the channel close when the last walker ends.
    pub fn start(&mut self, out: Sender<String>) -> Result<()> {
        self.start_time = Some(Instant::now());
        let tag = self.config.volumes.len() > 1;

        info!(
            volumes = self.config.volumes.len(),
            recursive = self.config.recursive,
            "Starting volume walk"
        );

        for (id, volume) in self.config.volumes.iter().enumerate() {
            let label = volume.display_name();
            let handle = self.spawn_walker(id, volume.clone(), label.clone(), tag, out.clone())?;
            self.handles.push((label, handle));
        }

        Ok(())
    }

    fn spawn_walker(
        &self,
        id: usize,
        volume: VolumeTarget,
        label: String,
        tag: bool,
        out: Sender<String>,
    ) -> Result<JoinHandle<StorageResult<WalkStats>>> {
        let config = Arc::clone(&self.config);
        let shutdown = Arc::clone(&self.shutdown);

        let handle = thread::Builder::new()
            .name(format!("walker-{}", id))
            .spawn(move || {
                let walker = DiskWalker::new(&volume.disk_root)
                    .follow_dir_symlink(config.follow_symlinks)
                    .with_shutdown(shutdown);
                let opts = config.to_walk_options(&volume.bucket);
                debug!("Walker {} scanning {}", id, label);

                if tag {
                    let mut sink =
                        FnSink(|name: String| out.send(format!("{}: {}", label, name)).is_ok());
                    walker.walk_dir(&opts, &mut sink)
                } else {
                    let mut sink = out;
                    walker.walk_dir(&opts, &mut sink)
                }
            })?;

        Ok(handle)
    }

    /// Wait for every walker and collect the results
    pub fn join(mut self) -> Result<WalkResult> {
        let mut stats = WalkStats {
            completed: true,
            ..Default::default()
        };
        let mut volumes = Vec::with_capacity(self.handles.len());

        for (label, handle) in std::mem::take(&mut self.handles) {
            let outcome = handle
                .join()
                .map_err(|_| WalkerError::ThreadPanicked(label.clone()))?;

            match &outcome {
                Ok(s) => stats.merge(s),
                Err(StorageError::Cancelled) => stats.completed = false,
                Err(e) => {
                    warn!(volume = %label, error = %e, "Volume walk failed");
                    stats.completed = false;
                }
            }
            volumes.push(VolumeResult {
                volume: label,
                outcome,
            });
        }

        let duration = self.start_time.map(|t| t.elapsed()).unwrap_or_default();
        let completed = stats.completed && !self.shutdown.load(Ordering::Relaxed);
        // Volumes ran concurrently: rates are per wall-clock second
        stats.duration = duration;
        log_pool_stats();

        info!(
            objects = stats.objects,
            prefixes = stats.prefixes,
            skipped = stats.skipped,
            duration_secs = duration.as_secs(),
            "Walk finished"
        );

        Ok(WalkResult {
            volumes,
            stats,
            duration,
            completed,
        })
    }
}
