//! Block reader over direct I/O
//!
//! Reads whole files through a pooled, aligned block. The file is opened
//! with `O_DIRECT` where the platform has it so scanning does not churn the
//! page cache. Filesystems that reject direct I/O (EINVAL on open or on
//! read) are handled by dropping the flag and retrying once.

use crate::storage::pool::{AlignedBlock, Pooled, DIRECT_POOL_LARGE, DIRECT_POOL_SMALL};
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use tracing::trace;

#[cfg(target_os = "linux")]
const O_DIRECT: libc::c_int = libc::O_DIRECT;
#[cfg(not(target_os = "linux"))]
const O_DIRECT: libc::c_int = 0;

#[cfg(target_os = "linux")]
const O_NOATIME: libc::c_int = libc::O_NOATIME;
#[cfg(not(target_os = "linux"))]
const O_NOATIME: libc::c_int = 0;

/// Open read-only without updating atime.
///
/// O_NOATIME is refused with EPERM for files the caller does not own; the
/// open is retried without it in that case.
pub fn open_no_atime(path: &Path) -> io::Result<File> {
    open_with_flags(path, O_NOATIME)
}

fn open_with_flags(path: &Path, flags: libc::c_int) -> io::Result<File> {
    let open = |flags: libc::c_int| {
        OpenOptions::new()
            .read(true)
            .custom_flags(flags | libc::O_CLOEXEC)
            .open(path)
    };

    let drops_noatime = O_NOATIME != 0 && flags & O_NOATIME != 0;
    match open(flags) {
        Err(e) if drops_noatime && e.raw_os_error() == Some(libc::EPERM) => {
            open(flags & !O_NOATIME)
        }
        other => other,
    }
}

/// Clear O_DIRECT on an open descriptor
#[cfg(target_os = "linux")]
fn disable_direct_io(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    // SAFETY: fcntl on a descriptor owned by `file`, which outlives the calls
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_DIRECT) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn disable_direct_io(_file: &File) -> io::Result<()> {
    Ok(())
}

/// Reader that fills a pooled aligned block and serves reads from it
pub struct BlockReader {
    file: Option<File>,
    block: Option<Pooled<'static, AlignedBlock>>,
    /// Use the small block pool
    small: bool,
    /// O_DIRECT currently set on the descriptor
    direct: bool,
    pos: usize,
    filled: usize,
    eof: bool,
}

impl BlockReader {
    /// Open `path` for block reads.
    ///
    /// `small` selects 128 KiB blocks instead of 2 MiB ones.
    pub fn open(path: &Path, small: bool) -> io::Result<Self> {
        let (file, direct) = if O_DIRECT != 0 {
            match open_with_flags(path, O_DIRECT | O_NOATIME) {
                Ok(f) => (f, true),
                Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
                    trace!("O_DIRECT refused for {}, using buffered reads", path.display());
                    (open_no_atime(path)?, false)
                }
                Err(e) => return Err(e),
            }
        } else {
            (open_no_atime(path)?, false)
        };

        Ok(Self {
            file: Some(file),
            block: None,
            small,
            direct,
            pos: 0,
            filled: 0,
            eof: false,
        })
    }

    /// Metadata of the open descriptor
    pub fn metadata(&self) -> io::Result<std::fs::Metadata> {
        match &self.file {
            Some(f) => f.metadata(),
            None => Err(closed_error()),
        }
    }

    /// Return the block to its pool and close the file.
    /// Further reads fail.
    pub fn close(&mut self) {
        self.block = None;
        self.file = None;
    }

    fn fill(&mut self) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(closed_error)?;
        let small = self.small;
        let block = self.block.get_or_insert_with(|| {
            if small {
                DIRECT_POOL_SMALL.get()
            } else {
                DIRECT_POOL_LARGE.get()
            }
        });

        if self.direct && !block.is_aligned() {
            trace!("unaligned block, using buffered reads");
            disable_direct_io(file)?;
            self.direct = false;
        }

        let n = match file.read(block.as_mut_slice()) {
            Ok(n) => n,
            Err(e) if self.direct && e.raw_os_error() == Some(libc::EINVAL) => {
                // Alignment rejected by the filesystem; fall back to buffered reads
                disable_direct_io(file)?;
                self.direct = false;
                file.read(block.as_mut_slice())?
            }
            Err(e) => return Err(e),
        };

        self.pos = 0;
        self.filled = n;
        if n == 0 {
            self.eof = true;
        }
        Ok(())
    }
}

impl Read for BlockReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.file.is_none() {
            return Err(closed_error());
        }
        if out.is_empty() {
            return Ok(0);
        }
        if self.pos == self.filled {
            if self.eof {
                return Ok(0);
            }
            self.fill()?;
            if self.eof {
                return Ok(0);
            }
        }

        let block = match &self.block {
            Some(b) => b,
            None => return Ok(0),
        };
        let available = &block.as_slice()[self.pos..self.filled];
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "block reader used after close")
}

/// Read a whole file through a small-block reader
pub fn read_file(path: &Path) -> io::Result<Vec<u8>> {
    let mut reader = BlockReader::open(path, true)?;

    let data = match reader.metadata() {
        Ok(md) if md.is_dir() => return Err(io::Error::from_raw_os_error(libc::EISDIR)),
        Ok(md) => {
            let mut dst = vec![0u8; md.len() as usize];
            reader.read_exact(&mut dst)?;
            dst
        }
        Err(_) => {
            let mut dst = Vec::new();
            reader.read_to_end(&mut dst)?;
            dst
        }
    };

    reader.close();
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_read_small_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("xl.json");
        fs::write(&path, b"{\"version\":\"1.0.1\"}").unwrap();

        let data = read_file(&path).unwrap();
        assert_eq!(data, b"{\"version\":\"1.0.1\"}");
    }

    #[test]
    fn test_read_spans_blocks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big");
        let content: Vec<u8> = (0..300 * 1024).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &content).unwrap();

        let data = read_file(&path).unwrap();
        assert_eq!(data.len(), content.len());
        assert_eq!(data, content);
    }

    #[test]
    fn test_read_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();
        assert!(read_file(&path).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = read_file(&dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_read_after_close_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"abc").unwrap();

        let mut reader = BlockReader::open(&path, true).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        reader.close();
        assert!(reader.read(&mut buf).is_err());
    }

    #[test]
    fn test_read_directory_reports_is_dir() {
        let dir = tempdir().unwrap();
        let err = read_file(dir.path()).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EISDIR));
    }
}
