//! Metadata probe
//!
//! Deciding whether a directory is an object only needs the head of its
//! metadata file, so the probe reads at most 4 KiB up front. Callers that
//! do need more call `PartialMetadata::read_more` with the length they
//! expect, which reads exactly the missing bytes from the still-open file.

use crate::error::{ProbeError, ProbeResult};
use crate::storage::block_reader::open_no_atime;
use crate::storage::pool::{Pooled, METADATA_POOL, METADATA_READ_DEFAULT};
use crate::storage::volume::check_path_length;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Head of a metadata file, possibly truncated
pub struct PartialMetadata {
    file: File,
    buf: Pooled<'static, Vec<u8>>,
    size: u64,
    has_full: bool,
}

impl std::fmt::Debug for PartialMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartialMetadata")
            .field("buffered", &self.buf.len())
            .field("size", &self.size)
            .field("has_full", &self.has_full)
            .finish()
    }
}

impl PartialMetadata {
    /// Bytes read so far
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Make sure at least `n` bytes are buffered.
    ///
    /// No-op if they already are. Fails with `UnexpectedEof` if the whole
    /// file is already buffered, `n` is beyond the file size, or the file
    /// ends before `n` bytes.
    pub fn read_more(&mut self, n: u64) -> io::Result<()> {
        let has = self.buf.len() as u64;
        if has >= n {
            return Ok(());
        }
        if self.has_full || n > self.size {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }

        let start = self.buf.len();
        self.buf.resize(n as usize, 0);
        if let Err(e) = self.file.read_exact(&mut self.buf[start..]) {
            self.buf.truncate(start);
            return Err(e);
        }
        if n == self.size {
            self.has_full = true;
        }
        Ok(())
    }
}

/// Read the head of the metadata file at `path`.
///
/// Errors are reported as `ProbeError` so the caller can branch on
/// not-found, is-a-directory and not-a-directory.
pub fn read_metadata(path: &Path) -> ProbeResult<PartialMetadata> {
    check_path_length(path).map_err(ProbeError::InvalidPath)?;

    let file = open_no_atime(path)?;
    let md = file.metadata()?;
    if md.is_dir() {
        return Err(ProbeError::IsDirectory);
    }

    read_metadata_no_data(file, md.len())
}

/// Load the metadata head, skipping object data that may follow it.
///
/// The format is not checked here; the head is enough to prove the object
/// exists.
fn read_metadata_no_data(mut file: File, size: u64) -> ProbeResult<PartialMetadata> {
    let (initial, has_full) = if size > METADATA_READ_DEFAULT as u64 {
        (METADATA_READ_DEFAULT, false)
    } else {
        (size as usize, true)
    };

    let mut buf = METADATA_POOL.get();
    buf.resize(initial, 0);
    file.read_exact(&mut buf[..])?;

    Ok(PartialMetadata {
        file,
        buf,
        size,
        has_full,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use tempfile::tempdir;

    fn xl2_blob(len: usize) -> Vec<u8> {
        let mut blob = Vec::with_capacity(len);
        blob.extend_from_slice(b"XL2 ");
        blob.extend_from_slice(&1u16.to_le_bytes());
        blob.extend_from_slice(&3u16.to_le_bytes());
        while blob.len() < len {
            blob.push((blob.len() % 199) as u8);
        }
        blob
    }

    #[test]
    fn test_small_file_read_whole() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("xl.meta");
        fs::write(&path, xl2_blob(100)).unwrap();

        let mut meta = read_metadata(&path).unwrap();
        assert_eq!(meta.bytes(), &xl2_blob(100)[..]);
        meta.read_more(100).unwrap();
    }

    #[test]
    fn test_large_file_truncated_then_extended() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("xl.meta");
        let blob = xl2_blob(10_000);
        fs::write(&path, &blob).unwrap();

        let mut meta = read_metadata(&path).unwrap();
        assert_eq!(meta.bytes().len(), METADATA_READ_DEFAULT);

        // Already buffered
        meta.read_more(100).unwrap();
        assert_eq!(meta.bytes().len(), METADATA_READ_DEFAULT);

        meta.read_more(5_000).unwrap();
        assert_eq!(meta.bytes(), &blob[..5_000]);

        let err = meta.read_more(20_000).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        meta.read_more(10_000).unwrap();
        assert_eq!(meta.bytes(), &blob[..]);
        let err = meta.read_more(10_001).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_read_more_on_full_buffer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("xl.meta");
        fs::write(&path, xl2_blob(50)).unwrap();

        let mut meta = read_metadata(&path).unwrap();
        let err = meta.read_more(51).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_read_more_after_file_shrinks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("xl.meta");
        fs::write(&path, xl2_blob(10_000)).unwrap();

        let mut meta = read_metadata(&path).unwrap();
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(5_000)
            .unwrap();

        let err = meta.read_more(8_000).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(meta.bytes().len(), METADATA_READ_DEFAULT);
    }

    #[test]
    fn test_unknown_format_reads_only_head() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("xl.meta");
        let file = fs::File::create(&path).unwrap();
        (&file).write_all(b"{\"version\":\"1.0.1\"}").unwrap();
        // Sparse: large on paper, cheap on disk
        file.set_len(64 << 20).unwrap();
        drop(file);

        let meta = read_metadata(&path).unwrap();
        assert_eq!(meta.bytes().len(), METADATA_READ_DEFAULT);
        assert!(meta.bytes().starts_with(b"{\"version\""));
    }

    #[test]
    fn test_grown_buffer_not_kept_by_pool() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("xl.meta");
        let file = fs::File::create(&path).unwrap();
        file.set_len(8 << 20).unwrap();
        drop(file);

        let mut meta = read_metadata(&path).unwrap();
        meta.read_more(4 << 20).unwrap();
        assert_eq!(meta.bytes().len(), 4 << 20);
        drop(meta);

        // Every idle buffer was shrunk on return
        let checked_out: Vec<_> = (0..METADATA_POOL.idle() + 1)
            .map(|_| METADATA_POOL.get())
            .collect();
        for buf in &checked_out {
            assert!(buf.is_empty());
            assert!(buf.capacity() < 1 << 20, "capacity {}", buf.capacity());
        }
    }

    #[test]
    fn test_probe_errors() {
        let dir = tempdir().unwrap();

        let missing = dir.path().join("obj").join("xl.meta");
        assert!(matches!(read_metadata(&missing), Err(ProbeError::NotFound)));

        let as_dir = dir.path().join("dirobj").join("xl.meta");
        fs::create_dir_all(&as_dir).unwrap();
        assert!(matches!(read_metadata(&as_dir), Err(ProbeError::IsDirectory)));

        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            read_metadata(&file.join("xl.meta")),
            Err(ProbeError::NotDirectory)
        ));
    }
}
