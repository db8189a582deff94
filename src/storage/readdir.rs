//! Low-level directory reader
//!
//! Lists one directory level as plain names, directories marked with a
//! trailing `/` so callers can classify by suffix instead of re-stating.
//!
//! On Linux the directory is read with raw `getdents64` calls into a pooled
//! 1 MiB record buffer, and names are built in a pooled scratch buffer, so
//! listing a directory costs one allocation per returned name and nothing
//! else. Other unix targets go through `std::fs::read_dir` with the same
//! output contract.

use crate::error::{StorageError, StorageResult};
use crate::storage::types::EntryType;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Options for a directory read
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadDirOpts {
    /// Maximum number of entries to return (None = all)
    pub count: Option<usize>,

    /// Return symlinked directories as directories.
    /// Off by default: following them can walk into another mount or loop.
    pub follow_dir_symlink: bool,
}

/// Return all entries of `dir_path`
pub fn read_dir(dir_path: &Path) -> StorageResult<Vec<String>> {
    read_dir_with_opts(dir_path, ReadDirOpts::default())
}

/// Return up to `count` entries of `dir_path`
pub fn read_dir_n(dir_path: &Path, count: usize) -> StorageResult<Vec<String>> {
    read_dir_with_opts(
        dir_path,
        ReadDirOpts {
            count: Some(count),
            ..Default::default()
        },
    )
}

/// Check whether a directory has no entries.
///
/// Errors count as "not empty" so a directory that cannot be read is still
/// handed to the caller rather than silently dropped.
pub fn is_dir_empty(dir_path: &Path) -> bool {
    match read_dir_n(dir_path, 1) {
        Ok(entries) => entries.is_empty(),
        Err(StorageError::FileNotFound) => false,
        Err(e) => {
            debug!("is_dir_empty {}: {}", dir_path.display(), e);
            false
        }
    }
}

/// Entry disappeared or loops between listing and stat
fn is_vanished(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound || err.raw_os_error() == Some(libc::ELOOP)
}

/// Resolve the real type of an entry the listing could not classify.
///
/// Untyped entries get an `lstat`; symlinks are then resolved with a
/// `stat` and only kept as directories when `follow_dir_symlink` is set.
/// Returns `Ok(None)` when the entry should be skipped.
fn stat_entry_type(
    dir_path: &Path,
    name: &[u8],
    listed: EntryType,
    follow_dir_symlink: bool,
) -> StorageResult<Option<EntryType>> {
    use std::os::unix::ffi::OsStrExt;

    let full = dir_path.join(std::ffi::OsStr::from_bytes(name));
    if listed != EntryType::Symlink {
        match fs::symlink_metadata(&full) {
            Ok(md) if md.file_type().is_symlink() => {}
            Ok(md) => return Ok(Some(EntryType::from_file_type(md.file_type()))),
            // Deleted in the meantime
            Err(e) if is_vanished(&e) => return Ok(None),
            Err(e) => return Err(StorageError::classify(e)),
        }
    }

    match fs::metadata(&full) {
        Ok(md) if md.is_dir() && !follow_dir_symlink => Ok(None),
        Ok(md) => Ok(Some(EntryType::from_file_type(md.file_type()))),
        // Dangling link or a symlink loop
        Err(e) if is_vanished(&e) => Ok(None),
        Err(e) => Err(StorageError::classify(e)),
    }
}

/// Build the listed name in `scratch`, appending `/` for directories.
fn entry_name(scratch: &mut Vec<u8>, name: &[u8], is_dir: bool) -> Option<String> {
    scratch.clear();
    scratch.extend_from_slice(name);
    if is_dir {
        scratch.push(b'/');
    }
    std::str::from_utf8(scratch).ok().map(str::to_owned)
}

/// Apply type resolution and naming to one raw entry.
fn listed_name(
    dir_path: &Path,
    scratch: &mut Vec<u8>,
    name: &[u8],
    entry_type: EntryType,
    opts: &ReadDirOpts,
) -> StorageResult<Option<String>> {
    if name.is_empty() {
        return Ok(None);
    }

    let entry_type = if entry_type.needs_stat() {
        match stat_entry_type(dir_path, name, entry_type, opts.follow_dir_symlink)? {
            Some(t) => t,
            None => return Ok(None),
        }
    } else {
        entry_type
    };

    // Only files and directories make up an object layout
    let is_dir = if entry_type.is_dir() {
        true
    } else if entry_type.is_file() {
        false
    } else {
        return Ok(None);
    };

    let listed = entry_name(scratch, name, is_dir);
    if listed.is_none() {
        debug!(
            "skipping non UTF-8 entry {:?} in {}",
            String::from_utf8_lossy(name),
            dir_path.display()
        );
    }
    Ok(listed)
}

#[cfg(target_os = "linux")]
mod imp {
    use super::*;
    use crate::storage::dirent::DirentDecoder;
    use crate::storage::pool::{DIRENT_NAME_POOL, DIRENT_POOL};
    use std::fs::{File, OpenOptions};
    use std::os::unix::fs::OpenOptionsExt;
    use std::os::unix::io::AsRawFd;

    fn open_dir(dir_path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_DIRECTORY | libc::O_CLOEXEC)
            .open(dir_path)
    }

    /// Fill `buf` with the next batch of records; 0 means end of directory
    fn getdents(dir: &File, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            // SAFETY: `buf` is valid for writes of `buf.len()` bytes for the
            // whole call and the fd stays open while `dir` is borrowed.
            let ret = unsafe {
                libc::syscall(
                    libc::SYS_getdents64,
                    dir.as_raw_fd(),
                    buf.as_mut_ptr(),
                    buf.len(),
                )
            };
            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            return Ok(ret as usize);
        }
    }

    pub(super) fn read_dir_with_opts(
        dir_path: &Path,
        opts: ReadDirOpts,
    ) -> StorageResult<Vec<String>> {
        // ENOTDIR here means the path was replaced by a file concurrently
        let dir = open_dir(dir_path).map_err(StorageError::classify)?;

        let mut buf = DIRENT_POOL.get();
        let mut scratch = DIRENT_NAME_POOL.get();

        let mut entries = Vec::new();
        let mut remaining = opts.count;

        'batches: while remaining != Some(0) {
            let nbuf = getdents(&dir, buf.as_mut_slice()).map_err(StorageError::classify)?;
            if nbuf == 0 {
                break;
            }

            for record in DirentDecoder::new(&buf[..nbuf]) {
                let dirent = record.map_err(|e| {
                    StorageError::Unknown(io::Error::new(io::ErrorKind::InvalidData, e))
                })?;

                let name =
                    listed_name(dir_path, &mut scratch, dirent.name, dirent.entry_type, &opts)?;
                if let Some(name) = name {
                    entries.push(name);
                    if let Some(r) = remaining.as_mut() {
                        *r -= 1;
                        if *r == 0 {
                            break 'batches;
                        }
                    }
                }
            }
        }

        Ok(entries)
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use super::*;
    use crate::storage::pool::DIRENT_NAME_POOL;
    use std::os::unix::ffi::OsStrExt;

    pub(super) fn read_dir_with_opts(
        dir_path: &Path,
        opts: ReadDirOpts,
    ) -> StorageResult<Vec<String>> {
        let iter = fs::read_dir(dir_path).map_err(StorageError::classify)?;
        let mut scratch = DIRENT_NAME_POOL.get();
        let mut entries = Vec::new();

        for entry in iter {
            if opts.count.is_some_and(|c| entries.len() >= c) {
                break;
            }
            let entry = match entry {
                Ok(e) => e,
                Err(e) if is_vanished(&e) => continue,
                Err(e) => return Err(StorageError::classify(e)),
            };
            let entry_type = match entry.file_type() {
                Ok(ft) => EntryType::from_file_type(ft),
                Err(_) => EntryType::Unknown,
            };
            let raw = entry.file_name();
            if let Some(name) =
                listed_name(dir_path, &mut scratch, raw.as_bytes(), entry_type, &opts)?
            {
                entries.push(name);
            }
        }

        Ok(entries)
    }
}

/// Return entries of `dir_path` according to `opts`
pub fn read_dir_with_opts(dir_path: &Path, opts: ReadDirOpts) -> StorageResult<Vec<String>> {
    imp::read_dir_with_opts(dir_path, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[test]
    fn test_read_dir_marks_directories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("file.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let entries = sorted(read_dir(dir.path()).unwrap());
        assert_eq!(entries, vec!["file.txt".to_string(), "sub/".to_string()]);
    }

    #[test]
    fn test_read_dir_empty() {
        let dir = tempdir().unwrap();
        assert!(read_dir(dir.path()).unwrap().is_empty());
        assert!(is_dir_empty(dir.path()));
    }

    #[test]
    fn test_read_dir_n_bounds_result() {
        let dir = tempdir().unwrap();
        for i in 0..10 {
            fs::create_dir(dir.path().join(format!("d{}", i))).unwrap();
        }

        assert_eq!(read_dir_n(dir.path(), 1).unwrap().len(), 1);
        assert_eq!(read_dir_n(dir.path(), 4).unwrap().len(), 4);
        assert_eq!(read_dir(dir.path()).unwrap().len(), 10);
        assert!(!is_dir_empty(dir.path()));
    }

    #[test]
    fn test_read_dir_many_entries() {
        let dir = tempdir().unwrap();
        for i in 0..2000 {
            fs::write(dir.path().join(format!("object-{:05}", i)), b"").unwrap();
        }
        let entries = read_dir(dir.path()).unwrap();
        assert_eq!(entries.len(), 2000);
    }

    #[test]
    fn test_read_dir_missing_and_not_dir() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(read_dir(&missing), Err(StorageError::FileNotFound)));

        let file = dir.path().join("plain");
        fs::write(&file, b"data").unwrap();
        assert!(matches!(read_dir(&file), Err(StorageError::FileNotFound)));
        assert!(!is_dir_empty(&file));
    }

    #[test]
    fn test_symlinks() {
        let dir = tempdir().unwrap();
        let target_dir = dir.path().join("real");
        fs::create_dir(&target_dir).unwrap();
        fs::write(dir.path().join("data"), b"x").unwrap();

        let listing = dir.path().join("listing");
        fs::create_dir(&listing).unwrap();
        symlink(&target_dir, listing.join("dirlink")).unwrap();
        symlink(dir.path().join("data"), listing.join("filelink")).unwrap();
        symlink(dir.path().join("nowhere"), listing.join("dangling")).unwrap();

        let entries = sorted(read_dir(&listing).unwrap());
        assert_eq!(entries, vec!["filelink".to_string()]);

        let opts = ReadDirOpts {
            count: None,
            follow_dir_symlink: true,
        };
        let entries = sorted(read_dir_with_opts(&listing, opts).unwrap());
        assert_eq!(entries, vec!["dirlink/".to_string(), "filelink".to_string()]);
    }

    #[test]
    fn test_untyped_entries_are_stated() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("xl.meta"), b"x").unwrap();
        fs::write(dir.path().join("pipe-stand-in"), b"").unwrap();
        symlink(dir.path().join("sub"), dir.path().join("dirlink")).unwrap();

        let opts = ReadDirOpts::default();
        let mut scratch = Vec::new();
        let mut resolve = |name: &[u8], entry_type: EntryType| {
            listed_name(dir.path(), &mut scratch, name, entry_type, &opts).unwrap()
        };

        assert_eq!(resolve(b"sub", EntryType::Unknown).as_deref(), Some("sub/"));
        assert_eq!(resolve(b"xl.meta", EntryType::Unknown).as_deref(), Some("xl.meta"));
        // Removed between the listing and the stat
        assert_eq!(resolve(b"vanished", EntryType::Unknown), None);
        // Untyped symlink to a directory is not followed by default
        assert_eq!(resolve(b"dirlink", EntryType::Unknown), None);
        // Unsupported type codes are re-checked rather than trusted
        assert_eq!(
            resolve(b"pipe-stand-in", EntryType::Other).as_deref(),
            Some("pipe-stand-in")
        );
        assert_eq!(resolve(b"", EntryType::File), None);
    }

    #[test]
    fn test_untyped_symlink_followed_on_request() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        symlink(dir.path().join("sub"), dir.path().join("dirlink")).unwrap();

        let opts = ReadDirOpts {
            count: None,
            follow_dir_symlink: true,
        };
        let mut scratch = Vec::new();
        let name = listed_name(dir.path(), &mut scratch, b"dirlink", EntryType::Unknown, &opts)
            .unwrap();
        assert_eq!(name.as_deref(), Some("dirlink/"));
    }

    #[test]
    fn test_entry_name_scratch() {
        let mut scratch = Vec::with_capacity(8);
        assert_eq!(entry_name(&mut scratch, b"abc", true).as_deref(), Some("abc/"));
        assert_eq!(entry_name(&mut scratch, b"de", false).as_deref(), Some("de"));
        assert_eq!(entry_name(&mut scratch, &[0xff, 0xfe], false), None);
    }
}
