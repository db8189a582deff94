//! Volume resolution and path checks

use crate::error::{StorageError, StorageResult};
use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Longest single path segment on unix filesystems (NAME_MAX)
const MAX_SEGMENT_LEN: usize = 255;

/// An existing, readable and searchable bucket directory on one disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDir {
    path: PathBuf,
}

impl VolumeDir {
    /// Map `(disk_root, bucket)` to its directory and check access.
    ///
    /// A missing or non-directory volume is `VolumeNotFound`; EACCES is
    /// `AccessDenied`; EIO is `FaultyDisk`.
    pub fn resolve(disk_root: &Path, bucket: &str) -> StorageResult<Self> {
        let path = disk_root.join(bucket);
        check_access(&path).map_err(volume_error)?;

        let md = std::fs::metadata(&path).map_err(volume_error)?;
        if !md.is_dir() {
            return Err(StorageError::VolumeNotFound);
        }

        Ok(Self { path })
    }

    /// Re-check access after a listing under this volume failed.
    pub fn recheck(&self) -> StorageResult<()> {
        check_access(&self.path).map_err(volume_error)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absolute path of a name inside the volume
    pub fn join(&self, name: &str) -> PathBuf {
        if name.is_empty() {
            self.path.clone()
        } else {
            self.path.join(name)
        }
    }
}

fn volume_error(err: io::Error) -> StorageError {
    match StorageError::classify(err) {
        StorageError::FileNotFound => StorageError::VolumeNotFound,
        other => other,
    }
}

/// `access(2)` with read + search permission
fn check_access(path: &Path) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))?;

    // SAFETY: c_path is a valid NUL terminated string for the call duration
    let ret = unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::X_OK) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Reject paths the filesystem would refuse or that escape the volume.
pub fn check_path_length(path: &Path) -> Result<(), &'static str> {
    let bytes = path.as_os_str().as_bytes();

    if cfg!(target_os = "macos") && bytes.len() > 1016 {
        return Err("file name too long");
    }

    if bytes == b"." || bytes == b".." || bytes == b"/" {
        return Err("access denied");
    }

    if bytes.len() <= MAX_SEGMENT_LEN {
        return Ok(());
    }

    if bytes
        .split(|&b| b == b'/')
        .any(|segment| segment.len() > MAX_SEGMENT_LEN)
    {
        return Err("file name too long");
    }
    Ok(())
}

/// Join object path elements, keeping a trailing `/` on the last one.
///
/// Empty elements are ignored.
pub fn path_join(elems: &[&str]) -> String {
    let mut out = String::new();
    for elem in elems.iter().filter(|e| !e.is_empty()) {
        if !out.is_empty() && !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(elem.strip_prefix('/').filter(|_| !out.is_empty()).unwrap_or(elem));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_existing_volume() {
        let disk = tempdir().unwrap();
        fs::create_dir(disk.path().join("bucket")).unwrap();

        let vol = VolumeDir::resolve(disk.path(), "bucket").unwrap();
        assert_eq!(vol.path(), disk.path().join("bucket"));
        assert_eq!(vol.join(""), disk.path().join("bucket"));
        assert_eq!(vol.join("a/b"), disk.path().join("bucket/a/b"));
        assert!(vol.recheck().is_ok());
    }

    #[test]
    fn test_resolve_missing_volume() {
        let disk = tempdir().unwrap();
        assert!(matches!(
            VolumeDir::resolve(disk.path(), "nope"),
            Err(StorageError::VolumeNotFound)
        ));
    }

    #[test]
    fn test_resolve_file_is_not_volume() {
        let disk = tempdir().unwrap();
        fs::write(disk.path().join("bucket"), b"x").unwrap();
        assert!(matches!(
            VolumeDir::resolve(disk.path(), "bucket"),
            Err(StorageError::VolumeNotFound)
        ));
    }

    #[test]
    fn test_recheck_after_removal() {
        let disk = tempdir().unwrap();
        fs::create_dir(disk.path().join("bucket")).unwrap();
        let vol = VolumeDir::resolve(disk.path(), "bucket").unwrap();
        fs::remove_dir(disk.path().join("bucket")).unwrap();
        assert!(matches!(vol.recheck(), Err(StorageError::VolumeNotFound)));
    }

    #[test]
    fn test_check_path_length() {
        assert!(check_path_length(Path::new("/disk/bucket/obj/xl.meta")).is_ok());
        assert!(check_path_length(Path::new(".")).is_err());
        assert!(check_path_length(Path::new("/")).is_err());

        let long_segment = "a".repeat(256);
        let path = format!("/disk/{}/xl.meta", long_segment);
        assert_eq!(check_path_length(Path::new(&path)), Err("file name too long"));

        let many_segments = vec!["abcdefgh"; 64].join("/");
        assert!(check_path_length(Path::new(&many_segments)).is_ok());
    }

    #[test]
    fn test_path_join() {
        assert_eq!(path_join(&["", "a"]), "a");
        assert_eq!(path_join(&["a/", "b"]), "a/b");
        assert_eq!(path_join(&["a", "b/"]), "a/b/");
        assert_eq!(path_join(&["a/", "b/"]), "a/b/");
        assert_eq!(path_join(&["a", "/b"]), "a/b");
        assert_eq!(path_join(&["/a", "b"]), "/a/b");
    }
}
