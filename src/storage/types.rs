//! Entry types and on-disk layout constants
//!
//! An object lives in a directory named after its last path segment and
//! is marked by a metadata file inside it. Directory objects (objects
//! whose name ends in `/`) are stored under a suffixed directory name so
//! they never collide with a real prefix directory.

use std::fs::FileType;

/// Path separator used in object names
pub const SLASH_SEPARATOR: &str = "/";

/// Suffix marking a directory object on disk
pub const DIR_OBJECT_SUFFIX: &str = "__XLDIR__";

/// Directory object suffix as it appears in a listing
pub const DIR_OBJECT_SUFFIX_WITH_SLASH: &str = "__XLDIR__/";

/// Current-format metadata file
pub const XL_META_FILE: &str = "xl.meta";

/// Legacy-format metadata file
pub const XL_META_FILE_LEGACY: &str = "xl.json";

/// Type of a raw directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryType {
    /// Regular file
    File = 0,
    /// Directory
    Directory = 1,
    /// Symbolic link
    Symlink = 2,
    /// Fifo, socket, device or an unrecognized code
    Other = 3,
    /// Filesystem did not report a type, needs a stat
    Unknown = 255,
}

impl EntryType {
    /// Convert from a `d_type` value of a dirent record
    pub fn from_dirent_type(d_type: u8) -> Self {
        match d_type {
            libc::DT_REG => EntryType::File,
            libc::DT_DIR => EntryType::Directory,
            libc::DT_LNK => EntryType::Symlink,
            libc::DT_UNKNOWN => EntryType::Unknown,
            _ => EntryType::Other,
        }
    }

    /// Convert from a std file type (after a stat)
    pub fn from_file_type(ft: FileType) -> Self {
        if ft.is_file() {
            EntryType::File
        } else if ft.is_dir() {
            EntryType::Directory
        } else if ft.is_symlink() {
            EntryType::Symlink
        } else {
            EntryType::Other
        }
    }

    /// Check if this is a regular file
    pub fn is_file(&self) -> bool {
        *self == EntryType::File
    }

    /// Check if this is a directory
    pub fn is_dir(&self) -> bool {
        *self == EntryType::Directory
    }

    /// Types that cannot be classified without a stat.
    ///
    /// `Other` covers every code besides file, directory and symlink, so
    /// it is re-checked too.
    pub fn needs_stat(&self) -> bool {
        matches!(
            self,
            EntryType::Unknown | EntryType::Symlink | EntryType::Other
        )
    }
}

/// Check if a listed name is a directory object (`name__XLDIR__/`)
pub fn is_dir_object_entry(entry: &str) -> bool {
    entry.ends_with(DIR_OBJECT_SUFFIX_WITH_SLASH)
}

/// Turn an on-disk directory object name back into its object name.
///
/// `a/b__XLDIR__` becomes `a/b/`; other names are returned unchanged.
pub fn decode_dir_object(name: &str) -> String {
    match name.strip_suffix(DIR_OBJECT_SUFFIX) {
        Some(base) => format!("{}{}", base, SLASH_SEPARATOR),
        None => name.to_string(),
    }
}

/// Turn an object name ending in `/` into its on-disk directory name.
pub fn encode_dir_object(name: &str) -> String {
    match name.strip_suffix(SLASH_SEPARATOR) {
        Some(base) => format!("{}{}", base, DIR_OBJECT_SUFFIX),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_from_dirent() {
        assert_eq!(EntryType::from_dirent_type(libc::DT_REG), EntryType::File);
        assert_eq!(EntryType::from_dirent_type(libc::DT_DIR), EntryType::Directory);
        assert_eq!(EntryType::from_dirent_type(libc::DT_LNK), EntryType::Symlink);
        assert_eq!(EntryType::from_dirent_type(libc::DT_UNKNOWN), EntryType::Unknown);
        assert_eq!(EntryType::from_dirent_type(libc::DT_FIFO), EntryType::Other);
        assert!(EntryType::Unknown.needs_stat());
        assert!(EntryType::Symlink.needs_stat());
        assert!(EntryType::Other.needs_stat());
        assert!(!EntryType::File.needs_stat());
        assert!(!EntryType::Directory.needs_stat());
        assert!(EntryType::Directory.is_dir());
        assert!(EntryType::File.is_file());
        assert!(!EntryType::Symlink.is_file());
    }

    #[test]
    fn test_dir_object_encoding() {
        assert_eq!(encode_dir_object("a/b/"), "a/b__XLDIR__");
        assert_eq!(encode_dir_object("a/b"), "a/b");
        assert_eq!(decode_dir_object("a/b__XLDIR__"), "a/b/");
        assert_eq!(decode_dir_object("a/b"), "a/b");
        assert!(is_dir_object_entry("photos__XLDIR__/"));
        assert!(!is_dir_object_entry("photos/"));
    }
}
