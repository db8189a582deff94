//! Decoder for raw `linux_dirent64` records
//!
//! `getdents64` fills a byte buffer with variable-length records:
//!
//! ```text
//! offset  size  field
//!      0     8  d_ino
//!      8     8  d_off
//!     16     2  d_reclen   (total record length, padded)
//!     18     1  d_type
//!     19     n  d_name     (NUL terminated, inside d_reclen)
//! ```
//!
//! Every header is bounds-checked before a field is read and the declared
//! record length is validated against the buffer, so a corrupt or short
//! buffer ends decoding with an error instead of reading out of range.

use crate::storage::types::EntryType;
use thiserror::Error;

const INO_OFFSET: usize = 0;
const RECLEN_OFFSET: usize = 16;
const TYPE_OFFSET: usize = 18;
const NAME_OFFSET: usize = 19;

/// Bytes that must be present before any header field is read
pub const DIRENT_HEADER_LEN: usize = NAME_OFFSET;

/// Malformed record in a dirent buffer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirentError {
    /// Fewer bytes left than a record header
    #[error("buf size of {have} smaller than dirent header size {need}")]
    ShortHeader { have: usize, need: usize },

    /// Declared record length runs past the buffer
    #[error("buf size {have} < record length {reclen}")]
    ShortRecord { have: usize, reclen: usize },

    /// Declared record length cannot hold a header
    #[error("record length {reclen} smaller than dirent header size")]
    BadRecordLength { reclen: usize },

    /// No NUL terminator inside the record
    #[error("failed to find terminating 0 byte in dirent")]
    MissingNul,
}

/// One decoded directory record, borrowing from the record buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDirent<'a> {
    pub inode: u64,
    pub name: &'a [u8],
    pub entry_type: EntryType,
}

impl<'a> RawDirent<'a> {
    /// Check if this is "." or ".."
    pub fn is_special(&self) -> bool {
        self.name == b"." || self.name == b".."
    }
}

/// Iterator over the records of one `getdents64` batch.
///
/// Records with inode 0 (deleted entries) and the `.`/`..` entries are
/// skipped. After an error the decoder yields nothing more.
pub struct DirentDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> DirentDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn decode_one(&mut self) -> Result<Option<RawDirent<'a>>, DirentError> {
        let rest = &self.buf[self.pos..];
        if rest.len() < DIRENT_HEADER_LEN {
            return Err(DirentError::ShortHeader {
                have: rest.len(),
                need: DIRENT_HEADER_LEN,
            });
        }

        let reclen = u16::from_ne_bytes([rest[RECLEN_OFFSET], rest[RECLEN_OFFSET + 1]]) as usize;
        if reclen < DIRENT_HEADER_LEN {
            return Err(DirentError::BadRecordLength { reclen });
        }
        if reclen > rest.len() {
            return Err(DirentError::ShortRecord {
                have: rest.len(),
                reclen,
            });
        }

        let record = &rest[..reclen];
        self.pos += reclen;

        let mut ino = [0u8; 8];
        ino.copy_from_slice(&record[INO_OFFSET..INO_OFFSET + 8]);
        let inode = u64::from_ne_bytes(ino);
        if inode == 0 {
            return Ok(None);
        }

        let name_field = &record[NAME_OFFSET..];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .ok_or(DirentError::MissingNul)?;

        let dirent = RawDirent {
            inode,
            name: &name_field[..name_len],
            entry_type: EntryType::from_dirent_type(record[TYPE_OFFSET]),
        };
        if dirent.is_special() {
            return Ok(None);
        }
        Ok(Some(dirent))
    }
}

impl<'a> Iterator for DirentDecoder<'a> {
    type Item = Result<RawDirent<'a>, DirentError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.buf.len() {
            match self.decode_one() {
                Ok(Some(dirent)) => return Some(Ok(dirent)),
                Ok(None) => continue,
                Err(e) => {
                    self.pos = self.buf.len();
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a record the way the kernel lays it out (8-byte padded)
    pub(crate) fn encode_record(ino: u64, d_type: u8, name: &[u8]) -> Vec<u8> {
        let unpadded = NAME_OFFSET + name.len() + 1;
        let reclen = (unpadded + 7) & !7;
        let mut rec = vec![0u8; reclen];
        rec[0..8].copy_from_slice(&ino.to_ne_bytes());
        rec[8..16].copy_from_slice(&0i64.to_ne_bytes());
        rec[16..18].copy_from_slice(&(reclen as u16).to_ne_bytes());
        rec[18] = d_type;
        rec[NAME_OFFSET..NAME_OFFSET + name.len()].copy_from_slice(name);
        rec
    }

    #[test]
    fn test_decode_records() {
        let mut buf = Vec::new();
        buf.extend(encode_record(10, libc::DT_DIR, b"."));
        buf.extend(encode_record(9, libc::DT_DIR, b".."));
        buf.extend(encode_record(11, libc::DT_REG, b"xl.meta"));
        buf.extend(encode_record(12, libc::DT_DIR, b"photos"));
        buf.extend(encode_record(13, libc::DT_DIR, b"..hidden"));

        let entries: Vec<_> = DirentDecoder::new(&buf).collect::<Result<_, _>>().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, b"xl.meta");
        assert_eq!(entries[0].entry_type, EntryType::File);
        assert_eq!(entries[1].name, b"photos");
        assert_eq!(entries[1].entry_type, EntryType::Directory);
        assert_eq!(entries[1].inode, 12);
        assert_eq!(entries[2].name, b"..hidden");
    }

    #[test]
    fn test_skip_deleted_records() {
        let mut buf = Vec::new();
        buf.extend(encode_record(0, libc::DT_REG, b"gone"));
        buf.extend(encode_record(5, libc::DT_REG, b"kept"));

        let mut decoder = DirentDecoder::new(&buf);
        let first = decoder.next().unwrap().unwrap();
        assert_eq!(first.name, b"kept");
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_short_header() {
        let buf = vec![0u8; 10];
        let mut decoder = DirentDecoder::new(&buf);
        assert_eq!(
            decoder.next().unwrap().unwrap_err(),
            DirentError::ShortHeader { have: 10, need: 19 }
        );
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_reclen_past_buffer() {
        let mut rec = encode_record(3, libc::DT_REG, b"abc");
        let bogus = (rec.len() as u16 + 64).to_ne_bytes();
        rec[16..18].copy_from_slice(&bogus);

        let err = DirentDecoder::new(&rec).next().unwrap().unwrap_err();
        assert!(matches!(err, DirentError::ShortRecord { .. }));
    }

    #[test]
    fn test_reclen_too_small() {
        let mut rec = encode_record(3, libc::DT_REG, b"abc");
        rec[16..18].copy_from_slice(&4u16.to_ne_bytes());

        let err = DirentDecoder::new(&rec).next().unwrap().unwrap_err();
        assert_eq!(err, DirentError::BadRecordLength { reclen: 4 });
    }

    #[test]
    fn test_missing_nul() {
        let mut rec = encode_record(3, libc::DT_REG, b"abcd");
        let len = rec.len();
        for b in &mut rec[NAME_OFFSET..len] {
            *b = b'x';
        }

        let err = DirentDecoder::new(&rec).next().unwrap().unwrap_err();
        assert_eq!(err, DirentError::MissingNul);
    }

    #[test]
    fn test_unknown_type_passes_through() {
        let rec = encode_record(9, libc::DT_UNKNOWN, b"old-xfs");
        let dirent = DirentDecoder::new(&rec).next().unwrap().unwrap();
        assert_eq!(dirent.entry_type, EntryType::Unknown);
    }
}
