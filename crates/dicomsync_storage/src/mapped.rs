//! Read-only views over a byte range of a file.
//!
//! A reader first tries a private copy-on-write mapping of the range. The
//! mapping offset must be a multiple of the platform granularity, so the map
//! starts at the aligned offset below the request and the reader skips the
//! leading pad. When mapping is refused the range is read into an owned
//! buffer instead; callers cannot tell the two apart.

use crate::error::{Result, StorageError};
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, info};

#[cfg(not(unix))]
const DEFAULT_GRANULARITY: u64 = 64 * 1024;

/// Alignment unit for mapping offsets on this platform.
#[cfg(unix)]
pub fn mapping_granularity() -> u64 {
    // SAFETY: sysconf has no preconditions and only reads system state.
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page > 0 {
        page as u64
    } else {
        4096
    }
}

/// Alignment unit for mapping offsets on this platform.
#[cfg(not(unix))]
pub fn mapping_granularity() -> u64 {
    DEFAULT_GRANULARITY
}

/// Resolve a requested `(offset, length)` against a file of `size` bytes.
///
/// Returns the effective length:
/// - `offset > size` yields 0,
/// - `length == 0` means "to end of file",
/// - a range running past the end is cut at the end.
pub fn clamp_range(size: u64, offset: u64, length: u64) -> u64 {
    if offset > size {
        return 0;
    }
    let remaining = size - offset;
    if length == 0 || length > remaining {
        remaining
    } else {
        length
    }
}

enum Backing {
    Empty,
    Mapped { map: Mmap, start: usize },
    Buffered(Vec<u8>),
}

/// Immutable view over `[offset, offset + len)` of a file.
///
/// Resources are released on drop, whichever backing was chosen.
pub struct MappedFileReader {
    backing: Backing,
}

impl MappedFileReader {
    /// View over the whole file.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_range(path, 0, 0)
    }

    /// View over a range of the file. See [`clamp_range`] for how the
    /// requested range is adjusted; read [`len`](Self::len) for the outcome.
    pub fn open_range(path: &Path, offset: u64, length: u64) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| StorageError::read_failure(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| StorageError::read_failure(path, e))?
            .len();

        let length = clamp_range(size, offset, length);
        if length == 0 {
            return Ok(Self {
                backing: Backing::Empty,
            });
        }
        let length = usize::try_from(length).map_err(|_| {
            StorageError::read_failure(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "range exceeds address space"),
            )
        })?;

        match map_region(&file, offset, length) {
            Ok(backing) => Ok(Self { backing }),
            Err(err) => {
                info!(
                    path = %path.display(),
                    offset,
                    length,
                    error = %err,
                    "Memory mapping unavailable, reading range into buffer"
                );
                let buffer = read_region(&mut file, offset, length)
                    .map_err(|e| StorageError::read_failure(path, e))?;
                Ok(Self {
                    backing: Backing::Buffered(buffer),
                })
            }
        }
    }

    pub fn data(&self) -> &[u8] {
        match &self.backing {
            Backing::Empty => &[],
            Backing::Mapped { map, start } => &map[*start..],
            Backing::Buffered(buffer) => buffer,
        }
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the bytes come from a memory map rather than a buffer.
    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped { .. })
    }

    /// Copy the viewed bytes out.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data().to_vec()
    }
}

fn map_region(file: &File, offset: u64, length: usize) -> std::io::Result<Backing> {
    let granularity = mapping_granularity();
    let aligned = offset - offset % granularity;
    let pad = (offset - aligned) as usize;

    // SAFETY: the map is private and read-only; we never hand out a mutable
    // view. Truncation of the file by another process while mapped is the
    // documented hazard of file mappings and is outside our control.
    let map = unsafe {
        MmapOptions::new()
            .offset(aligned)
            .len(pad + length)
            .map_copy_read_only(file)?
    };
    debug!(offset, aligned, length, "Mapped file range");
    Ok(Backing::Mapped { map, start: pad })
}

pub(crate) fn read_region(file: &mut File, offset: u64, length: usize) -> std::io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buffer = vec![0u8; length];
    file.read_exact(&mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn patterned_file(dir: &TempDir, name: &str, size: usize) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let content: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_clamp_range_rules() {
        assert_eq!(clamp_range(5000, 0, 0), 5000);
        assert_eq!(clamp_range(5000, 4096, 1024), 904);
        assert_eq!(clamp_range(5000, 100, 50), 50);
        assert_eq!(clamp_range(5000, 5000, 10), 0);
        assert_eq!(clamp_range(5000, 6000, 10), 0);
        assert_eq!(clamp_range(5000, 10, u64::MAX), 4990);
    }

    #[test]
    fn test_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = patterned_file(&dir, "whole.bin", 5000);

        let reader = MappedFileReader::open(&path).unwrap();
        assert_eq!(reader.len(), 5000);
        assert_eq!(reader.data(), fs::read(&path).unwrap().as_slice());
    }

    #[test]
    fn test_unaligned_range_matches_file_bytes() {
        let dir = TempDir::new().unwrap();
        let path = patterned_file(&dir, "range.bin", 20_000);
        let expected = fs::read(&path).unwrap();

        for (offset, length) in [(1u64, 10u64), (4095, 2), (4096, 100), (12_345, 7000)] {
            let reader = MappedFileReader::open_range(&path, offset, length).unwrap();
            let start = offset as usize;
            assert_eq!(reader.data(), &expected[start..start + length as usize]);
        }
    }

    #[test]
    fn test_range_clamped_at_end() {
        let dir = TempDir::new().unwrap();
        let path = patterned_file(&dir, "tail.bin", 5000);
        let expected = fs::read(&path).unwrap();

        let reader = MappedFileReader::open_range(&path, 4096, 1024).unwrap();
        assert_eq!(reader.len(), 904);
        assert_eq!(reader.data(), &expected[4096..]);
    }

    #[test]
    fn test_offset_past_end_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = patterned_file(&dir, "short.bin", 100);

        let reader = MappedFileReader::open_range(&path, 101, 10).unwrap();
        assert!(reader.is_empty());
        assert!(!reader.is_mapped());
    }

    #[test]
    fn test_empty_file_is_valid_empty_view() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.bin");
        fs::write(&path, b"").unwrap();

        let reader = MappedFileReader::open(&path).unwrap();
        assert_eq!(reader.data(), b"");
        assert!(!reader.is_mapped());
    }

    #[test]
    fn test_missing_file_is_read_failure() {
        let dir = TempDir::new().unwrap();
        let result = MappedFileReader::open(&dir.path().join("missing.bin"));
        assert!(matches!(result, Err(StorageError::ReadFailure { .. })));
    }

    #[test]
    fn test_buffered_fallback_reads_same_bytes() {
        let dir = TempDir::new().unwrap();
        let path = patterned_file(&dir, "buffered.bin", 9000);
        let expected = fs::read(&path).unwrap();

        let mut file = File::open(&path).unwrap();
        let buffer = read_region(&mut file, 4097, 300).unwrap();
        assert_eq!(buffer.as_slice(), &expected[4097..4397]);
    }

    #[test]
    fn test_granularity_is_power_of_two() {
        let g = mapping_granularity();
        assert!(g > 0);
        assert_eq!(g & (g - 1), 0);
    }
}
