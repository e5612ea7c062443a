//! Memory-mapped file medium

use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// A local file addressed at absolute offsets through a shared mapping
pub struct FileMedium {
    /// Path to the backing file
    path: PathBuf,
    /// Kept open for the lifetime of the mapping
    _file: File,
    /// Shared mapping of the whole file
    mmap: MmapMut,
}

impl FileMedium {
    /// Open the file at `path`, creating it with `size` zero bytes if it is
    /// missing or empty
    ///
    /// The size of an existing non-empty file wins over `size`.
    pub fn open<P: AsRef<Path>>(path: P, size: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.metadata()?.len() == 0 {
            if size == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "cannot create an empty file medium",
                ));
            }
            file.set_len(size as u64)?;
        }

        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };

        Ok(Self {
            path,
            _file: file,
            mmap,
        })
    }

    /// Path to the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File length in bytes
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Whether the file has zero length
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub(crate) fn read(&self, offset: usize, count: usize) -> Vec<u8> {
        self.mmap[offset..offset + count].to_vec()
    }

    pub(crate) fn write(&mut self, offset: usize, bytes: &[u8]) -> io::Result<()> {
        self.mmap[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.mmap.flush_range(offset, bytes.len())
    }
}
