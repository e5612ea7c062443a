//! Byte-addressable media a backing store can sit on
//!
//! A medium is picked once, when the store is built, by constructing one of
//! the [`Medium`] variants:
//!
//! - [`SharedMemory`] - a volatile byte buffer, cheaply cloned so several
//!   stores (or a reopened log) can see the same bytes
//! - a [`Transport`] - a register/address-oriented device such as a serial
//!   EEPROM, injected by the caller
//! - [`FileMedium`] - a memory-mapped local file
//!
//! Media perform raw, unbuffered transfers; buffering, dwell timing and
//! locking belong to the store above.

pub mod device;
pub mod file;
pub mod memory;

pub use device::Transport;
pub use file::FileMedium;
pub use memory::SharedMemory;

use std::io;

/// The backing medium of a store
pub enum Medium {
    /// Volatile in-memory buffer
    InMemory(SharedMemory),
    /// Random-access transport device
    Device(Box<dyn Transport + Send>),
    /// Random-access local file
    File(FileMedium),
}

impl Medium {
    /// Wrap a transport as a device medium
    pub fn device<T: Transport + Send + 'static>(transport: T) -> Self {
        Medium::Device(Box::new(transport))
    }

    /// Size the medium reports for itself, if it knows
    ///
    /// Devices cannot be probed; their capacity comes from configuration.
    pub fn intrinsic_len(&self) -> Option<usize> {
        match self {
            Medium::InMemory(mem) => Some(mem.len()),
            Medium::Device(_) => None,
            Medium::File(file) => Some(file.len()),
        }
    }

    /// Short name of the variant, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Medium::InMemory(_) => "memory",
            Medium::Device(_) => "device",
            Medium::File(_) => "file",
        }
    }

    /// Raw read of `count` bytes at `offset`
    pub(crate) fn read(&mut self, offset: usize, count: usize) -> io::Result<Vec<u8>> {
        match self {
            Medium::InMemory(mem) => Ok(mem.read(offset, count)),
            Medium::Device(transport) => {
                let bytes = transport.read(offset, count)?;
                if bytes.len() != count {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("device returned {} of {} bytes", bytes.len(), count),
                    ));
                }
                Ok(bytes)
            }
            Medium::File(file) => Ok(file.read(offset, count)),
        }
    }

    /// Raw write of `bytes` at `offset`
    pub(crate) fn write(&mut self, offset: usize, bytes: &[u8]) -> io::Result<()> {
        match self {
            Medium::InMemory(mem) => {
                mem.write(offset, bytes);
                Ok(())
            }
            Medium::Device(transport) => transport.write(offset, bytes),
            Medium::File(file) => file.write(offset, bytes),
        }
    }
}

impl std::fmt::Debug for Medium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Medium")
            .field("kind", &self.kind())
            .field("len", &self.intrinsic_len())
            .finish()
    }
}
