//! Register/address-oriented transport devices

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

/// A random-access device reached over some bus
///
/// Implementations own any device framing (address bytes, page commands);
/// the store hands them absolute offsets and never crosses a page in one
/// `write`.
pub trait Transport {
    /// Read `len` bytes starting at `address`
    fn read(&mut self, address: usize, len: usize) -> io::Result<Vec<u8>>;

    /// Write `bytes` starting at `address`
    fn write(&mut self, address: usize, bytes: &[u8]) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, address: usize, len: usize) -> io::Result<Vec<u8>> {
        (**self).read(address, len)
    }

    fn write(&mut self, address: usize, bytes: &[u8]) -> io::Result<()> {
        (**self).write(address, bytes)
    }
}

/// One bus handle injected into several stores
impl<T: Transport> Transport for Arc<Mutex<T>> {
    fn read(&mut self, address: usize, len: usize) -> io::Result<Vec<u8>> {
        self.lock().read(address, len)
    }

    fn write(&mut self, address: usize, bytes: &[u8]) -> io::Result<()> {
        self.lock().write(address, bytes)
    }
}
