//! Volatile in-memory medium

use parking_lot::RwLock;
use std::sync::Arc;

/// A byte buffer shared between every clone
///
/// Clones alias the same bytes, which is what lets a log be "reopened" over
/// memory or lets two stores contend for one buffer.
#[derive(Clone, Debug)]
pub struct SharedMemory {
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl SharedMemory {
    /// Zero-filled buffer of `len` bytes
    pub fn new(len: usize) -> Self {
        Self::from_vec(vec![0u8; len])
    }

    /// Take ownership of existing contents
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(RwLock::new(bytes)),
        }
    }

    /// Buffer length in bytes
    pub fn len(&self) -> usize {
        self.bytes.read().len()
    }

    /// Whether the buffer has zero length
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current contents
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }

    pub(crate) fn read(&self, offset: usize, count: usize) -> Vec<u8> {
        self.bytes.read()[offset..offset + count].to_vec()
    }

    pub(crate) fn write(&self, offset: usize, data: &[u8]) {
        self.bytes.write()[offset..offset + data.len()].copy_from_slice(data);
    }
}
