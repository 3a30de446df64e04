use std::path::{Path, PathBuf};

use crate::{EdrumError, Result};

/// Value of a byte that has never been written.
pub const ERASED: u8 = 0xff;

/// Byte-addressable non-volatile storage holding the pad records.
pub trait Storage {
    fn capacity(&self) -> usize;

    fn read(&self, address: usize) -> Result<u8>;

    /// Writes `value` only if it differs from what is stored.
    fn update(&mut self, address: usize, value: u8) -> Result<()>;
}

/// Storage held entirely in memory, starting erased.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    bytes: Vec<u8>,
    writes: usize,
}

impl MemoryStorage {
    pub fn new(capacity: usize) -> Self {
        Self::from_bytes(vec![ERASED; capacity])
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes, writes: 0 }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes physically changed since construction.
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn check(&self, address: usize) -> Result<()> {
        if address < self.bytes.len() {
            Ok(())
        } else {
            Err(EdrumError::StorageRange {
                address,
                capacity: self.bytes.len(),
            })
        }
    }
}

impl Storage for MemoryStorage {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, address: usize) -> Result<u8> {
        self.check(address)?;
        Ok(self.bytes[address])
    }

    fn update(&mut self, address: usize, value: u8) -> Result<()> {
        self.check(address)?;
        if self.bytes[address] != value {
            self.bytes[address] = value;
            self.writes += 1;
        }
        Ok(())
    }
}

/// Storage image mirrored in a file. Changes stay in memory until
/// [`FileStorage::flush`].
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    image: MemoryStorage,
    dirty: bool,
}

impl FileStorage {
    /// Opens the image at `path`, or starts erased if the file does not exist.
    /// The image is padded or truncated to `capacity`.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        bytes.resize(capacity, ERASED);
        tracing::debug!(path = %path.display(), capacity, "opened storage image");

        Ok(Self {
            path,
            image: MemoryStorage::from_bytes(bytes),
            dirty: false,
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.dirty {
            std::fs::write(&self.path, self.image.bytes())?;
            self.dirty = false;
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn capacity(&self) -> usize {
        self.image.capacity()
    }

    fn read(&self, address: usize) -> Result<u8> {
        self.image.read(address)
    }

    fn update(&mut self, address: usize, value: u8) -> Result<()> {
        let before = self.image.writes();
        self.image.update(address, value)?;
        self.dirty |= self.image.writes() != before;
        Ok(())
    }
}
