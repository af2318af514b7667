// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

/// Fingerprints shorter than this never match anything; near-empty files
/// are indistinguishable from each other.
pub const MIN_PREFIX_OVERLAP: usize = 3;

/// A fingerprint identifies a file lineage by the first N bytes of its
/// content, so the same file can be recognized after a rename or rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    first_bytes: Vec<u8>,
}

impl Fingerprint {
    /// Read a fingerprint of up to `size` bytes from the start of the file.
    ///
    /// Uses positional reads so the handle's read cursor is left untouched;
    /// readers stream from the same handle and must not be perturbed.
    pub fn read(file: &File, size: usize) -> io::Result<Self> {
        let mut buf = vec![0u8; size];
        let filled = read_full_at(file, &mut buf, 0)?;
        buf.truncate(filled);
        Ok(Self { first_bytes: buf })
    }

    /// Rebuild a fingerprint from persisted bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { first_bytes: bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.first_bytes
    }

    pub fn len(&self) -> usize {
        self.first_bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first_bytes.is_empty()
    }

    /// True iff `older` is a full byte-for-byte prefix of this fingerprint
    /// and long enough to be meaningful. Asymmetric: only the older
    /// (shorter) print's full length has to match.
    pub fn starts_with(&self, older: &Fingerprint) -> bool {
        let n = older.first_bytes.len();
        if n < MIN_PREFIX_OVERLAP || n > self.first_bytes.len() {
            return false;
        }
        self.first_bytes[..n] == older.first_bytes[..n]
    }

    /// Extend the fingerprint up to `max_size` bytes as more of the file
    /// becomes available. Positional reads only.
    pub fn grow(&mut self, file: &File, max_size: usize) -> io::Result<()> {
        while self.first_bytes.len() < max_size {
            let start = self.first_bytes.len();
            let mut chunk = vec![0u8; max_size - start];
            let n = read_full_at(file, &mut chunk, start as u64)?;
            if n == 0 {
                break;
            }
            self.first_bytes.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }
}

/// Read at `offset` until the buffer is full or the file ends. Returns the
/// number of bytes read.
pub(crate) fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
