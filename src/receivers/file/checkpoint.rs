// SPDX-License-Identifier: Apache-2.0

//! Checkpoint codec: the persisted form of the tracked-file table.
//!
//! Layout: a little-endian `u32` record count, then per record a
//! length-prefixed path, a length-prefixed fingerprint, and a `u64`
//! offset. Every field is self-describing, so truncation is detectable
//! independent of the declared count.

use std::path::PathBuf;

use crate::receivers::file::error::{Error, Result};

/// One persisted file: the newest generation of a path's rotation chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointEntry {
    pub path: PathBuf,
    pub fingerprint: Vec<u8>,
    pub offset: u64,
}

pub fn encode(entries: &[CheckpointEntry]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for entry in entries {
        let path = entry.path.to_string_lossy();
        write_bytes(&mut buf, path.as_bytes());
        write_bytes(&mut buf, &entry.fingerprint);
        buf.extend_from_slice(&entry.offset.to_le_bytes());
    }
    buf
}

pub fn decode(data: &[u8]) -> Result<Vec<CheckpointEntry>> {
    let mut cursor = Cursor { data, pos: 0 };

    let count = cursor.read_u32()?;
    let mut entries = Vec::with_capacity(count.min(1024) as usize);
    for index in 0..count {
        let path = cursor.read_bytes().map_err(|e| record_err(index, e))?;
        let path = String::from_utf8(path).map_err(|_| {
            Error::CheckpointCorrupt(format!("record {index}: path is not valid utf-8"))
        })?;
        let fingerprint = cursor.read_bytes().map_err(|e| record_err(index, e))?;
        let offset = cursor.read_u64().map_err(|e| record_err(index, e))?;

        entries.push(CheckpointEntry {
            path: PathBuf::from(path),
            fingerprint,
            offset,
        });
    }

    if cursor.pos != data.len() {
        return Err(Error::CheckpointCorrupt(format!(
            "{} trailing bytes after {count} records",
            data.len() - cursor.pos
        )));
    }

    Ok(entries)
}

fn record_err(index: u32, e: Error) -> Error {
    Error::CheckpointCorrupt(format!("record {index}: {e}"))
}

fn write_bytes(buf: &mut Vec<u8>, field: &[u8]) {
    buf.extend_from_slice(&(field.len() as u32).to_le_bytes());
    buf.extend_from_slice(field);
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8]> {
        if self.data.len() - self.pos < n {
            return Err(Error::CheckpointCorrupt(format!(
                "truncated: wanted {n} bytes at position {}, {} remain",
                self.pos,
                self.data.len() - self.pos
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<CheckpointEntry> {
        vec![
            CheckpointEntry {
                path: PathBuf::from("/var/log/app.log"),
                fingerprint: b"first bytes of app.log".to_vec(),
                offset: 12345,
            },
            CheckpointEntry {
                path: PathBuf::from("/var/log/other.log"),
                fingerprint: vec![],
                offset: 0,
            },
        ]
    }

    #[test]
    fn test_roundtrip() {
        let entries = sample();
        let decoded = decode(&encode(&entries)).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn test_empty_table() {
        let decoded = decode(&encode(&[])).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_truncation_detected() {
        let encoded = encode(&sample());
        // Any strict prefix except the full buffer must fail
        for cut in [3, 10, encoded.len() - 1] {
            let err = decode(&encoded[..cut]).unwrap_err();
            assert!(
                matches!(err, Error::CheckpointCorrupt(_)),
                "cut at {cut} should be corrupt"
            );
        }
    }

    #[test]
    fn test_trailing_garbage_detected() {
        let mut encoded = encode(&sample());
        encoded.extend_from_slice(b"junk");
        let err = decode(&encoded).unwrap_err();
        assert!(matches!(err, Error::CheckpointCorrupt(_)));
    }

    #[test]
    fn test_count_larger_than_data_detected() {
        let mut encoded = encode(&sample());
        // Claim more records than are present
        encoded[0..4].copy_from_slice(&10u32.to_le_bytes());
        let err = decode(&encoded).unwrap_err();
        assert!(matches!(err, Error::CheckpointCorrupt(_)));
    }
}
