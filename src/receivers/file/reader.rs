// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::entry::Entry;
use crate::pipeline::EntryOutput;
use crate::receivers::file::config::StartAt;
use crate::receivers::file::decode::Encoding;
use crate::receivers::file::error::{Error, Result};
use crate::receivers::file::fingerprint::{self, Fingerprint};
use crate::receivers::file::flusher::Flusher;
use crate::receivers::file::splitter::{self, Splitter};

const ATTR_LOG_FILE_NAME: &str = "log.file.name";
const ATTR_LOG_FILE_PATH: &str = "log.file.path";
const ATTR_LOG_FILE_NAME_RESOLVED: &str = "log.file.name_resolved";
const ATTR_LOG_FILE_PATH_RESOLVED: &str = "log.file.path_resolved";

/// How much to read per I/O call while draining a file.
const READ_CHUNK: usize = 16 * 1024;

/// Immutable parameters shared by every reader of one file source.
pub struct ReaderSettings {
    pub fingerprint_size: usize,
    pub max_log_size: usize,
    pub splitter: Splitter,
    pub encoding: Encoding,
    pub force_flush_period: Duration,
    pub include_file_name: bool,
    pub include_file_path: bool,
    pub include_file_name_resolved: bool,
    pub include_file_path_resolved: bool,
    pub output: EntryOutput,
}

/// One tracked file: an exclusively-owned handle, its fingerprint, and the
/// durable read offset. Emits records by driving the splitter over newly
/// available bytes.
pub struct Reader {
    settings: Arc<ReaderSettings>,
    path: PathBuf,
    /// None for placeholders restored from a checkpoint whose path could
    /// not be re-opened.
    file: Option<File>,
    fingerprint: Fingerprint,
    /// Next unread byte; advanced only for delivered records.
    offset: u64,
    /// Bytes read past `offset` still awaiting a record boundary.
    pending: Vec<u8>,
    flusher: Flusher,
    /// Metadata attributes attached to every emitted entry.
    attributes: Vec<(&'static str, Value)>,
}

impl Reader {
    pub fn new(
        settings: Arc<ReaderSettings>,
        path: PathBuf,
        file: Option<File>,
        fingerprint: Fingerprint,
        offset: u64,
    ) -> Self {
        let flusher = Flusher::new(settings.force_flush_period);
        let attributes = Self::build_attributes(&settings, &path);
        Self {
            settings,
            path,
            file,
            fingerprint,
            offset,
            pending: Vec::new(),
            flusher,
            attributes,
        }
    }

    fn build_attributes(settings: &ReaderSettings, path: &PathBuf) -> Vec<(&'static str, Value)> {
        let mut attrs = Vec::new();
        if settings.include_file_name {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                attrs.push((ATTR_LOG_FILE_NAME, Value::from(name)));
            }
        }
        if settings.include_file_path {
            attrs.push((ATTR_LOG_FILE_PATH, Value::from(path.display().to_string())));
        }
        if settings.include_file_name_resolved || settings.include_file_path_resolved {
            if let Ok(resolved) = std::fs::canonicalize(path) {
                if settings.include_file_name_resolved {
                    if let Some(name) = resolved.file_name().and_then(|n| n.to_str()) {
                        attrs.push((ATTR_LOG_FILE_NAME_RESOLVED, Value::from(name)));
                    }
                }
                if settings.include_file_path_resolved {
                    attrs.push((
                        ATTR_LOG_FILE_PATH_RESOLVED,
                        Value::from(resolved.display().to_string()),
                    ));
                }
            }
        }
        attrs
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn has_handle(&self) -> bool {
        self.file.is_some()
    }

    /// On first encounter of a brand-new file: read full history or tail
    /// only new writes. Never called again for this lineage.
    pub fn initialize_offset(&mut self, start_at: StartAt) -> std::io::Result<()> {
        if start_at == StartAt::End {
            if let Some(file) = self.file.as_ref() {
                self.offset = file.metadata()?.len();
            }
        }
        Ok(())
    }

    /// Close the file handle.
    pub fn close(&mut self) {
        self.file = None;
    }

    /// Read from the current offset to the end of the file as of entry
    /// (growth during the call is picked up next poll cycle), tokenize,
    /// and forward records downstream. The stored offset reflects exactly
    /// the delivered bytes; an incomplete trailing token stays pending.
    pub async fn read_to_end(&mut self, cancel: &CancellationToken) -> Result<()> {
        let end = {
            let Some(file) = self.file.as_ref() else {
                return Ok(());
            };
            if self.fingerprint.len() < self.settings.fingerprint_size {
                self.fingerprint.grow(file, self.settings.fingerprint_size)?;
            }
            file.metadata()?.len()
        };

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            self.drain_pending().await?;

            let pos = self.offset + self.pending.len() as u64;
            if pos >= end {
                break;
            }

            let want = READ_CHUNK.min((end - pos) as usize);
            let mut chunk = vec![0u8; want];
            let n = {
                let Some(file) = self.file.as_ref() else {
                    break;
                };
                fingerprint::read_full_at(file, &mut chunk, pos)?
            };
            if n == 0 {
                // The file shrank underneath us; stop here, admission will
                // sort out its identity next cycle.
                break;
            }
            chunk.truncate(n);
            self.pending.extend_from_slice(&chunk);
        }

        if self.flusher.should_flush(self.pending.len()) {
            self.force_flush().await?;
        }

        Ok(())
    }

    /// Emit every token decidable from the pending buffer.
    async fn drain_pending(&mut self) -> Result<()> {
        while let Some(split) = self.settings.splitter.split(&self.pending, false) {
            if let Some(token) = &split.token {
                self.emit(token).await?;
            }
            self.offset += split.advance as u64;
            self.pending.drain(..split.advance);
        }

        // A buffer that reaches the record-size cap without a boundary is
        // emitted oversized rather than growing without bound.
        if self.pending.len() >= self.settings.max_log_size {
            let token = self.pending[..self.settings.max_log_size].to_vec();
            self.emit(&token).await?;
            self.offset += token.len() as u64;
            self.pending.drain(..token.len());
        }

        Ok(())
    }

    /// Emit the stalled pending buffer as a single token.
    async fn force_flush(&mut self) -> Result<()> {
        let buf = std::mem::take(&mut self.pending);
        let token = match &self.settings.splitter {
            Splitter::None { .. } => Some(buf.clone()),
            _ => splitter::trim_trailing(&buf),
        };
        if let Some(token) = token {
            self.emit(&token).await?;
        }
        self.offset += buf.len() as u64;
        self.flusher.flushed();
        Ok(())
    }

    async fn emit(&self, token: &[u8]) -> Result<()> {
        let body = match self.settings.encoding.decode(token) {
            Ok(body) => body,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "dropping undecodable chunk");
                return Ok(());
            }
        };

        let mut entry = Entry::new(body);
        for (key, value) in &self.attributes {
            entry.add_attribute(*key, value.clone());
        }

        self.settings
            .output
            .write(entry)
            .await
            .map_err(|_| Error::PipelineClosed)
    }
}
