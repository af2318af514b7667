// SPDX-License-Identifier: Apache-2.0

//! Configuration for the file source.

use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::EntryOutput;
use crate::receivers::file::decode::Encoding;
use crate::receivers::file::error::{Error, Result};
use crate::receivers::file::finder::Finder;
use crate::receivers::file::manager::Manager;
use crate::receivers::file::reader::ReaderSettings;
use crate::receivers::file::splitter::Splitter;
use crate::receivers::file::tracker::DEFAULT_ROTATION_CHAIN_LIMIT;
use crate::storage::Storage;

/// Smallest usable fingerprint; shorter prefixes collide too easily.
pub const MIN_FINGERPRINT_SIZE: usize = 16;
pub const DEFAULT_FINGERPRINT_SIZE: usize = 1000;
pub const DEFAULT_MAX_LOG_SIZE: usize = 1024 * 1024;
pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 64;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_FORCE_FLUSH_PERIOD: Duration = Duration::from_millis(500);

/// Where to start reading a file present at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartAt {
    /// Read the file's full history.
    Beginning,
    /// Tail only writes made after startup.
    #[default]
    End,
}

/// Configuration for the file source.
#[derive(Debug, Clone)]
pub struct FileSourceConfig {
    /// Glob patterns for files to include
    pub include: Vec<String>,
    /// Glob patterns for files to exclude (these take precedence)
    pub exclude: Vec<String>,
    /// How often to run a discovery/read cycle
    pub poll_interval: Duration,
    /// Where to start reading files present at startup
    pub start_at: StartAt,
    /// Number of bytes used for file fingerprinting
    pub fingerprint_size: usize,
    /// Maximum size of a single record in bytes
    pub max_log_size: usize,
    /// Maximum number of files read concurrently per cycle
    pub max_concurrent_files: usize,
    /// Character encoding of the files; `nop` disables line semantics
    pub encoding: Encoding,
    /// Regex marking the beginning of a record (multi-line mode)
    pub line_start_pattern: Option<String>,
    /// Regex marking the end of a record (multi-line mode)
    pub line_end_pattern: Option<String>,
    /// How long a stalled multi-line buffer may sit before being forced
    /// out; zero disables forcing
    pub force_flush_period: Duration,
    /// Attach the file name as a record attribute
    pub include_file_name: bool,
    /// Attach the file path as a record attribute
    pub include_file_path: bool,
    /// Attach the symlink-resolved file name as a record attribute
    pub include_file_name_resolved: bool,
    /// Attach the symlink-resolved file path as a record attribute
    pub include_file_path_resolved: bool,
    /// Storage key under which the checkpoint is persisted
    pub checkpoint_key: String,
}

impl Default for FileSourceConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            start_at: StartAt::End,
            fingerprint_size: DEFAULT_FINGERPRINT_SIZE,
            max_log_size: DEFAULT_MAX_LOG_SIZE,
            max_concurrent_files: DEFAULT_MAX_CONCURRENT_FILES,
            encoding: Encoding::Utf8,
            line_start_pattern: None,
            line_end_pattern: None,
            force_flush_period: DEFAULT_FORCE_FLUSH_PERIOD,
            include_file_name: true,
            include_file_path: false,
            include_file_name_resolved: false,
            include_file_path_resolved: false,
            checkpoint_key: "file_source.known_files".to_string(),
        }
    }
}

impl FileSourceConfig {
    /// Validate the configuration and build the runtime [`Manager`], with
    /// patterns compiled and sizes resolved. All configuration errors
    /// surface here, before the poll loop ever starts.
    pub fn build(self, output: EntryOutput, storage: Arc<dyn Storage>) -> Result<Manager> {
        if self.fingerprint_size < MIN_FINGERPRINT_SIZE {
            return Err(Error::Config(format!(
                "fingerprint_size must be at least {MIN_FINGERPRINT_SIZE} bytes, got {}",
                self.fingerprint_size
            )));
        }
        if self.max_log_size == 0 {
            return Err(Error::Config("max_log_size must be nonzero".to_string()));
        }
        if self.max_concurrent_files <= 1 {
            return Err(Error::Config(
                "max_concurrent_files must be greater than 1".to_string(),
            ));
        }
        if self.line_start_pattern.is_some() && self.line_end_pattern.is_some() {
            return Err(Error::Config(
                "at most one of line_start_pattern and line_end_pattern may be set".to_string(),
            ));
        }
        if self.encoding.is_nop()
            && (self.line_start_pattern.is_some() || self.line_end_pattern.is_some())
        {
            return Err(Error::Config(
                "multiline patterns cannot be combined with the nop encoding".to_string(),
            ));
        }

        let splitter = if self.encoding.is_nop() {
            Splitter::None {
                max_chunk: self.max_log_size,
            }
        } else if let Some(pattern) = &self.line_start_pattern {
            Splitter::line_start(pattern)?
        } else if let Some(pattern) = &self.line_end_pattern {
            Splitter::line_end(pattern)?
        } else {
            Splitter::Newline
        };

        let finder = Finder::new(self.include.clone(), self.exclude.clone())?;

        let settings = Arc::new(ReaderSettings {
            fingerprint_size: self.fingerprint_size,
            max_log_size: self.max_log_size,
            splitter,
            encoding: self.encoding,
            force_flush_period: self.force_flush_period,
            include_file_name: self.include_file_name,
            include_file_path: self.include_file_path,
            include_file_name_resolved: self.include_file_name_resolved,
            include_file_path_resolved: self.include_file_path_resolved,
            output,
        });

        Ok(Manager::new(
            self,
            finder,
            settings,
            storage,
            DEFAULT_ROTATION_CHAIN_LIMIT,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline;
    use crate::storage::MemoryStorage;

    fn try_build(config: FileSourceConfig) -> Result<Manager> {
        let (output, _rx) = pipeline::channel(1);
        config.build(output, Arc::new(MemoryStorage::new()))
    }

    fn base() -> FileSourceConfig {
        FileSourceConfig {
            include: vec!["/tmp/*.log".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_builds() {
        assert!(try_build(base()).is_ok());
    }

    #[test]
    fn test_fingerprint_size_minimum_enforced() {
        let config = FileSourceConfig {
            fingerprint_size: MIN_FINGERPRINT_SIZE - 1,
            ..base()
        };
        assert!(matches!(try_build(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_max_concurrent_files_must_exceed_one() {
        let config = FileSourceConfig {
            max_concurrent_files: 1,
            ..base()
        };
        assert!(matches!(try_build(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_conflicting_multiline_patterns_rejected() {
        let config = FileSourceConfig {
            line_start_pattern: Some("^START".to_string()),
            line_end_pattern: Some("END$".to_string()),
            ..base()
        };
        assert!(matches!(try_build(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_nop_encoding_excludes_multiline() {
        let config = FileSourceConfig {
            encoding: Encoding::Nop,
            line_start_pattern: Some("^START".to_string()),
            ..base()
        };
        assert!(matches!(try_build(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let config = FileSourceConfig {
            line_start_pattern: Some("([unclosed".to_string()),
            ..base()
        };
        assert!(matches!(try_build(config), Err(Error::Regex(_))));
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let config = FileSourceConfig {
            include: vec!["[".to_string()],
            ..Default::default()
        };
        assert!(matches!(try_build(config), Err(Error::InvalidGlob { .. })));
    }
}
