// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};
use serde::Deserialize;

use crate::receivers::file::config::{
    DEFAULT_FINGERPRINT_SIZE, DEFAULT_MAX_CONCURRENT_FILES, DEFAULT_MAX_LOG_SIZE, FileSourceConfig,
    StartAt,
};
use crate::receivers::file::decode::Encoding;

/// Where to start reading files present at startup
#[derive(Copy, Clone, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StartAtArg {
    /// Start at the beginning of the file
    Beginning,
    /// Start at the end of the file (tail mode)
    #[default]
    End,
}

impl From<StartAtArg> for StartAt {
    fn from(s: StartAtArg) -> Self {
        match s {
            StartAtArg::Beginning => StartAt::Beginning,
            StartAtArg::End => StartAt::End,
        }
    }
}

/// Character encoding of the tailed files
#[derive(Copy, Clone, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EncodingArg {
    /// UTF-8 text
    #[default]
    Utf8,
    /// 7-bit ASCII text
    Ascii,
    /// No text semantics, emit fixed-size chunks
    Nop,
}

impl From<EncodingArg> for Encoding {
    fn from(e: EncodingArg) -> Self {
        match e {
            EncodingArg::Utf8 => Encoding::Utf8,
            EncodingArg::Ascii => Encoding::Ascii,
            EncodingArg::Nop => Encoding::Nop,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct AgentRun {
    /// Comma-separated glob patterns for files to include (e.g., "/var/log/*.log,/tmp/*.log")
    #[arg(long, env = "TAILPIPE_FILE_INCLUDE", value_delimiter = ',')]
    pub file_include: Vec<String>,

    /// Comma-separated glob patterns for files to exclude (these take precedence)
    #[arg(long, env = "TAILPIPE_FILE_EXCLUDE", value_delimiter = ',')]
    pub file_exclude: Vec<String>,

    /// Where to start reading: beginning or end of file
    #[arg(
        value_enum,
        long,
        env = "TAILPIPE_FILE_START_AT",
        default_value = "end"
    )]
    pub file_start_at: StartAtArg,

    /// How often to check for new files and new data
    #[arg(long, env = "TAILPIPE_FILE_POLL_INTERVAL", default_value = "250ms", value_parser = humantime::parse_duration)]
    pub file_poll_interval: Duration,

    /// Number of bytes used for file identity fingerprinting
    #[arg(
        long,
        env = "TAILPIPE_FILE_FINGERPRINT_SIZE",
        default_value_t = DEFAULT_FINGERPRINT_SIZE
    )]
    pub file_fingerprint_size: usize,

    /// Maximum size of a single log record in bytes
    #[arg(
        long,
        env = "TAILPIPE_FILE_MAX_LOG_SIZE",
        default_value_t = DEFAULT_MAX_LOG_SIZE
    )]
    pub file_max_log_size: usize,

    /// Maximum number of files read concurrently per poll cycle
    #[arg(
        long,
        env = "TAILPIPE_FILE_MAX_CONCURRENT_FILES",
        default_value_t = DEFAULT_MAX_CONCURRENT_FILES
    )]
    pub file_max_concurrent_files: usize,

    /// File encoding: utf8, ascii, or nop (fixed-size binary chunks)
    #[arg(
        value_enum,
        long,
        env = "TAILPIPE_FILE_ENCODING",
        default_value = "utf8"
    )]
    pub file_encoding: EncodingArg,

    /// Regex matching the first line of a multi-line record
    #[arg(long, env = "TAILPIPE_FILE_LINE_START_PATTERN")]
    pub file_line_start_pattern: Option<String>,

    /// Regex matching the last line of a multi-line record
    #[arg(long, env = "TAILPIPE_FILE_LINE_END_PATTERN")]
    pub file_line_end_pattern: Option<String>,

    /// How long a stalled partial record may wait before being emitted; 0 disables
    #[arg(long, env = "TAILPIPE_FILE_FORCE_FLUSH_PERIOD", default_value = "500ms", value_parser = humantime::parse_duration)]
    pub file_force_flush_period: Duration,

    /// Attach the file name to each record
    #[arg(
        long,
        env = "TAILPIPE_FILE_INCLUDE_FILE_NAME",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub file_include_file_name: bool,

    /// Attach the file path to each record
    #[arg(
        long,
        env = "TAILPIPE_FILE_INCLUDE_FILE_PATH",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    pub file_include_file_path: bool,

    /// Attach the symlink-resolved file name to each record
    #[arg(
        long,
        env = "TAILPIPE_FILE_INCLUDE_FILE_NAME_RESOLVED",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    pub file_include_file_name_resolved: bool,

    /// Attach the symlink-resolved file path to each record
    #[arg(
        long,
        env = "TAILPIPE_FILE_INCLUDE_FILE_PATH_RESOLVED",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    pub file_include_file_path_resolved: bool,

    /// Path to persist read offsets across restarts; omit for in-memory only
    #[arg(long, env = "TAILPIPE_CHECKPOINT_PATH")]
    pub checkpoint_path: Option<PathBuf>,
}

impl AgentRun {
    pub fn file_source_config(&self) -> FileSourceConfig {
        FileSourceConfig {
            include: self.file_include.clone(),
            exclude: self.file_exclude.clone(),
            poll_interval: self.file_poll_interval,
            start_at: self.file_start_at.into(),
            fingerprint_size: self.file_fingerprint_size,
            max_log_size: self.file_max_log_size,
            max_concurrent_files: self.file_max_concurrent_files,
            encoding: self.file_encoding.into(),
            line_start_pattern: self.file_line_start_pattern.clone(),
            line_end_pattern: self.file_line_end_pattern.clone(),
            force_flush_period: self.file_force_flush_period,
            include_file_name: self.file_include_file_name,
            include_file_path: self.file_include_file_path,
            include_file_name_resolved: self.file_include_file_name_resolved,
            include_file_path_resolved: self.file_include_file_path_resolved,
            ..Default::default()
        }
    }
}
