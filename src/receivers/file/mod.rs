// SPDX-License-Identifier: Apache-2.0

//! File-tailing input: glob discovery, fingerprint-based identity across
//! renames and rotations, durable per-file offsets, bounded-concurrency
//! reading, and multi-line record tokenization.

pub mod checkpoint;
pub mod config;
pub mod decode;
pub mod error;
pub mod finder;
pub mod fingerprint;
pub mod flusher;
pub mod manager;
pub mod reader;
pub mod splitter;
pub mod tracker;

pub use config::{FileSourceConfig, StartAt};
pub use error::{Error, Result};
pub use manager::Manager;
