// SPDX-License-Identifier: Apache-2.0

//! Reader registry: one arena of Readers keyed by stable ids, with
//! per-path rotation chains and the round-robin work queue holding ids
//! into the arena. Eviction is a single authoritative removal.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::receivers::file::reader::Reader;

/// Bound on how many rotated generations one path may accumulate.
pub const DEFAULT_ROTATION_CHAIN_LIMIT: usize = 10;

/// Stable handle into the reader arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReaderId(u64);

#[derive(Default)]
pub struct Tracker {
    next_id: u64,
    readers: HashMap<ReaderId, Reader>,
    /// Per-path generations, oldest first.
    chains: HashMap<PathBuf, Vec<ReaderId>>,
    queue: VecDeque<ReaderId>,
    chain_limit: usize,
}

impl Tracker {
    pub fn new(chain_limit: usize) -> Self {
        Self {
            chain_limit,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    /// Register a reader, appending it to its path's rotation chain. If
    /// the chain exceeds the bound, the oldest generation is evicted -
    /// deliberately lossy, bounding resource usage.
    pub fn insert(&mut self, reader: Reader) -> ReaderId {
        let id = ReaderId(self.next_id);
        self.next_id += 1;

        let path = reader.path().to_path_buf();
        self.readers.insert(id, reader);

        let chain = self.chains.entry(path.clone()).or_default();
        chain.push(id);
        let evict = (chain.len() > self.chain_limit).then(|| chain[0]);

        if let Some(oldest) = evict {
            warn!(
                path = ?path,
                limit = self.chain_limit,
                "rotation chain limit exceeded, dropping oldest generation"
            );
            self.remove(oldest);
        }

        id
    }

    /// Remove a reader from the arena, its chain, and the work queue,
    /// closing its handle. Returns the removed reader.
    pub fn remove(&mut self, id: ReaderId) -> Option<Reader> {
        let mut reader = self.readers.remove(&id)?;
        reader.close();

        let mut chain_empty = false;
        if let Some(chain) = self.chains.get_mut(reader.path()) {
            chain.retain(|r| *r != id);
            chain_empty = chain.is_empty();
        }
        if chain_empty {
            self.chains.remove(reader.path());
        }

        self.queue.retain(|r| *r != id);
        Some(reader)
    }

    /// Find a tracked reader, under any path, whose fingerprint is a
    /// prefix of `fp`. When several candidates match, the newest one wins,
    /// so a live reader beats a stale restored placeholder.
    pub fn find_match(
        &self,
        fp: &crate::receivers::file::fingerprint::Fingerprint,
    ) -> Option<(ReaderId, &Reader)> {
        let mut ids: Vec<ReaderId> = self.readers.keys().copied().collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.into_iter().find_map(|id| {
            let reader = self.readers.get(&id)?;
            fp.starts_with(reader.fingerprint()).then_some((id, reader))
        })
    }

    pub fn get(&self, id: ReaderId) -> Option<&Reader> {
        self.readers.get(&id)
    }

    /// Purge every reference to an id whose reader never came back from a
    /// worker. A dangling id left in a chain would hide its path from
    /// [`Tracker::newest_per_path`] and so from every future checkpoint.
    pub fn discard(&mut self, id: ReaderId) {
        if self.remove(id).is_some() {
            return;
        }
        self.chains.retain(|_, chain| {
            chain.retain(|r| *r != id);
            !chain.is_empty()
        });
        self.queue.retain(|r| *r != id);
    }

    /// Refill the work queue from the full tracked set once it empties,
    /// i.e. once every member has had a turn. Ids are enqueued in
    /// insertion order so round-robin order is stable across cycles.
    pub fn refill_queue(&mut self) {
        if !self.queue.is_empty() {
            return;
        }
        let mut ids: Vec<ReaderId> = self.readers.keys().copied().collect();
        ids.sort();
        self.queue.extend(ids);
    }

    /// Check out up to `max` readers for this cycle's workers. Checked-out
    /// readers leave the arena; chains keep referencing them and they must
    /// be returned with [`Tracker::check_in`] before the next admission.
    pub fn check_out(&mut self, max: usize) -> Vec<(ReaderId, Reader)> {
        let n = max.min(self.readers.len()).min(self.queue.len());
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let Some(id) = self.queue.pop_front() else {
                break;
            };
            if let Some(reader) = self.readers.remove(&id) {
                out.push((id, reader));
            }
        }
        out
    }

    /// Return a checked-out reader to the arena.
    pub fn check_in(&mut self, id: ReaderId, reader: Reader) {
        self.readers.insert(id, reader);
    }

    /// The newest generation of every path, for checkpointing.
    pub fn newest_per_path(&self) -> impl Iterator<Item = &Reader> {
        self.chains
            .values()
            .filter_map(|chain| chain.last())
            .filter_map(|id| self.readers.get(id))
    }

    /// Close every handle and clear all tracking state.
    pub fn close_all(&mut self) {
        for reader in self.readers.values_mut() {
            reader.close();
        }
        self.readers.clear();
        self.chains.clear();
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline;
    use crate::receivers::file::config::StartAt;
    use crate::receivers::file::decode::Encoding;
    use crate::receivers::file::fingerprint::Fingerprint;
    use crate::receivers::file::reader::ReaderSettings;
    use crate::receivers::file::splitter::Splitter;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_settings() -> Arc<ReaderSettings> {
        let (output, rx) = pipeline::channel(1);
        // Receiver is dropped; these readers are never driven
        drop(rx);
        Arc::new(ReaderSettings {
            fingerprint_size: 1000,
            max_log_size: 1024,
            splitter: Splitter::Newline,
            encoding: Encoding::Utf8,
            force_flush_period: Duration::ZERO,
            include_file_name: false,
            include_file_path: false,
            include_file_name_resolved: false,
            include_file_path_resolved: false,
            output,
        })
    }

    fn reader(settings: &Arc<ReaderSettings>, path: &str, fp: &[u8]) -> Reader {
        let mut r = Reader::new(
            settings.clone(),
            PathBuf::from(path),
            None,
            Fingerprint::from_bytes(fp.to_vec()),
            0,
        );
        r.initialize_offset(StartAt::Beginning).unwrap();
        r
    }

    #[test]
    fn test_insert_and_match_across_paths() {
        let settings = test_settings();
        let mut tracker = Tracker::new(DEFAULT_ROTATION_CHAIN_LIMIT);
        tracker.insert(reader(&settings, "/var/log/a.log", b"alpha content"));
        tracker.insert(reader(&settings, "/var/log/b.log", b"bravo content"));

        // A grown fingerprint of file A matches no matter which path it
        // now lives under
        let grown = Fingerprint::from_bytes(b"alpha content, extended".to_vec());
        let (_, matched) = tracker.find_match(&grown).unwrap();
        assert_eq!(matched.path(), Path::new("/var/log/a.log"));

        let unknown = Fingerprint::from_bytes(b"charlie".to_vec());
        assert!(tracker.find_match(&unknown).is_none());
    }

    #[test]
    fn test_find_match_prefers_newest_candidate() {
        let settings = test_settings();
        let mut tracker = Tracker::new(10);
        // A restored placeholder and a live reader share the same prefix
        tracker.insert(reader(&settings, "/var/log/a.log.1", b"shared prefix content"));
        let newest = tracker.insert(reader(&settings, "/var/log/a.log", b"shared prefix content"));

        let fp = Fingerprint::from_bytes(b"shared prefix content grown".to_vec());
        let (id, matched) = tracker.find_match(&fp).unwrap();
        assert_eq!(id, newest);
        assert_eq!(matched.path(), Path::new("/var/log/a.log"));
    }

    #[test]
    fn test_discard_purges_dangling_checked_out_id() {
        let settings = test_settings();
        let mut tracker = Tracker::new(10);
        let lost = tracker.insert(reader(&settings, "/var/log/a.log", b"file a content"));
        tracker.insert(reader(&settings, "/var/log/b.log", b"file b content"));
        tracker.refill_queue();

        // One checked-out reader never comes back
        let batch = tracker.check_out(2);
        for (id, r) in batch {
            if id != lost {
                tracker.check_in(id, r);
            }
        }

        tracker.discard(lost);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.newest_per_path().count(), 1);

        // The path is free to be tracked again as a fresh lineage
        tracker.insert(reader(&settings, "/var/log/a.log", b"file a content"));
        assert_eq!(tracker.newest_per_path().count(), 2);
    }

    #[test]
    fn test_chain_bound_evicts_oldest() {
        let settings = test_settings();
        let mut tracker = Tracker::new(3);

        let first = tracker.insert(reader(&settings, "/var/log/a.log", b"gen 0 content"));
        for gen in 1..=3 {
            let fp = format!("gen {gen} content");
            tracker.insert(reader(&settings, "/var/log/a.log", fp.as_bytes()));
        }

        assert_eq!(tracker.len(), 3);
        assert!(tracker.get(first).is_none());
        // The oldest generation no longer matches
        let fp = Fingerprint::from_bytes(b"gen 0 content and more".to_vec());
        assert!(tracker.find_match(&fp).is_none());
    }

    #[test]
    fn test_remove_clears_chain_and_queue() {
        let settings = test_settings();
        let mut tracker = Tracker::new(10);
        let id = tracker.insert(reader(&settings, "/var/log/a.log", b"some content"));
        tracker.refill_queue();

        let removed = tracker.remove(id).unwrap();
        assert!(!removed.has_handle());
        assert!(tracker.is_empty());
        assert!(tracker.check_out(10).is_empty());
        assert!(tracker.newest_per_path().next().is_none());
    }

    #[test]
    fn test_check_out_is_bounded() {
        let settings = test_settings();
        let mut tracker = Tracker::new(10);
        for i in 0..5 {
            let path = format!("/var/log/{i}.log");
            let fp = format!("file {i} content");
            tracker.insert(reader(&settings, &path, fp.as_bytes()));
        }

        tracker.refill_queue();
        let batch = tracker.check_out(2);
        assert_eq!(batch.len(), 2);

        for (id, r) in batch {
            tracker.check_in(id, r);
        }
    }

    #[test]
    fn test_round_robin_across_refills() {
        let settings = test_settings();
        let mut tracker = Tracker::new(10);
        for i in 0..3 {
            let path = format!("/var/log/{i}.log");
            let fp = format!("file {i} content");
            tracker.insert(reader(&settings, &path, fp.as_bytes()));
        }

        let mut turns: Vec<PathBuf> = Vec::new();
        for _ in 0..4 {
            tracker.refill_queue();
            let batch = tracker.check_out(2);
            for (id, r) in batch {
                turns.push(r.path().to_path_buf());
                tracker.check_in(id, r);
            }
        }

        // Four dispatches of at most two over three files: every file
        // served exactly twice, none starved
        assert_eq!(turns.len(), 6);
        for i in 0..3 {
            let path = PathBuf::from(format!("/var/log/{i}.log"));
            assert_eq!(turns.iter().filter(|p| **p == path).count(), 2);
        }
    }

    #[test]
    fn test_newest_per_path() {
        let settings = test_settings();
        let mut tracker = Tracker::new(10);
        tracker.insert(reader(&settings, "/var/log/a.log", b"old generation"));
        let newest = tracker.insert(reader(&settings, "/var/log/a.log", b"new generation"));
        tracker.insert(reader(&settings, "/var/log/b.log", b"other content"));

        let newest_fps: Vec<&[u8]> = tracker
            .newest_per_path()
            .map(|r| r.fingerprint().bytes())
            .collect();
        assert_eq!(newest_fps.len(), 2);
        assert!(newest_fps.contains(&&b"new generation"[..]));
        assert!(newest_fps.contains(&&b"other content"[..]));
        assert_eq!(
            tracker.get(newest).unwrap().fingerprint().bytes(),
            b"new generation"
        );
    }
}
