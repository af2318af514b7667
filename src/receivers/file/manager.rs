// SPDX-License-Identifier: Apache-2.0

//! The poll loop: discovery, identity resolution, bounded-concurrency
//! reading, and checkpoint persistence.
//!
//! All tracking state is owned by the poll task. Reader workers run only
//! while the poll task is blocked joining them, so no reader is ever
//! touched from two tasks at once and no locks are needed.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::select;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, info, warn};

use crate::receivers::file::checkpoint::{self, CheckpointEntry};
use crate::receivers::file::config::FileSourceConfig;
use crate::receivers::file::error::Result;
use crate::receivers::file::finder::Finder;
use crate::receivers::file::fingerprint::Fingerprint;
use crate::receivers::file::reader::{Reader, ReaderSettings};
use crate::receivers::file::tracker::{ReaderId, Tracker};
use crate::storage::Storage;

pub struct Manager {
    config: FileSourceConfig,
    finder: Finder,
    settings: Arc<ReaderSettings>,
    tracker: Tracker,
    storage: Arc<dyn Storage>,
    first_cycle: bool,
}

impl Manager {
    pub(crate) fn new(
        config: FileSourceConfig,
        finder: Finder,
        settings: Arc<ReaderSettings>,
        storage: Arc<dyn Storage>,
        chain_limit: usize,
    ) -> Self {
        Self {
            config,
            finder,
            settings,
            tracker: Tracker::new(chain_limit),
            storage,
            first_cycle: true,
        }
    }

    /// Restore the checkpoint and start the poll loop. Checkpoint
    /// corruption is fatal here: offsets cannot be trusted, so refusing
    /// to run beats silently re-reading or skipping data.
    pub fn start(
        mut self,
        task_set: &mut JoinSet<std::result::Result<(), BoxError>>,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), BoxError> {
        self.restore()?;

        info!(
            include = ?self.config.include,
            exclude = ?self.config.exclude,
            restored = self.tracker.len(),
            "starting file source"
        );

        let cancel = cancel.clone();
        task_set.spawn(async move { self.run(cancel).await });
        Ok(())
    }

    async fn run(mut self, cancel: CancellationToken) -> std::result::Result<(), BoxError> {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once(&cancel).await {
                        if cancel.is_cancelled() {
                            break;
                        }
                        return Err(e.into());
                    }
                }
            }
        }

        // Final checkpoint, then release every handle
        self.persist();
        self.tracker.close_all();
        info!("file source stopped");
        Ok(())
    }

    /// One poll cycle: discovery + admission, queue rotation, bounded
    /// concurrent reads, checkpoint.
    async fn poll_once(&mut self, cancel: &CancellationToken) -> Result<()> {
        let paths = self.finder.find();
        if self.first_cycle && paths.is_empty() {
            warn!(
                include = ?self.config.include,
                "no files match the configured include patterns"
            );
        }

        // Admission is sequential: fingerprinting is cheap and must not
        // race with cross-path matching.
        for path in paths {
            self.admit(path);
        }
        self.first_cycle = false;

        self.tracker.refill_queue();
        let batch = self.tracker.check_out(self.config.max_concurrent_files);

        let mut workers: JoinSet<(ReaderId, Reader, Result<()>)> = JoinSet::new();
        let mut outstanding: Vec<ReaderId> = Vec::with_capacity(batch.len());
        for (id, mut reader) in batch {
            outstanding.push(id);
            let worker_cancel = cancel.clone();
            workers.spawn(async move {
                let result = reader.read_to_end(&worker_cancel).await;
                (id, reader, result)
            });
        }

        // Block until every worker of this cycle is done; cycles never
        // overlap, so concurrency stays capped.
        let mut fatal = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((id, reader, result)) => {
                    if let Err(e) = result {
                        match e {
                            e @ crate::receivers::file::Error::PipelineClosed => fatal = Some(e),
                            e => warn!(
                                path = ?reader.path(),
                                error = %e,
                                "file read failed, will retry next cycle"
                            ),
                        }
                    }
                    outstanding.retain(|o| *o != id);
                    self.tracker.check_in(id, reader);
                }
                Err(e) => warn!(error = %e, "reader worker panicked"),
            }
        }
        // A panicked worker took its reader with it; drop every reference
        // so the path can be re-admitted instead of vanishing from the
        // checkpoint.
        for id in outstanding {
            self.tracker.discard(id);
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        self.persist();
        Ok(())
    }

    /// Resolve one discovered path against everything we track.
    fn admit(&mut self, path: PathBuf) {
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                debug!(path = ?path, error = %e, "failed to open discovered file");
                return;
            }
        };

        let fp = match Fingerprint::read(&file, self.settings.fingerprint_size) {
            Ok(fp) => fp,
            Err(e) => {
                warn!(path = ?path, error = %e, "failed to fingerprint file");
                return;
            }
        };
        if fp.is_empty() {
            // Not yet distinguishable; retry next cycle
            return;
        }

        let matched = self
            .tracker
            .find_match(&fp)
            .map(|(id, r)| (id, r.path().to_path_buf(), r.offset(), r.has_handle()));

        match matched {
            None => {
                // Brand-new file. Files appearing after startup are new
                // data and always read from the beginning.
                let mut reader =
                    Reader::new(self.settings.clone(), path.clone(), Some(file), fp, 0);
                if self.first_cycle {
                    if let Err(e) = reader.initialize_offset(self.config.start_at) {
                        warn!(path = ?path, error = %e, "failed to initialize offset");
                        return;
                    }
                }
                debug!(path = ?path, "tracking new file");
                self.tracker.insert(reader);
            }
            Some((_, old_path, _, true)) if old_path == path => {
                // Already tailing this file; drop the duplicate handle.
            }
            Some((id, old_path, offset, _)) => {
                // Same content under a different path (rename/rotation),
                // or a placeholder from a checkpoint finally re-appearing:
                // the successor inherits the offset.
                if old_path != path {
                    info!(from = ?old_path, to = ?path, offset, "detected file rotation");
                }
                self.tracker.remove(id);
                let reader = Reader::new(self.settings.clone(), path, Some(file), fp, offset);
                self.tracker.insert(reader);
            }
        }
    }

    fn restore(&mut self) -> Result<()> {
        let bytes = match self.storage.get(&self.config.checkpoint_key)? {
            None => {
                debug!("no checkpoint found, cold start");
                return Ok(());
            }
            Some(bytes) => bytes,
        };

        let entries = checkpoint::decode(&bytes)?;
        for entry in entries {
            let file = File::open(&entry.path).ok();
            if file.is_none() {
                // Keep a placeholder so a matching fingerprint discovered
                // elsewhere still continues this lineage.
                debug!(path = ?entry.path, "checkpointed file missing, tracking placeholder");
            }
            // The persisted fingerprint is trusted as-is to preserve
            // identity continuity.
            let reader = Reader::new(
                self.settings.clone(),
                entry.path,
                file,
                Fingerprint::from_bytes(entry.fingerprint),
                entry.offset,
            );
            self.tracker.insert(reader);
        }

        info!(files = self.tracker.len(), "restored file checkpoint");
        Ok(())
    }

    fn persist(&self) {
        let entries: Vec<CheckpointEntry> = self
            .tracker
            .newest_per_path()
            .map(|reader| CheckpointEntry {
                path: reader.path().to_path_buf(),
                fingerprint: reader.fingerprint().bytes().to_vec(),
                offset: reader.offset(),
            })
            .collect();

        let result = if entries.is_empty() {
            self.storage.delete(&self.config.checkpoint_key)
        } else {
            self.storage
                .set(&self.config.checkpoint_key, &checkpoint::encode(&entries))
        };

        if let Err(e) = result {
            warn!(error = %e, "failed to persist file checkpoint");
        }
    }
}
