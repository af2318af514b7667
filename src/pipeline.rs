// SPDX-License-Identifier: Apache-2.0

//! Pipeline plumbing between stages.
//!
//! Stages are connected by bounded channels. Input stages get a clonable
//! [`EntryOutput`] handle and may write to it from any number of concurrent
//! workers; downstream stages drain the matching receiver.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::BoxError;

use crate::bounded_channel::{self, BoundedReceiver, BoundedSender, SendError};
use crate::entry::Entry;
use crate::storage::Storage;

/// Write half of a stage connection. Safe to clone into concurrent workers.
#[derive(Clone)]
pub struct EntryOutput {
    tx: BoundedSender<Entry>,
}

impl EntryOutput {
    /// Write one entry downstream, applying backpressure if the next stage
    /// is behind. Fails only once the downstream stage is gone.
    pub async fn write(&self, entry: Entry) -> Result<(), SendError> {
        self.tx.send(entry).await
    }
}

/// Create a connected output/receiver pair with the given capacity.
pub fn channel(capacity: usize) -> (EntryOutput, BoundedReceiver<Entry>) {
    let (tx, rx) = bounded_channel::bounded(capacity);
    (EntryOutput { tx }, rx)
}

/// Constructor for an input stage: wires the stage into the supplied task
/// set, writing entries into `output`.
pub type SourceFactory = Box<
    dyn Fn(
            EntryOutput,
            Arc<dyn Storage>,
            &mut JoinSet<Result<(), BoxError>>,
            &CancellationToken,
        ) -> Result<(), BoxError>
        + Send,
>;

/// Registry of input-stage constructors.
///
/// Populated explicitly by the bootstrap step and passed into the agent,
/// rather than filled through ambient global registration.
#[derive(Default)]
pub struct SourceRegistry {
    factories: HashMap<String, SourceFactory>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, factory: SourceFactory) {
        self.factories.insert(kind.into(), factory);
    }

    /// Build and start the source of the given kind.
    pub fn build(
        &self,
        kind: &str,
        output: EntryOutput,
        storage: Arc<dyn Storage>,
        task_set: &mut JoinSet<Result<(), BoxError>>,
        cancel: &CancellationToken,
    ) -> Result<(), BoxError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| format!("unknown source kind `{kind}`"))?;
        factory(output, storage, task_set, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_output_write_and_drain() {
        let (output, mut rx) = channel(4);

        output.write(Entry::new("one")).await.unwrap();
        output.write(Entry::new("two")).await.unwrap();

        assert_eq!(rx.next().await.unwrap().body, "one");
        assert_eq!(rx.next().await.unwrap().body, "two");
    }

    #[tokio::test]
    async fn test_output_fails_after_receiver_drop() {
        let (output, rx) = channel(1);
        drop(rx);
        assert!(output.write(Entry::new("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_registry_unknown_kind() {
        let registry = SourceRegistry::new();
        let (output, _rx) = channel(1);
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let mut task_set = JoinSet::new();
        let cancel = CancellationToken::new();

        let err = registry
            .build("file", output, storage, &mut task_set, &cancel)
            .unwrap_err();
        assert!(err.to_string().contains("unknown source kind"));
    }

    #[tokio::test]
    async fn test_registry_invokes_factory() {
        let mut registry = SourceRegistry::new();
        registry.register(
            "noop",
            Box::new(|_output, _storage, task_set, _cancel| {
                task_set.spawn(async { Ok(()) });
                Ok(())
            }),
        );

        let (output, _rx) = channel(1);
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let mut task_set = JoinSet::new();
        let cancel = CancellationToken::new();

        registry
            .build("noop", output, storage, &mut task_set, &cancel)
            .unwrap();
        assert_eq!(task_set.len(), 1);
    }
}
