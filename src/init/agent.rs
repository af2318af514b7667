// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::exporters::stdout::StdoutExporter;
use crate::init::args::AgentRun;
use crate::init::wait;
use crate::pipeline::{self, SourceRegistry};
use crate::storage::{JsonFileStorage, MemoryStorage, Storage};

const SOURCES_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const EXPORTERS_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

pub struct Agent {
    config: Box<AgentRun>,
    sending_queue_size: usize,
}

impl Agent {
    pub fn new(config: Box<AgentRun>, sending_queue_size: usize) -> Self {
        Self {
            config,
            sending_queue_size,
        }
    }

    pub async fn run(
        self,
        agent_cancel: CancellationToken,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let config = self.config;

        info!("Starting tailpipe.");

        let storage: Arc<dyn Storage> = match &config.checkpoint_path {
            Some(path) => {
                info!(path = ?path, "using file-backed checkpoint storage");
                Arc::new(JsonFileStorage::open(path)?)
            }
            None => Arc::new(MemoryStorage::new()),
        };

        let mut sources_task_set = JoinSet::new();
        let mut exporters_task_set = JoinSet::new();
        let sources_cancel = CancellationToken::new();
        let exporters_cancel = CancellationToken::new();

        let (entry_output, entry_rx) = pipeline::channel(self.sending_queue_size);

        let registry = build_source_registry(&config);
        registry.build(
            "file",
            entry_output,
            storage,
            &mut sources_task_set,
            &sources_cancel,
        )?;

        let mut exporter = StdoutExporter::new(entry_rx);
        let exporter_cancel = exporters_cancel.clone();
        exporters_task_set.spawn(async move {
            exporter.start(exporter_cancel).await;
            Ok(())
        });

        let mut run_error: Result<(), Box<dyn Error + Send + Sync>> = Ok(());
        select! {
            _ = agent_cancel.cancelled() => info!("Shutting down agent."),
            res = wait::wait_for_any_task(&mut sources_task_set) => {
                match res {
                    Ok(()) => error!("Unexpected early exit of source."),
                    Err(e) => run_error = Err(e),
                }
            },
            res = wait::wait_for_any_task(&mut exporters_task_set) => {
                match res {
                    Ok(()) => error!("Unexpected early exit of exporter."),
                    Err(e) => run_error = Err(e),
                }
            },
        }

        // Stop sources first so they checkpoint and release the pipeline,
        // then let the exporter drain what remains
        sources_cancel.cancel();
        if let Err(e) =
            wait::wait_for_tasks_with_timeout(&mut sources_task_set, SOURCES_SHUTDOWN_TIMEOUT)
                .await
        {
            error!(error = e, "Sources failed to stop cleanly.");
        }

        exporters_cancel.cancel();
        if let Err(e) =
            wait::wait_for_tasks_with_timeout(&mut exporters_task_set, EXPORTERS_SHUTDOWN_TIMEOUT)
                .await
        {
            error!(error = e, "Exporters failed to stop cleanly.");
        }

        run_error
    }
}

/// The set of known source kinds. Sources are wired in explicitly here;
/// there is no ambient registration.
fn build_source_registry(config: &AgentRun) -> SourceRegistry {
    let mut registry = SourceRegistry::new();

    let file_config = config.file_source_config();
    registry.register(
        "file",
        Box::new(move |output, storage, task_set, cancel| {
            let manager = file_config.clone().build(output, storage)?;
            manager.start(task_set, cancel)?;
            Ok(())
        }),
    );

    registry
}
