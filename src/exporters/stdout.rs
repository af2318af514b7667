// SPDX-License-Identifier: Apache-2.0

//! Terminal exporter: drains the pipeline and prints each entry as one
//! JSON object per line.

use std::io::Write;

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bounded_channel::BoundedReceiver;
use crate::entry::Entry;

pub struct StdoutExporter<W: Write> {
    rx: BoundedReceiver<Entry>,
    writer: W,
}

impl StdoutExporter<std::io::Stdout> {
    pub fn new(rx: BoundedReceiver<Entry>) -> Self {
        StdoutExporter {
            rx,
            writer: std::io::stdout(),
        }
    }
}

impl<W: Write> StdoutExporter<W> {
    pub fn with_writer(rx: BoundedReceiver<Entry>, writer: W) -> Self {
        StdoutExporter { rx, writer }
    }

    pub async fn start(&mut self, cancel_token: CancellationToken) {
        loop {
            select! {
                e = self.rx.next() => match e {
                    Some(entry) => self.export(entry),
                    None => break,
                },
                _ = cancel_token.cancelled() => break,
            }
        }

        // Drain whatever the sources managed to hand off before stopping
        while let Some(entry) = self.rx.try_recv() {
            self.export(entry);
        }
        if let Err(e) = self.writer.flush() {
            warn!(error = %e, "failed to flush output");
        }
        debug!("exiting stdout exporter")
    }

    fn export(&mut self, entry: Entry) {
        match serde_json::to_string(&entry) {
            Ok(line) => {
                if let Err(e) = writeln!(self.writer, "{}", line) {
                    warn!(error = %e, "failed to write entry");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize entry"),
        }
    }
}
