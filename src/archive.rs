//! In-memory ZIP assembly.
//!
//! [`ArchiveWriter`] drives a `zip::ZipWriter` on a dedicated blocking task
//! so compression never stalls the async runtime. The completion signal is
//! created when the writer is spawned, before any append or finalize is
//! triggered, and is what callers await for the final bytes; the sink may
//! complete in the same breath as the finalize command, and a listener
//! registered afterwards would miss it.
//!
//! [`EntryNamer`] produces collision-safe archive entry names for files that
//! share a display name within one job.

use std::collections::HashMap;
use std::io::{Cursor, Write};

use tokio::sync::{mpsc, oneshot};
use zip::write::FileOptions;

use crate::error::{Error, Result};

enum Command {
    Append {
        name: String,
        data: Vec<u8>,
        ack: oneshot::Sender<std::result::Result<(), String>>,
    },
    Finish,
}

/// Awaitable signal resolving to the archive's final bytes.
///
/// Created at spawn time, before the first write. Resolves once the blocking
/// writer has finalized the central directory and fully drained its sink.
pub struct CompletionSignal {
    rx: oneshot::Receiver<std::result::Result<Vec<u8>, String>>,
}

impl CompletionSignal {
    /// Wait for the archive to finish, returning the complete ZIP bytes.
    pub async fn wait(self) -> Result<Vec<u8>> {
        match self.rx.await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) => Err(Error::Other(format!("archive writer failed: {}", e))),
            Err(_) => Err(Error::Other(
                "archive writer dropped before completing".to_string(),
            )),
        }
    }
}

/// Handle to the blocking ZIP assembly task
pub struct ArchiveWriter {
    cmd_tx: mpsc::Sender<Command>,
}

impl ArchiveWriter {
    /// Spawn the writer task.
    ///
    /// Returns the command handle and the completion signal. Callers must
    /// hold the signal from before the first `append` through `finish`, and
    /// await it rather than `finish`'s own return.
    pub fn spawn() -> (Self, CompletionSignal) {
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(32);
        let (done_tx, done_rx) = oneshot::channel();

        tokio::task::spawn_blocking(move || {
            let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
            let options =
                FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
            let mut failure: Option<String> = None;
            let mut finish_requested = false;

            while let Some(cmd) = cmd_rx.blocking_recv() {
                match cmd {
                    Command::Append { name, data, ack } => {
                        let result = if let Some(e) = &failure {
                            Err(e.clone())
                        } else {
                            append_entry(&mut writer, &name, &data, options)
                        };
                        if let Err(e) = &result {
                            failure.get_or_insert_with(|| e.clone());
                        }
                        ack.send(result).ok();
                    }
                    Command::Finish => {
                        finish_requested = true;
                        break;
                    }
                }
            }

            // A dropped handle without an explicit finish is an abandoned
            // archive; resolve the signal with an error either way so no
            // awaiter hangs.
            let outcome = match failure {
                Some(e) => Err(e),
                None if !finish_requested => Err("archive abandoned before finish".to_string()),
                None => writer
                    .finish()
                    .map(|cursor| cursor.into_inner())
                    .map_err(|e| format!("failed to finalize archive: {}", e)),
            };
            done_tx.send(outcome).ok();
        });

        (Self { cmd_tx }, CompletionSignal { rx: done_rx })
    }

    /// Append one file's bytes under the given entry name.
    pub async fn append(&self, name: String, data: Vec<u8>) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Append {
                name,
                data,
                ack: ack_tx,
            })
            .await
            .map_err(|_| Error::Other("archive writer task is gone".to_string()))?;

        match ack_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Other(format!("archive append failed: {}", e))),
            Err(_) => Err(Error::Other("archive writer task is gone".to_string())),
        }
    }

    /// Trigger finalization.
    ///
    /// This only issues the command; the archive is done when the completion
    /// signal captured at spawn time resolves.
    pub async fn finish(self) -> Result<()> {
        self.cmd_tx
            .send(Command::Finish)
            .await
            .map_err(|_| Error::Other("archive writer task is gone".to_string()))
    }
}

fn append_entry(
    writer: &mut zip::ZipWriter<Cursor<Vec<u8>>>,
    name: &str,
    data: &[u8],
    options: FileOptions,
) -> std::result::Result<(), String> {
    writer
        .start_file(name, options)
        .map_err(|e| format!("failed to start entry '{}': {}", name, e))?;
    writer
        .write_all(data)
        .map_err(|e| format!("failed to write entry '{}': {}", name, e))?;
    Ok(())
}

/// Collision-safe archive entry naming.
///
/// Tracks per-job usage counts per base filename; repeats get `_<n>`
/// inserted immediately before the extension (or appended when there is
/// none), guaranteeing unique entry names within one archive.
#[derive(Default)]
pub struct EntryNamer {
    counts: HashMap<String, u32>,
}

impl EntryNamer {
    /// Create a namer with no names used yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a unique entry name for `base`.
    ///
    /// The first use of a name keeps it untouched; the n-th repeat becomes
    /// `stem_<n>.ext`.
    pub fn unique_name(&mut self, base: &str) -> String {
        let seen = self.counts.entry(base.to_string()).or_insert(0);
        let n = *seen;
        *seen += 1;

        if n == 0 {
            return base.to_string();
        }

        // A leading dot is a hidden-file marker, not an extension separator
        match base.rfind('.').filter(|&idx| idx > 0) {
            Some(idx) => format!("{}_{}{}", &base[..idx], n, &base[idx..]),
            None => format!("{}_{}", base, n),
        }
    }
}
