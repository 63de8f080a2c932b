//! Directory watcher that turns new office documents into conversion jobs
//!
//! OS events arrive on notify's own thread. The callback only forwards them
//! over a channel; a single translator task filters them and enqueues jobs.

use crate::config::WatchConfig;
use crate::observability::Metrics;
use crate::queue::{ConversionJob, JobSender};
use notify::event::CreateKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to watch {}: {source}", .path.display())]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Build the job for a newly created file, if its extension qualifies
///
/// `input/report.docx` with output dir `output` becomes
/// `input/report.docx -> output/report.pdf`.
pub fn job_for_path(path: &Path, output_dir: &Path, extensions: &[String]) -> Option<ConversionJob> {
    let extension = path.extension()?.to_str()?;
    if !extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(extension))
    {
        return None;
    }

    // Only the last extension goes: `q3.final.pptx` -> `q3.final.pdf`
    let mut name = path.file_stem()?.to_os_string();
    name.push(".pdf");

    Some(ConversionJob::new(path, output_dir.join(name)))
}

/// Running watch on the input directory
///
/// Dropping it (or calling [`DirectoryWatcher::stop`]) unregisters the OS
/// watch, which ends the translator task.
pub struct DirectoryWatcher {
    watcher: RecommendedWatcher,
    translator: JoinHandle<()>,
}

impl DirectoryWatcher {
    /// Create the input/output directories and start watching
    pub fn start(
        config: &WatchConfig,
        sender: JobSender,
        metrics: Arc<Metrics>,
    ) -> Result<Self, WatchError> {
        for dir in [&config.input_dir, &config.output_dir] {
            std::fs::create_dir_all(dir).map_err(|source| WatchError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            // Receiver gone means we are shutting down
            let _ = event_tx.send(event);
        })
        .map_err(|source| WatchError::Notify {
            path: config.input_dir.clone(),
            source,
        })?;

        watcher
            .watch(&config.input_dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Notify {
                path: config.input_dir.clone(),
                source,
            })?;

        let translator = tokio::spawn(translate(
            event_rx,
            config.output_dir.clone(),
            config.extensions.clone(),
            sender,
            metrics,
        ));

        info!(
            input = %config.input_dir.display(),
            output = %config.output_dir.display(),
            extensions = ?config.extensions,
            "Watching for new documents"
        );

        Ok(Self { watcher, translator })
    }

    /// Stop watching and wait for queued events to be translated
    pub async fn stop(self) {
        let Self { watcher, translator } = self;
        drop(watcher);
        if let Err(e) = translator.await {
            warn!(error = %e, "Watcher translator task failed");
        }
    }
}

async fn translate(
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    output_dir: PathBuf,
    extensions: Vec<String>,
    sender: JobSender,
    metrics: Arc<Metrics>,
) {
    while let Some(event) = events.recv().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Filesystem watch error");
                continue;
            }
        };

        match event.kind {
            EventKind::Create(CreateKind::Folder) => continue,
            EventKind::Create(_) => {}
            _ => continue,
        }

        for path in &event.paths {
            let Some(job) = job_for_path(path, &output_dir, &extensions) else {
                debug!(path = %path.display(), "Ignoring non-document file");
                continue;
            };

            let input = job.input().display().to_string();
            let output = job.output().display().to_string();
            let seq = sender.enqueue(job);
            metrics.job_enqueued();

            info!(seq, input, output, "Conversion queued");
        }
    }

    debug!("Watcher translator stopped");
}
