//! Activity logger: a dedicated thread that owns the `JsonlWriter`.
//!
//! Scanner and pruner send `ActivityEvent`s through a bounded crossbeam channel.
//! `try_send()` keeps a slow or degraded log from ever stalling a deletion pass;
//! events that do not fit are counted and reported on the next write.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{JanitorError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Default bounded channel capacity for log events.
const CHANNEL_CAPACITY: usize = 1024;

/// Events recorded in the activity log.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    RunStarted {
        command: String,
        version: String,
        config_hash: String,
    },
    RunFinished {
        command: String,
        ok: bool,
        duration_ms: u64,
    },
    ScanCompleted {
        root: String,
        directories_walked: usize,
        files_inspected: usize,
        projects_found: usize,
        artifacts_skipped: usize,
        /// Directories left unvisited because of `max_depth`.
        depth_limited: usize,
        duration_ms: u64,
    },
    ArtifactSkipped {
        path: String,
        error_code: String,
        reason: String,
    },
    FileDeleted {
        path: String,
        pattern: String,
        size_bytes: u64,
        modified: String,
    },
    DeletionFailed {
        path: String,
        pattern: String,
        error_code: String,
        error_message: String,
    },
    PatternPruned {
        dir: String,
        pattern: String,
        matched: usize,
        kept: usize,
        deleted: usize,
        failed: usize,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

/// Cheaply-cloneable handle for sending log events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Non-blocking.
    ///
    /// If the channel is full the event is dropped and the dropped-events counter
    /// is incremented.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown. Blocks only until the sentinel is queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

/// Options for building the activity logger.
#[derive(Debug, Clone)]
pub struct ActivityLoggerConfig {
    pub jsonl_config: JsonlConfig,
    pub channel_capacity: usize,
}

impl ActivityLoggerConfig {
    pub fn new(jsonl_config: JsonlConfig) -> Self {
        Self {
            jsonl_config,
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Spawn the logger thread and return a handle plus its join handle.
///
/// The thread runs until `handle.shutdown()` is called or every sender is dropped.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("dlj-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config.jsonl_config, &dropped_clone))
        .map_err(|e| JanitorError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, jsonl_config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(jsonl_config);

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }

        jsonl.write_entry(&event_to_log_entry(&event));
    }

    jsonl.flush();
    jsonl.fsync();
}

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::RunStarted {
            command,
            version,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::RunStart, Severity::Info);
            e.command = Some(command.clone());
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::RunFinished {
            command,
            ok,
            duration_ms,
        } => {
            let severity = if *ok {
                Severity::Info
            } else {
                Severity::Warning
            };
            let mut e = LogEntry::new(EventType::RunFinish, severity);
            e.command = Some(command.clone());
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(*ok);
            e
        }
        ActivityEvent::ScanCompleted {
            root,
            directories_walked,
            files_inspected,
            projects_found,
            artifacts_skipped,
            depth_limited,
            duration_ms,
        } => {
            let severity = if *depth_limited > 0 {
                Severity::Warning
            } else {
                Severity::Info
            };
            let mut e = LogEntry::new(EventType::ScanComplete, severity);
            e.command = Some("versions".to_string());
            e.path = Some(root.clone());
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!(
                "directories={directories_walked} files={files_inspected} \
                 projects={projects_found} skipped={artifacts_skipped} \
                 depth_limited={depth_limited}"
            ));
            e.ok = Some(true);
            e
        }
        ActivityEvent::ArtifactSkipped {
            path,
            error_code,
            reason,
        } => {
            let mut e = LogEntry::new(EventType::ArtifactSkip, Severity::Warning);
            e.command = Some("versions".to_string());
            e.path = Some(path.clone());
            e.error_code = Some(error_code.clone());
            e.error_message = Some(reason.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::FileDeleted {
            path,
            pattern,
            size_bytes,
            modified,
        } => {
            let mut e = LogEntry::new(EventType::FileDelete, Severity::Info);
            e.command = Some("prune".to_string());
            e.path = Some(path.clone());
            e.pattern = Some(pattern.clone());
            e.size = Some(*size_bytes);
            e.mtime = Some(modified.clone());
            e.ok = Some(true);
            e
        }
        ActivityEvent::DeletionFailed {
            path,
            pattern,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::FileDelete, Severity::Warning);
            e.command = Some("prune".to_string());
            e.path = Some(path.clone());
            e.pattern = Some(pattern.clone());
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::PatternPruned {
            dir,
            pattern,
            matched,
            kept,
            deleted,
            failed,
        } => {
            let mut e = LogEntry::new(EventType::PatternPrune, Severity::Info);
            e.command = Some("prune".to_string());
            e.path = Some(dir.clone());
            e.pattern = Some(pattern.clone());
            e.details = Some(format!(
                "matched={matched} kept={kept} deleted={deleted} failed={failed}"
            ));
            e.ok = Some(*failed == 0);
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        // Handled in the receive loop.
        ActivityEvent::Shutdown => LogEntry::new(EventType::RunFinish, Severity::Info),
    }
}
