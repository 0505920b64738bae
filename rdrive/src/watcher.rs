//! Change capture: filesystem events on the local mirror become commands.
//!
//! The notify watcher covers the folder recursively with no ignore list.
//! Events are not coalesced; a burst of writes to the same file simply
//! queues several modify commands and the interpreter's idempotence absorbs
//! the replays on the receiving side.

use anyhow::{Context, Result};
use notify::Watcher;

use crate::queue::OutboundQueue;
use wire::Command;

/// Converts filesystem events below a folder root into outbound commands.
///
/// The notify watcher runs on its own thread and hands events to the async
/// side over an unbounded channel, so capture never blocks on a sync round
/// in progress.
pub struct ChangeCapturer {
    root: std::path::PathBuf,
    queue: OutboundQueue,
    events: tokio::sync::mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    // dropping the watcher stops the event stream
    _watcher: notify::RecommendedWatcher,
}

impl ChangeCapturer {
    pub fn new(root: &std::path::Path, queue: OutboundQueue) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("cannot resolve folder {root:?}"))?;
        let (tx, events) = tokio::sync::mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            // a send failure means the consumer is gone and we are shutting down
            let _ = tx.send(event);
        })
        .context("failed creating the filesystem watcher")?;
        watcher
            .watch(&root, notify::RecursiveMode::Recursive)
            .with_context(|| format!("failed watching {root:?}"))?;
        tracing::info!("watching {:?}", root);
        Ok(Self {
            root,
            queue,
            events,
            _watcher: watcher,
        })
    }

    /// Consumes events until the watcher shuts down. Watcher failure is
    /// fatal to the client.
    pub async fn run(mut self) -> Result<()> {
        while let Some(event) = self.events.recv().await {
            let event = event.context("filesystem watcher failed")?;
            self.handle_event(event).await;
        }
        anyhow::bail!("filesystem watcher stopped unexpectedly")
    }

    async fn handle_event(&self, event: notify::Event) {
        use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind, RenameMode};
        tracing::trace!("event: {:?}", event);
        match event.kind {
            EventKind::Create(kind) => {
                for path in &event.paths {
                    let is_dir = match kind {
                        CreateKind::Folder => true,
                        CreateKind::File => false,
                        _ => path.is_dir(),
                    };
                    self.capture_create(path, is_dir).await;
                }
            }
            EventKind::Remove(kind) => {
                for path in &event.paths {
                    self.capture_delete(path, matches!(kind, RemoveKind::Folder))
                        .await;
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to] = event.paths.as_slice() {
                    match (self.relative(from), self.relative(to)) {
                        (Some(from), Some(to)) => {
                            self.queue.push(Command::Move { from, to }).await;
                        }
                        // moved in from outside the mirror: appears as new content
                        (None, Some(_)) => self.capture_appearance(to).await,
                        // moved out of the mirror: plain deletion
                        (Some(_), None) => self.capture_delete(from, from.is_dir()).await,
                        (None, None) => {}
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                // the matching rename-to never arrived; treat as deletion
                for path in &event.paths {
                    self.capture_delete(path, path.is_dir()).await;
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in &event.paths {
                    self.capture_appearance(path).await;
                }
            }
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
                for path in &event.paths {
                    self.capture_modify(path).await;
                }
            }
            // metadata-only changes and access events are not replicated
            EventKind::Modify(_) | EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
        }
    }

    async fn capture_create(&self, path: &std::path::Path, is_dir: bool) {
        let Some(rel) = self.relative(path) else {
            return;
        };
        self.queue.push(Command::Create { is_dir, path: rel }).await;
    }

    async fn capture_delete(&self, path: &std::path::Path, is_dir: bool) {
        let Some(rel) = self.relative(path) else {
            return;
        };
        self.queue.push(Command::Delete { is_dir, path: rel }).await;
    }

    /// Something appeared at `path` without a capturable history (renamed in
    /// from outside the mirror): announce its existence and, for files, its
    /// contents.
    async fn capture_appearance(&self, path: &std::path::Path) {
        let is_dir = path.is_dir();
        self.capture_create(path, is_dir).await;
        if !is_dir {
            self.capture_modify(path).await;
        }
    }

    async fn capture_modify(&self, path: &std::path::Path) {
        if path.is_dir() {
            // directory "modifications" carry no replicable content
            return;
        }
        let Some(rel) = self.relative(path) else {
            return;
        };
        match tokio::fs::read(path).await {
            Ok(contents) => {
                self.queue
                    .push(Command::Modify {
                        path: rel,
                        contents,
                    })
                    .await;
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                // vanished between the event and the read; the matching
                // delete event carries the terminal state
                tracing::debug!("skipping modify for vanished {rel}");
            }
            Err(error) => {
                tracing::warn!("failed reading {rel} for upload: {error}");
            }
        }
    }

    /// Normalises an event path to a `/`-separated path relative to the
    /// folder root; events outside the root (or with non-UTF-8 names) are
    /// dropped.
    fn relative(&self, path: &std::path::Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        if rel.as_os_str().is_empty() {
            return None;
        }
        match rel.to_str() {
            Some(text) => Some(text.replace(std::path::MAIN_SEPARATOR, "/")),
            None => {
                tracing::warn!("dropping event for non-UTF-8 path {:?}", rel);
                None
            }
        }
    }
}
