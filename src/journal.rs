//! A `tracing` layer that copies this workspace's events into the
//! `express_logs` table.
//!
//! The layer itself only formats the event and pushes it onto an unbounded
//! channel; a background task does the inserts, so emitting an event never
//! waits on the database. The channel buffers until the task is started,
//! which lets the layer be installed before the database is open.

use shutter_store::Journal;
use std::fmt::{self, Write as _};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Events from here are never forwarded, or a failing insert would feed
/// itself.
const OWN_TARGET: &str = module_path!();
const PHOTOGRAPHY_TARGETS: [&str; 3] = ["shutter_gallery", "shutter_exif", "shutter::server::photography"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Main,
    Photography,
}

impl Category {
    fn for_target(target: &str) -> Self {
        match PHOTOGRAPHY_TARGETS.iter().any(|prefix| is_within(target, prefix)) {
            true => Self::Photography,
            false => Self::Main,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "MAIN",
            Self::Photography => "PHOTOGRAPHY",
        }
    }
}

/// `target` is `module` or one of its submodules.
fn is_within(target: &str, module: &str) -> bool {
    target.strip_prefix(module).is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

fn is_forwarded(target: &str) -> bool {
    let krate = target.split("::").next().unwrap_or_default();
    (krate == "shutter" || krate.starts_with("shutter_")) && !is_within(target, OWN_TARGET)
}

/// `TRACE`, `DEBUG`, `INFO`, `WARNING` or `ERROR`.
pub fn level_name(level: &Level) -> &'static str {
    if *level == Level::WARN { "WARNING" } else { level.as_str() }
}

/// One row waiting to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub category: Category,
    pub level: &'static str,
    pub message: String,
}

#[derive(Debug)]
enum Entry {
    Record(Record),
    Flush(oneshot::Sender<()>),
}

/// Renders an event as its message followed by ` key=value` for every other
/// field.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message.push_str(value),
            name => {
                let _ = write!(self.fields, " {name}={value}");
            },
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => {
                let _ = write!(self.message, "{value:?}");
            },
            name => {
                let _ = write!(self.fields, " {name}={value:?}");
            },
        }
    }
}

/// Create the layer along with the queue it feeds.
pub fn layer(threshold: Level) -> (JournalLayer, JournalQueue) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let layer = JournalLayer {
        sender: sender.clone(),
        threshold,
    };
    (layer, JournalQueue { sender, receiver })
}

pub struct JournalLayer {
    sender: mpsc::UnboundedSender<Entry>,
    threshold: Level,
}

impl<S: Subscriber> Layer<S> for JournalLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // More verbose levels compare greater.
        if *metadata.level() > self.threshold || !is_forwarded(metadata.target()) {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let record = Record {
            category: Category::for_target(metadata.target()),
            level: level_name(metadata.level()),
            message: visitor.message + &visitor.fields,
        };
        // Only fails once the writer is gone, at which point there is nowhere
        // left to put the row.
        _ = self.sender.send(Entry::Record(record));
    }
}

/// Rows emitted so far, waiting for [`spawn`](Self::spawn).
pub struct JournalQueue {
    sender: mpsc::UnboundedSender<Entry>,
    receiver: mpsc::UnboundedReceiver<Entry>,
}

impl JournalQueue {
    /// Start inserting rows into `journal` on a background task.
    pub fn spawn(self, journal: Journal) -> JournalWriter {
        let Self { sender, receiver } = self;
        let task = tokio::spawn(drain(journal, receiver));
        JournalWriter { sender, task }
    }
}

/// Handle on the background insert task.
pub struct JournalWriter {
    sender: mpsc::UnboundedSender<Entry>,
    task: JoinHandle<()>,
}

impl JournalWriter {
    /// Wait until every row queued before this call has been written.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Entry::Flush(done)).is_ok() {
            _ = wait.await;
        }
    }

    pub fn abort(self) {
        self.task.abort();
    }
}

async fn drain(journal: Journal, mut receiver: mpsc::UnboundedReceiver<Entry>) {
    while let Some(entry) = receiver.recv().await {
        match entry {
            Entry::Record(record) => {
                if let Err(e) = journal.append(record.category.as_str(), record.level, &record.message).await {
                    tracing::warn!(error = ?e, "Could not write log row");
                }
            },
            Entry::Flush(done) => {
                let _ = done.send(());
            },
        }
    }
}
