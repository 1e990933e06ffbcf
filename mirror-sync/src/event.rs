//! Structured mutation and error events.
//!
//! The reconciler never logs through a global logger for mutations; it hands
//! every [`SyncEvent`] to the [`EventSink`] the caller passed in. The sink
//! decides where events go ([`TracingSink`] forwards them to `tracing`).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use mirror_core::{EntryKind, RelPath};

/// What happened to a replica path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Created,
    Updated,
    Deleted,
    Failed,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Created => write!(f, "created"),
            Action::Updated => write!(f, "updated"),
            Action::Deleted => write!(f, "deleted"),
            Action::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// One mutation or per-item error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncEvent {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    #[serde(serialize_with = "serialize_rel_path")]
    pub path: RelPath,
    pub action: Action,
    pub kind: Option<EntryKind>,
    /// Set when the pass only reports what it would do.
    pub dry_run: bool,
}

impl SyncEvent {
    pub(crate) fn mutation(action: Action, path: RelPath, kind: EntryKind, dry_run: bool) -> Self {
        let verb = match (action, dry_run) {
            (Action::Created, false) => "created",
            (Action::Created, true) => "would create",
            (Action::Updated, false) => "updated",
            (Action::Updated, true) => "would update",
            (Action::Deleted, false) => "removed",
            (Action::Deleted, true) => "would remove",
            (Action::Failed, _) => "failed",
        };
        Self {
            timestamp: Utc::now(),
            severity: Severity::Info,
            message: format!("{verb} {kind} {path}"),
            path,
            action,
            kind: Some(kind),
            dry_run,
        }
    }

    pub(crate) fn failure(
        severity: Severity,
        path: RelPath,
        kind: Option<EntryKind>,
        message: String,
        dry_run: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            message,
            path,
            action: Action::Failed,
            kind,
            dry_run,
        }
    }
}

fn serialize_rel_path<S: serde::Serializer>(path: &RelPath, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(path)
}

/// Receiver of pass events, owned by the caller of [`crate::run_once`].
pub trait EventSink {
    fn emit(&mut self, event: SyncEvent);
}

/// Collects events in memory.
impl EventSink for Vec<SyncEvent> {
    fn emit(&mut self, event: SyncEvent) {
        self.push(event);
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: SyncEvent) {}
}

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&mut self, event: SyncEvent) {
        let kind = event.kind.map(|k| k.to_string()).unwrap_or_default();
        match event.severity {
            Severity::Info => tracing::info!(
                action = %event.action,
                path = %event.path,
                kind = %kind,
                dry_run = event.dry_run,
                "{}",
                event.message,
            ),
            Severity::Warn => tracing::warn!(
                action = %event.action,
                path = %event.path,
                kind = %kind,
                dry_run = event.dry_run,
                "{}",
                event.message,
            ),
            Severity::Error => tracing::error!(
                action = %event.action,
                path = %event.path,
                kind = %kind,
                dry_run = event.dry_run,
                "{}",
                event.message,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn traced(event: SyncEvent) -> String {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || TracingSink.emit(event));
        let bytes = out.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn tracing_sink_logs_dry_run_at_every_severity() {
        for severity in [Severity::Info, Severity::Warn, Severity::Error] {
            let event = SyncEvent::failure(
                severity,
                RelPath::from("dir/x"),
                Some(EntryKind::File),
                "could not copy".to_string(),
                true,
            );
            let line = traced(event);
            assert!(line.contains("dry_run=true"), "{severity:?}: {line}");
            assert!(line.contains("path=dir/x"), "{severity:?}: {line}");
        }
    }

    #[test]
    fn mutation_message_names_kind_and_path() {
        let event = SyncEvent::mutation(
            Action::Created,
            RelPath::from("dir/b.txt"),
            EntryKind::File,
            false,
        );
        assert_eq!(event.message, "created file dir/b.txt");
        assert_eq!(event.severity, Severity::Info);
    }

    #[test]
    fn dry_run_message_is_conditional() {
        let event = SyncEvent::mutation(
            Action::Deleted,
            RelPath::from("c.txt"),
            EntryKind::File,
            true,
        );
        assert_eq!(event.message, "would remove file c.txt");
        assert!(event.dry_run);
    }

    #[test]
    fn event_serializes_path_as_slash_string() {
        let event = SyncEvent::mutation(
            Action::Updated,
            RelPath::from("a/b"),
            EntryKind::File,
            false,
        );
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["path"], "a/b");
        assert_eq!(json["action"], "updated");
        assert_eq!(json["kind"], "file");
    }
}
